pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod otp;

pub use handlers::*;
pub use helpers::AuthUser;
pub use otp::{LogOtpSender, OtpSender, OtpStore, VerifyOutcome};
