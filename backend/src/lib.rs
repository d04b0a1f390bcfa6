// Library entry point for tests
pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod sheets;

use std::sync::Arc;

pub use db::Database;

use api::auth::{OtpSender, OtpStore};
use config::AppConfig;
use sheets::SheetsClient;

pub struct AppState {
  pub db: Database,
  pub config: AppConfig,
  pub otp: OtpStore,
  pub otp_sender: Arc<dyn OtpSender>,
  pub sheets: Option<SheetsClient>,
}

impl AppState {
  pub fn new(db: Database, config: AppConfig, otp_sender: Arc<dyn OtpSender>) -> Self {
    let otp = OtpStore::new(config.otp.clone());
    let sheets = config.sheets_access_token.as_deref().map(SheetsClient::new);
    Self {
      db,
      config,
      otp,
      otp_sender,
      sheets,
    }
  }
}
