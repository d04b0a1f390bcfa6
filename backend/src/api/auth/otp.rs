use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use axum::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::OtpConfig;
use crate::crypto::{generate_otp_code, otp_digest, verify_otp_digest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
  Verified,
  Invalid,
  Expired,
  TooManyAttempts,
  NotFound,
}

#[derive(Debug, Error)]
pub enum OtpError {
  #[error("a code was sent recently; retry in {0}s")]
  Cooldown(u64),
  #[error(transparent)]
  Crypto(#[from] anyhow::Error),
}

struct Entry {
  digest: String,
  issued_at: Instant,
  expires_at: Instant,
  attempts: u32,
}

/// Pending one-time codes keyed by lower-cased email. Only digests are kept.
pub struct OtpStore {
  config: OtpConfig,
  entries: Mutex<HashMap<String, Entry>>,
}

fn normalize(email: &str) -> String {
  email.trim().to_lowercase()
}

impl OtpStore {
  pub fn new(config: OtpConfig) -> Self {
    Self {
      config,
      entries: Mutex::new(HashMap::new()),
    }
  }

  pub fn ttl(&self) -> Duration {
    self.config.ttl
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
    self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Generate a fresh code for `email`, replacing any earlier one once the
  /// resend cooldown has passed. Returns the plain code for delivery.
  pub fn issue(&self, email: &str) -> Result<String, OtpError> {
    let email = normalize(email);
    let now = Instant::now();
    let mut entries = self.entries();

    if let Some(existing) = entries.get(&email) {
      let since = now.saturating_duration_since(existing.issued_at);
      if existing.expires_at > now && since < self.config.resend_cooldown {
        let wait = self.config.resend_cooldown - since;
        return Err(OtpError::Cooldown(wait.as_secs().max(1)));
      }
    }

    let code = generate_otp_code();
    let digest = otp_digest(&self.config.secret, &email, &code)?;
    entries.insert(
      email,
      Entry {
        digest,
        issued_at: now,
        expires_at: now + self.config.ttl,
        attempts: 0,
      },
    );
    Ok(code)
  }

  /// Check a submitted code. A verified code is consumed.
  pub fn verify(&self, email: &str, code: &str) -> VerifyOutcome {
    let email = normalize(email);
    let mut entries = self.entries();

    let Some(entry) = entries.get_mut(&email) else {
      return VerifyOutcome::NotFound;
    };

    if entry.expires_at <= Instant::now() {
      entries.remove(&email);
      return VerifyOutcome::Expired;
    }

    if entry.attempts >= self.config.max_attempts {
      entries.remove(&email);
      return VerifyOutcome::TooManyAttempts;
    }

    entry.attempts += 1;
    match verify_otp_digest(&self.config.secret, &email, code.trim(), &entry.digest) {
      Ok(true) => {
        entries.remove(&email);
        VerifyOutcome::Verified
      }
      Ok(false) => VerifyOutcome::Invalid,
      Err(e) => {
        tracing::error!("Failed to verify OTP for {}: {}", email, e);
        VerifyOutcome::Invalid
      }
    }
  }

  /// Drop expired entries; returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    let now = Instant::now();
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    before - entries.len()
  }

  pub fn pending(&self) -> usize {
    self.entries().len()
  }
}

/// Delivery channel for one-time codes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OtpSender: Send + Sync {
  async fn send(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Writes codes to the log. The code itself is only logged outside production.
pub struct LogOtpSender {
  reveal_code: bool,
}

impl LogOtpSender {
  pub fn new(reveal_code: bool) -> Self {
    Self { reveal_code }
  }
}

#[async_trait]
impl OtpSender for LogOtpSender {
  async fn send(&self, email: &str, code: &str) -> anyhow::Result<()> {
    if self.reveal_code {
      tracing::info!(recipient = %email, code = %code, "One-time code issued");
    } else {
      tracing::info!(recipient = %email, "One-time code issued");
    }
    Ok(())
  }
}
