use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// A 64-char secret is treated as hex-encoded 32 bytes, anything else as raw bytes
fn hmac_key(secret: &str) -> Result<Vec<u8>> {
  if secret.len() == 64 {
    if let Ok(bytes) = hex::decode(secret) {
      return Ok(bytes);
    }
  }
  if secret.is_empty() {
    anyhow::bail!("OTP secret must not be empty");
  }
  Ok(secret.as_bytes().to_vec())
}

fn otp_mac(secret: &str, email: &str, code: &str) -> Result<HmacSha256> {
  let key = hmac_key(secret)?;
  let mut mac = HmacSha256::new_from_slice(&key)
    .map_err(|e| anyhow::anyhow!("Failed to create HMAC: {}", e))?;

  // Digest is bound to the recipient
  mac.update(email.as_bytes());
  mac.update(b":");
  mac.update(code.as_bytes());
  Ok(mac)
}

/// HMAC-SHA256 digest of a one-time code, hex encoded.
pub fn otp_digest(secret: &str, email: &str, code: &str) -> Result<String> {
  let mac = otp_mac(secret, email, code)?;
  Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a submitted code against a stored digest.
pub fn verify_otp_digest(secret: &str, email: &str, code: &str, digest: &str) -> Result<bool> {
  let expected = hex::decode(digest).context("stored OTP digest is not valid hex")?;
  let mac = otp_mac(secret, email, code)?;
  Ok(mac.verify_slice(&expected).is_ok())
}

/// Six decimal digits, zero padded.
pub fn generate_otp_code() -> String {
  let mut rng = rand::thread_rng();
  format!("{:06}", rng.gen_range(0..1_000_000u32))
}
