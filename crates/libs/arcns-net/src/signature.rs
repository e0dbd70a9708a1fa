//! Per-request authorization values.
//!
//! The legacy layout is fixed-offset padding around a clock-corrected
//! timestamp and the raw session token:
//!
//! ```text
//! [38 a-z0-9][10 digits][timestamp][20 digits][30 a-z0-9][token][10 a-z0-9]
//! ```
//!
//! The peer slices segments by offset, so every random block length is exact.

use crate::credentials::SessionCredentials;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

pub const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";
pub const NUMERIC: &[u8] = b"1234567890";

/// Wall-clock source in unix seconds.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|value| value.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_secs(&self) -> i64 {
        self.0
    }
}

/// Segment offsets of the legacy signature.
pub struct SignatureLayout;

impl SignatureLayout {
    pub const LEAD_ALPHA: usize = 38;
    pub const LEAD_DIGITS: usize = 10;
    pub const MID_DIGITS: usize = 20;
    pub const MID_ALPHA: usize = 30;
    pub const TAIL_ALPHA: usize = 10;

    pub const fn timestamp_offset() -> usize {
        Self::LEAD_ALPHA + Self::LEAD_DIGITS
    }

    pub const fn token_offset(timestamp_len: usize) -> usize {
        Self::timestamp_offset() + timestamp_len + Self::MID_DIGITS + Self::MID_ALPHA
    }

    pub const fn expected_len(timestamp_len: usize, token_len: usize) -> usize {
        Self::token_offset(timestamp_len) + token_len + Self::TAIL_ALPHA
    }

    pub fn timestamp(signature: &str, timestamp_len: usize) -> Option<&str> {
        let start = Self::timestamp_offset();
        signature.get(start..start + timestamp_len)
    }

    /// Recovers the token given the timestamp length; `None` if the value is
    /// too short for the layout.
    pub fn token(signature: &str, timestamp_len: usize) -> Option<&str> {
        let start = Self::token_offset(timestamp_len);
        let end = signature.len().checked_sub(Self::TAIL_ALPHA)?;
        if end < start {
            return None;
        }
        signature.get(start..end)
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum SignatureScheme {
    #[default]
    Legacy,
    /// `"{timestamp}.{token}.{hex hmac-sha256}"` keyed by a shared secret.
    HmacSha256 { secret: String },
}

impl fmt::Debug for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("Legacy"),
            Self::HmacSha256 { .. } => f.write_str("HmacSha256 { secret: <redacted> }"),
        }
    }
}

#[derive(Clone)]
pub struct Signer {
    scheme: SignatureScheme,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("scheme", &self.scheme).finish_non_exhaustive()
    }
}

impl Default for Signer {
    fn default() -> Self {
        Self::new(SignatureScheme::Legacy, Arc::new(SystemClock))
    }
}

impl Signer {
    pub fn new(scheme: SignatureScheme, clock: Arc<dyn Clock>) -> Self {
        Self { scheme, clock }
    }

    pub fn scheme(&self) -> &SignatureScheme {
        &self.scheme
    }

    /// Server-corrected time; read fresh on every call.
    pub fn corrected_timestamp(&self, credentials: &SessionCredentials) -> i64 {
        self.clock.now_secs().saturating_add(credentials.clock_offset_secs)
    }

    pub fn sign(&self, credentials: &SessionCredentials) -> Option<String> {
        self.sign_with(&mut OsRng, credentials)
    }

    pub fn sign_with<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
        credentials: &SessionCredentials,
    ) -> Option<String> {
        let token = credentials.signing_token()?;
        let timestamp = self.corrected_timestamp(credentials).to_string();
        match &self.scheme {
            SignatureScheme::Legacy => Some(legacy_signature(rng, &timestamp, token)),
            SignatureScheme::HmacSha256 { secret } => hmac_signature(secret, &timestamp, token),
        }
    }
}

fn legacy_signature<R: RngCore + ?Sized>(rng: &mut R, timestamp: &str, token: &str) -> String {
    let mut value =
        String::with_capacity(SignatureLayout::expected_len(timestamp.len(), token.len()));
    value.push_str(&random_block(rng, SignatureLayout::LEAD_ALPHA, ALPHANUMERIC));
    value.push_str(&random_block(rng, SignatureLayout::LEAD_DIGITS, NUMERIC));
    value.push_str(timestamp);
    value.push_str(&random_block(rng, SignatureLayout::MID_DIGITS, NUMERIC));
    value.push_str(&random_block(rng, SignatureLayout::MID_ALPHA, ALPHANUMERIC));
    value.push_str(token);
    value.push_str(&random_block(rng, SignatureLayout::TAIL_ALPHA, ALPHANUMERIC));
    value
}

fn hmac_signature(secret: &str, timestamp: &str, token: &str) -> Option<String> {
    let payload = format!("{timestamp}.{token}");
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(err) => {
            log::warn!("hmac signing key rejected: {err}");
            return None;
        }
    };
    mac.update(payload.as_bytes());
    Some(format!("{payload}.{}", hex::encode(mac.finalize().into_bytes())))
}

/// Uniform draw of `len` symbols from `alphabet` using rejection sampling.
pub fn random_block<R: RngCore + ?Sized>(rng: &mut R, len: usize, alphabet: &[u8]) -> String {
    debug_assert!(!alphabet.is_empty() && alphabet.len() <= 256);
    let zone = 256 - (256 % alphabet.len());
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        rng.fill_bytes(&mut buf);
        for byte in buf {
            if (byte as usize) < zone {
                out.push(alphabet[byte as usize % alphabet.len()] as char);
                if out.len() == len {
                    break;
                }
            }
        }
    }
    out
}
