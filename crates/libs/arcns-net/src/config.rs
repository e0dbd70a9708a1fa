use crate::error::ConfigError;
use crate::signature::SignatureScheme;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_AUTHORIZATION_HEADER: &str = "Authorization";
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;
/// Error code the server uses for an expired or revoked session.
pub const SESSION_EXPIRED_CODE: &str = "401";

/// Per-client settings. Each executor owns its own copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout_ms: u64,
    /// Bounds the whole exchange, body included, when set.
    pub read_timeout_ms: Option<u64>,
    /// Larger response bodies are rejected instead of buffered.
    pub max_response_bytes: usize,
    pub authorization_header: String,
    /// Envelope error codes that invalidate the whole session.
    pub global_error_codes: Vec<String>,
    /// Log request and response bodies at trace level.
    pub log_bodies: bool,
    pub user_agent: String,
    pub signature: SignatureScheme,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            authorization_header: DEFAULT_AUTHORIZATION_HEADER.to_owned(),
            global_error_codes: vec![SESSION_EXPIRED_CODE.to_owned()],
            log_bodies: false,
            user_agent: concat!("arcns-net/", env!("CARGO_PKG_VERSION")).to_owned(),
            signature: SignatureScheme::Legacy,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: normalize_base_url(base_url.into()), ..Self::default() }
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(input)?;
        config.base_url = normalize_base_url(config.base_url);
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&contents)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(base_url.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() || self.base_url == "/" {
            return Err(ConfigError::invalid("base_url must not be empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("connect_timeout_ms must be greater than zero"));
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::invalid("max_response_bytes must be greater than zero"));
        }
        if self.authorization_header.trim().is_empty() {
            return Err(ConfigError::invalid("authorization_header must not be empty"));
        }
        if let SignatureScheme::HmacSha256 { secret } = &self.signature {
            if secret.trim().is_empty() {
                return Err(ConfigError::invalid("hmac_sha256 signature requires a secret"));
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    pub fn is_global_error_code(&self, code: &str) -> bool {
        self.global_error_codes.iter().any(|global| global == code)
    }
}

/// Base URLs always end in `/` so relative paths join predictably.
pub fn normalize_base_url(mut base_url: String) -> String {
    let trimmed_len = base_url.trim_end().len();
    base_url.truncate(trimmed_len);
    if !base_url.ends_with('/') {
        base_url.push('/');
    }
    base_url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_client() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.max_response_bytes, DEFAULT_MAX_RESPONSE_BYTES);
        assert!(config.is_global_error_code("401"));
        assert!(!config.is_global_error_code("403"));
        assert_eq!(config.signature, SignatureScheme::Legacy);
    }

    #[test]
    fn parses_toml_and_normalizes_base_url() {
        let config = ClientConfig::from_toml(
            r#"
base_url = "http://api.example.test:9000/v1"
read_timeout_ms = 15000
global_error_codes = ["401", "SESSION_EXPIRED"]

[signature]
scheme = "hmac_sha256"
secret = "k"
"#,
        )
        .expect("parse");
        assert_eq!(config.base_url, "http://api.example.test:9000/v1/");
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(15)));
        assert!(config.is_global_error_code("SESSION_EXPIRED"));
        assert_eq!(config.signature, SignatureScheme::HmacSha256 { secret: "k".into() });
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            ClientConfig::from_toml("connect_timeout_ms = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            ClientConfig::from_toml("max_response_bytes = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            ClientConfig::from_toml("base_url = \"\""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            ClientConfig::from_toml("[signature]\nscheme = \"hmac_sha256\"\nsecret = \" \""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(ClientConfig::from_toml("bogus = 1"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ClientConfig::from_path(dir.path().join("absent.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
