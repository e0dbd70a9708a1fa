//! Session token and clock-offset persistence.
//!
//! The executor reads credentials on every request and only writes them on
//! login, refresh and logout. Two stores are provided: an in-memory one for
//! embedding and tests, and a TOML file store for the CLI.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Snapshot of what the signer needs for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub clock_offset_secs: i64,
}

impl SessionCredentials {
    pub fn new(token: impl Into<String>, clock_offset_secs: i64) -> Self {
        Self { token: Some(token.into()), clock_offset_secs }
    }

    /// The token to sign with; blank tokens count as absent.
    pub fn signing_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.trim().is_empty())
    }
}

/// Persistent storage for the session token and server clock offset.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn clock_offset_secs(&self) -> i64;

    fn set_token(&self, token: &str, clock_offset_secs: i64) -> Result<(), StoreError>;

    /// Removes both the token and the clock offset.
    fn clear_token(&self) -> Result<(), StoreError>;

    fn credentials(&self) -> SessionCredentials {
        SessionCredentials { token: self.token(), clock_offset_secs: self.clock_offset_secs() }
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn token(&self) -> Option<String> {
        (**self).token()
    }

    fn clock_offset_secs(&self) -> i64 {
        (**self).clock_offset_secs()
    }

    fn set_token(&self, token: &str, clock_offset_secs: i64) -> Result<(), StoreError> {
        (**self).set_token(token, clock_offset_secs)
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        (**self).clear_token()
    }

    fn credentials(&self) -> SessionCredentials {
        (**self).credentials()
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<SessionCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: SessionCredentials) -> Self {
        Self { inner: RwLock::new(credentials) }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.credentials().token
    }

    fn clock_offset_secs(&self) -> i64 {
        self.credentials().clock_offset_secs
    }

    fn set_token(&self, token: &str, clock_offset_secs: i64) -> Result<(), StoreError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = SessionCredentials::new(token, clock_offset_secs);
        Ok(())
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = SessionCredentials::default();
        Ok(())
    }

    fn credentials(&self) -> SessionCredentials {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Saved account used to log in again after a global session error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default)]
    clock_offset_secs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    login: Option<LoginInfo>,
}

/// TOML-backed store. Every mutation rewrites the whole file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    state: RwLock<SessionFile>,
}

impl FileCredentialStore {
    /// Opens the session file at `path`; a missing file is an empty session.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|source| StoreError::Io { path: path.clone(), source })?;
            toml::from_str(&contents)
                .map_err(|source| StoreError::Decode { path: path.clone(), source })?
        } else {
            SessionFile::default()
        };
        Ok(Self { path, state: RwLock::new(state) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save_login_info(&self, username: &str, password: &str) -> Result<(), StoreError> {
        self.update(|state| {
            state.login =
                Some(LoginInfo { username: username.to_owned(), password: password.to_owned() });
        })
    }

    /// Returns the saved account unless either field is blank.
    pub fn login_info(&self) -> Option<LoginInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .login
            .as_ref()
            .filter(|login| !login.username.trim().is_empty() && !login.password.trim().is_empty())
            .cloned()
    }

    pub fn clear_login_info(&self) -> Result<(), StoreError> {
        self.update(|state| state.login = None)
    }

    fn update(&self, apply: impl FnOnce(&mut SessionFile)) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = state.clone();
        apply(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    fn persist(&self, state: &SessionFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        let encoded = toml::to_string_pretty(state)?;
        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, encoded)
            .map_err(|source| StoreError::Io { path: tmp_path.clone(), source })?;

        #[cfg(windows)]
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }

        fs::rename(&tmp_path, &self.path)
            .map_err(|source| StoreError::Io { path: self.path.clone(), source })
    }

    /// Sibling file written first and renamed over the session file, so a
    /// reader sees either the old or the new contents.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        self.credentials().token
    }

    fn clock_offset_secs(&self) -> i64 {
        self.credentials().clock_offset_secs
    }

    fn set_token(&self, token: &str, clock_offset_secs: i64) -> Result<(), StoreError> {
        self.update(|state| {
            state.token = Some(token.to_owned());
            state.clock_offset_secs = clock_offset_secs;
        })
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        self.update(|state| {
            state.token = None;
            state.clock_offset_secs = 0;
        })
    }

    fn credentials(&self) -> SessionCredentials {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        SessionCredentials {
            token: state.token.clone(),
            clock_offset_secs: state.clock_offset_secs,
        }
    }
}
