//! Signed request pipeline for arcns clients.
//!
//! - [`Signer`] derives a per-request authorization value from the stored
//!   session token and the server clock offset.
//! - [`RequestExecutor`] attaches it, issues the call through a [`Transport`],
//!   and folds every outcome into an [`ApiResult`].
//! - [`Paginator`] and [`PageLoader`] keep a list's page cursor in step with
//!   those outcomes, merging on success and rolling back on failure.
//!
//! Session-wide failures (an expired token) are flagged on the result with
//! `is_global_error` and published on
//! [`RequestExecutor::subscribe_global_errors`] so one handler can react.

pub mod config;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod event;
pub mod executor;
pub mod pagination;
pub mod result;
pub mod signature;
pub mod transport;

pub use config::{ClientConfig, SESSION_EXPIRED_CODE};
pub use credentials::{
    CredentialStore, FileCredentialStore, LoginInfo, MemoryCredentialStore, SessionCredentials,
};
pub use envelope::ResponseEnvelope;
pub use error::{ConfigError, LoadError, StoreError, TransportError};
pub use event::Event;
pub use executor::{GlobalError, RequestExecutor, NETWORK_TIMEOUT_MESSAGE, REQUEST_FAILED_MESSAGE};
pub use pagination::{FailureNotice, PageLoader, Paginator};
pub use result::{ApiError, ApiResult, FALLBACK_ERROR_MESSAGE};
pub use signature::{Clock, FixedClock, SignatureLayout, SignatureScheme, Signer, SystemClock};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};
