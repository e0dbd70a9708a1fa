use crate::error::TransportError;
use std::fmt;
use std::sync::Arc;

/// Shown when an error carries no message of its own.
pub const FALLBACK_ERROR_MESSAGE: &str = "request failed, please try again later";

/// Outcome of one request as seen by callers.
///
/// `Loading` exists for UI state holders; the executor only ever returns
/// `Success` or `Error`.
#[derive(Clone, Debug)]
pub enum ApiResult<T> {
    Success { data: T, lag: Option<i64> },
    Error(ApiError),
    Loading,
}

#[derive(Clone, Debug, Default)]
pub struct ApiError {
    pub message: Option<String>,
    pub cause: Option<Arc<TransportError>>,
    /// Session-wide failure handled by a single listener, not the call site.
    pub is_global_error: bool,
    pub error_code: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::default() }
    }

    pub fn with_cause(mut self, cause: TransportError) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_error_code(mut self, error_code: Option<String>) -> Self {
        self.error_code = error_code;
        self
    }

    pub fn global(mut self, is_global_error: bool) -> Self {
        self.is_global_error = is_global_error;
        self
    }

    pub fn message_or_fallback(&self) -> &str {
        self.message.as_deref().unwrap_or(FALLBACK_ERROR_MESSAGE)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_or_fallback())?;
        if let Some(code) = &self.error_code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl<T> ApiResult<T> {
    pub fn success(data: T) -> Self {
        Self::Success { data, lag: None }
    }

    pub fn error(error: ApiError) -> Self {
        Self::Error(error)
    }

    /// The error text for `Error`, empty otherwise.
    pub fn error_message(&self) -> String {
        match self {
            Self::Error(error) => error.message_or_fallback().to_owned(),
            _ => String::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn has_non_global_error(&self) -> bool {
        matches!(self, Self::Error(error) if !error.is_global_error)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn lag(&self) -> Option<i64> {
        match self {
            Self::Success { lag, .. } => *lag,
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ApiError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            Self::Success { data, lag } => ApiResult::Success { data: f(data), lag },
            Self::Error(error) => ApiResult::Error(error),
            Self::Loading => ApiResult::Loading,
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            Self::Success { data, .. } => Ok(data),
            Self::Error(error) => Err(error),
            Self::Loading => Err(ApiError::new("request still in flight")),
        }
    }
}
