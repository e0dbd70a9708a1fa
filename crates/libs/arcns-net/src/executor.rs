use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::envelope::ResponseEnvelope;
use crate::error::{StoreError, TransportError};
use crate::result::{ApiError, ApiResult};
use crate::signature::{Clock, Signer, SystemClock};
use crate::transport::{HttpRequest, HttpTransport, Transport};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const NETWORK_TIMEOUT_MESSAGE: &str = "network timeout";
pub const REQUEST_FAILED_MESSAGE: &str = "request failed";

const GLOBAL_ERROR_CHANNEL_CAPACITY: usize = 16;

/// Published once per call that fails with a session-wide error code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalError {
    pub error_code: String,
    pub message: Option<String>,
    pub path: String,
}

/// Signs, sends and classifies requests.
///
/// Every failure is folded into [`ApiResult::Error`]; `execute` has no error
/// channel of its own. Calls are independent and may run concurrently from
/// any task, sharing only read access to the credential store.
pub struct RequestExecutor<T, S> {
    config: ClientConfig,
    transport: T,
    store: S,
    signer: Signer,
    global_errors: broadcast::Sender<GlobalError>,
    next_request_id: AtomicU64,
}

impl<S: CredentialStore> RequestExecutor<HttpTransport, S> {
    pub fn from_config(config: ClientConfig, store: S) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::new(config, transport, store))
    }
}

impl<T: Transport, S: CredentialStore> RequestExecutor<T, S> {
    pub fn new(config: ClientConfig, transport: T, store: S) -> Self {
        let (global_errors, _) = broadcast::channel(GLOBAL_ERROR_CHANNEL_CAPACITY);
        let signer = Signer::new(config.signature.clone(), Arc::new(SystemClock));
        Self {
            config,
            transport,
            store,
            signer,
            global_errors,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.signer = Signer::new(self.config.signature.clone(), clock);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscribe_global_errors(&self) -> broadcast::Receiver<GlobalError> {
        self.global_errors.subscribe()
    }

    /// The authorization value for a request issued now, if a token is stored.
    pub fn authorization(&self) -> Option<String> {
        self.signer.sign(&self.store.credentials())
    }

    pub async fn execute<D: DeserializeOwned>(&self, mut request: HttpRequest) -> ApiResult<D> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let method = request.method.as_str();
        let target = request.target();

        match self.authorization() {
            Some(value) => request.set_header(self.config.authorization_header.as_str(), value),
            None => log::trace!("request #{request_id}: no session token, sending unsigned"),
        }
        log::debug!("request #{request_id}: {method} {target}");
        if self.config.log_bodies {
            if let Some(body) = request.body.as_deref() {
                log::trace!("request #{request_id} body: {}", String::from_utf8_lossy(body));
            }
        }

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => return Self::transport_failure(request_id, err),
        };
        if self.config.log_bodies {
            log::trace!(
                "request #{request_id} response {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            );
        }
        if !response.is_success() {
            log::warn!("request #{request_id}: {target} answered status {}", response.status);
            return ApiResult::Error(ApiError::new(format!("response error: {}", response.status)));
        }
        self.classify(request_id, &target, &response.body)
    }

    /// Runs a login call whose `data` is the session token and stores it with
    /// the server-reported lag as the clock offset.
    pub async fn execute_login(&self, request: HttpRequest) -> ApiResult<String> {
        let result = self.execute::<String>(request).await;
        if let ApiResult::Success { data, lag } = &result {
            if let Err(err) = self.login(data, *lag) {
                log::warn!("failed to persist session token: {err}");
                return ApiResult::Error(ApiError::new(format!("failed to store session: {err}")));
            }
        }
        result
    }

    pub fn login(&self, token: &str, lag: Option<i64>) -> Result<(), StoreError> {
        self.store.set_token(token, lag.unwrap_or(0))
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.store.clear_token()
    }

    fn transport_failure<D>(request_id: u64, err: TransportError) -> ApiResult<D> {
        if err.is_timeout() {
            log::warn!("request #{request_id}: {err}");
            return ApiResult::Error(ApiError::new(NETWORK_TIMEOUT_MESSAGE).with_cause(err));
        }
        log::warn!("request #{request_id} failed: {err}");
        ApiResult::Error(ApiError::new(REQUEST_FAILED_MESSAGE).with_cause(err))
    }

    fn classify<D: DeserializeOwned>(
        &self,
        request_id: u64,
        target: &str,
        body: &[u8],
    ) -> ApiResult<D> {
        let envelope: ResponseEnvelope<JsonValue> = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(err) => return Self::transport_failure(request_id, TransportError::Decode(err)),
        };

        if !envelope.success {
            let is_global_error = envelope
                .error_code
                .as_deref()
                .is_some_and(|code| self.config.is_global_error_code(code));
            if is_global_error {
                let error_code = envelope.error_code.clone().unwrap_or_default();
                log::warn!("request #{request_id}: session-wide error {error_code} from {target}");
                // No subscribers is fine; the flag on the result still carries it.
                let _ = self.global_errors.send(GlobalError {
                    error_code,
                    message: envelope.message.clone(),
                    path: target.to_owned(),
                });
            } else {
                log::debug!(
                    "request #{request_id}: rejected with code {:?}: {:?}",
                    envelope.error_code,
                    envelope.message
                );
            }
            return ApiResult::Error(ApiError {
                message: envelope.message,
                cause: None,
                is_global_error,
                error_code: envelope.error_code,
            });
        }

        match serde_json::from_value::<D>(envelope.data.unwrap_or(JsonValue::Null)) {
            Ok(data) => ApiResult::Success { data, lag: envelope.lag },
            Err(err) => Self::transport_failure(request_id, TransportError::Decode(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{MemoryCredentialStore, SessionCredentials};
    use crate::signature::{FixedClock, SignatureLayout};
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        fn replying(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self { responses: Mutex::new(VecDeque::from(responses)), seen: Mutex::default() }
        }

        fn json(status: u16, body: JsonValue) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse::new(status, body.to_string()))
        }

        fn seen(&self) -> Vec<HttpRequest> {
            self.seen.lock().expect("seen mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().expect("seen mutex poisoned").push(request);
            self.responses
                .lock()
                .expect("responses mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::invalid_response("no response queued")))
        }
    }

    fn executor(
        responses: Vec<Result<HttpResponse, TransportError>>,
        credentials: SessionCredentials,
    ) -> RequestExecutor<MockTransport, MemoryCredentialStore> {
        RequestExecutor::new(
            ClientConfig::default(),
            MockTransport::replying(responses),
            MemoryCredentialStore::with_credentials(credentials),
        )
        .with_clock(Arc::new(FixedClock(1000)))
    }

    #[tokio::test]
    async fn success_carries_data_and_lag() {
        let executor = executor(
            vec![MockTransport::json(200, json!({"success": true, "data": [1, 2, 3], "lag": 4}))],
            SessionCredentials::default(),
        );
        let result: ApiResult<Vec<u32>> = executor.execute(HttpRequest::get("items")).await;
        assert!(result.succeeded());
        assert_eq!(result.data(), Some(&vec![1, 2, 3]));
        assert_eq!(result.lag(), Some(4));
    }

    #[tokio::test]
    async fn null_data_decodes_into_option() {
        let executor = executor(
            vec![MockTransport::json(200, json!({"success": true, "data": null}))],
            SessionCredentials::default(),
        );
        let result: ApiResult<Option<String>> = executor.execute(HttpRequest::get("x")).await;
        assert_eq!(result.data(), Some(&None));
    }

    #[tokio::test]
    async fn signed_header_attached_when_token_present() {
        let executor = executor(
            vec![MockTransport::json(200, json!({"success": true}))],
            SessionCredentials::new("abc123", 5),
        );
        let _: ApiResult<JsonValue> = executor.execute(HttpRequest::get("me")).await;

        let seen = executor.transport().seen();
        let value = seen[0].header("Authorization").expect("authorization header");
        assert_eq!(value.len(), SignatureLayout::expected_len(4, 6));
        assert_eq!(SignatureLayout::timestamp(value, 4), Some("1005"));
        assert_eq!(SignatureLayout::token(value, 4), Some("abc123"));
    }

    #[tokio::test]
    async fn header_omitted_without_token() {
        let executor =
            executor(vec![MockTransport::json(200, json!({"success": true}))], Default::default());
        let _: ApiResult<JsonValue> = executor.execute(HttpRequest::get("public")).await;
        assert_eq!(executor.transport().seen()[0].header("Authorization"), None);
    }

    #[tokio::test]
    async fn timeout_maps_to_network_timeout() {
        let executor = executor(
            vec![
                Err(TransportError::Timeout { operation: "connecting", source: None }),
                Err(TransportError::Timeout { operation: "reading", source: None }),
            ],
            Default::default(),
        );
        for _ in 0..2 {
            let result: ApiResult<JsonValue> = executor.execute(HttpRequest::get("slow")).await;
            let error = result.as_error().expect("error");
            assert_eq!(error.message.as_deref(), Some(NETWORK_TIMEOUT_MESSAGE));
            assert!(!error.is_global_error);
        }
    }

    #[tokio::test]
    async fn other_transport_failure_keeps_cause() {
        let executor = executor(
            vec![Err(TransportError::invalid_response("response body exceeds the 16 byte limit"))],
            Default::default(),
        );
        let result: ApiResult<JsonValue> = executor.execute(HttpRequest::get("down")).await;
        let error = result.as_error().expect("error");
        assert_eq!(error.message.as_deref(), Some(REQUEST_FAILED_MESSAGE));
        assert!(matches!(error.cause.as_deref(), Some(TransportError::InvalidResponse { .. })));
        assert!(result.has_non_global_error());
    }

    #[tokio::test]
    async fn non_2xx_reports_status() {
        let executor = executor(
            vec![Ok(HttpResponse::new(503, "unavailable"))],
            Default::default(),
        );
        let result: ApiResult<JsonValue> = executor.execute(HttpRequest::get("x")).await;
        assert_eq!(result.error_message(), "response error: 503");
    }

    #[tokio::test]
    async fn application_error_is_local() {
        let executor = executor(
            vec![MockTransport::json(
                200,
                json!({"success": false, "message": "bad page", "errCode": "E42"}),
            )],
            Default::default(),
        );
        let result: ApiResult<JsonValue> = executor.execute(HttpRequest::get("x")).await;
        let error = result.as_error().expect("error");
        assert_eq!(error.message.as_deref(), Some("bad page"));
        assert_eq!(error.error_code.as_deref(), Some("E42"));
        assert!(!error.is_global_error);
        assert!(result.has_non_global_error());
    }

    #[tokio::test]
    async fn session_expired_is_global_and_broadcast() {
        let executor = executor(
            vec![MockTransport::json(
                200,
                json!({"success": false, "message": "expired", "errCode": "401"}),
            )],
            SessionCredentials::new("stale", 0),
        );
        let mut global = executor.subscribe_global_errors();

        let result: ApiResult<JsonValue> = executor.execute(HttpRequest::get("items")).await;
        let error = result.as_error().expect("error");
        assert!(error.is_global_error);
        assert_eq!(error.error_code.as_deref(), Some("401"));
        assert!(!result.has_non_global_error());

        let published = global.try_recv().expect("global error published");
        assert_eq!(
            published,
            GlobalError {
                error_code: "401".into(),
                message: Some("expired".into()),
                path: "items".into(),
            }
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_request_failure() {
        let executor = executor(vec![Ok(HttpResponse::new(200, "<html>"))], Default::default());
        let result: ApiResult<JsonValue> = executor.execute(HttpRequest::get("x")).await;
        let error = result.as_error().expect("error");
        assert_eq!(error.message.as_deref(), Some(REQUEST_FAILED_MESSAGE));
        assert!(matches!(error.cause.as_deref(), Some(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn payload_type_mismatch_is_request_failure() {
        let executor = executor(
            vec![MockTransport::json(200, json!({"success": true, "data": "not a list"}))],
            Default::default(),
        );
        let result: ApiResult<Vec<u32>> = executor.execute(HttpRequest::get("x")).await;
        assert_eq!(result.error_message(), REQUEST_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn execute_login_stores_token_with_lag() {
        let executor = executor(
            vec![MockTransport::json(200, json!({"success": true, "data": "fresh", "lag": -7}))],
            Default::default(),
        );
        let request =
            HttpRequest::post_json("login", &json!({"username": "a"})).expect("json body");
        let result = executor.execute_login(request).await;
        assert!(result.succeeded());
        assert_eq!(executor.store().credentials(), SessionCredentials::new("fresh", -7));
        assert_eq!(executor.transport().seen()[0].header("Authorization"), None);

        executor.logout().expect("logout");
        assert_eq!(executor.store().token(), None);
    }

    #[tokio::test]
    async fn failed_login_leaves_store_untouched() {
        let executor = executor(
            vec![MockTransport::json(200, json!({"success": false, "message": "wrong password"}))],
            SessionCredentials::new("old", 3),
        );
        let result = executor.execute_login(HttpRequest::get("login")).await;
        assert_eq!(result.error_message(), "wrong password");
        assert_eq!(executor.store().credentials(), SessionCredentials::new("old", 3));
    }

    #[tokio::test]
    async fn concurrent_calls_are_independent() {
        let responses = (0..8)
            .map(|n| MockTransport::json(200, json!({"success": true, "data": n})))
            .collect();
        let executor = Arc::new(executor(responses, SessionCredentials::new("t", 0)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let executor = Arc::clone(&executor);
            handles.push(tokio::spawn(async move {
                executor.execute::<u32>(HttpRequest::get("n")).await
            }));
        }
        let mut values = Vec::new();
        for handle in handles {
            let result = handle.await.expect("task joined");
            values.push(*result.data().expect("success"));
        }
        values.sort_unstable();
        assert_eq!(values, (0..8).collect::<Vec<u32>>());
    }
}
