//! Transport boundary and the default `reqwest` implementation.
//!
//! The executor only needs "issue one call, get one response". `HttpTransport`
//! resolves request paths against the configured base URL, follows redirects,
//! and caps how much of a response body it buffers.

use crate::config::{normalize_base_url, ClientConfig};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use url::form_urlencoded;

pub const MAX_REDIRECTS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the configured base URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), headers: Vec::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post_json<B: Serialize + ?Sized>(
        path: impl Into<String>,
        body: &B,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(body)?;
        Ok(Self::new(Method::Post, path)
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Replaces any existing header of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Path plus form-encoded query string, relative to the base URL.
    pub fn target(&self) -> String {
        let mut target = self.path.trim_start_matches('/').to_owned();
        if !self.query.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.query)
                .finish();
            target.push(if target.contains('?') { '&' } else { '?' });
            target.push_str(&query);
        }
        target
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request).await
    }
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let base = parse_base_url(&config.base_url)?;
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.as_str());
        if let Some(read_timeout) = config.read_timeout() {
            builder = builder.timeout(read_timeout);
        }
        let client = builder.build().map_err(TransportError::Http)?;
        Ok(Self { client, base, max_response_bytes: config.max_response_bytes })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for `request`: its path joined onto the base, then its
    /// query pairs appended.
    pub fn url_for(&self, request: &HttpRequest) -> Result<Url, TransportError> {
        let path = request.path.trim_start_matches('/');
        let mut url = self.base.join(path).map_err(|err| TransportError::InvalidUrl {
            url: format!("{}{path}", self.base),
            reason: err.to_string(),
        })?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
        let limit = self.max_response_bytes;
        if let Some(declared) = response.content_length() {
            if declared > limit as u64 {
                return Err(TransportError::invalid_response(format!(
                    "response body of {declared} bytes exceeds the {limit} byte limit"
                )));
            }
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(TransportError::from_http)? {
            if body.len() + chunk.len() > limit {
                return Err(TransportError::invalid_response(format!(
                    "response body exceeds the {limit} byte limit"
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url_for(&request)?;
        let mut builder = self.client.request(request.method.into(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportError::from_http)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
            })
            .collect();
        let body = self.read_body(response).await?;
        Ok(HttpResponse { status, headers, body })
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidUrl { url: raw.to_owned(), reason };
    let normalized = normalize_base_url(raw.trim().to_owned());
    let base = Url::parse(&normalized).map_err(|err| invalid(err.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
    }
    if base.cannot_be_a_base() || base.host().is_none() {
        return Err(invalid("missing host".to_owned()));
    }
    Ok(base)
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
