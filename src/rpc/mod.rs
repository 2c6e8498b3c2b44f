//! Request/response model shared by the outbound client and inbound handlers.
//!
//! # Data Flow
//! ```text
//! Outbound:  caller → Client (auth → trace → from_service → HttpClient) → peer
//! Inbound:   HttpServer → stats → trace → auth → Handler
//! ```
//!
//! Both directions are a [`Capability`]: a cloneable, boxed tower service
//! from [`Request`] to [`Response`]. Middleware layers transform one
//! capability into another.

pub mod client;

use axum::http::{header::AUTHORIZATION, Extensions, HeaderMap, HeaderName, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tower::util::BoxCloneSyncService;

pub use client::{Client, HttpClient};

/// Name of the calling service, set on every outbound call.
pub const FROM_SERVICE: HeaderName = HeaderName::from_static("x-from-service");
/// Trace identifier shared by every span of one request tree.
pub const TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");
/// Identifier of the span that issued the request.
pub const SPAN_ID: HeaderName = HeaderName::from_static("x-span-id");

/// A call or handle capability.
pub type Capability = BoxCloneSyncService<Request, Response, CallError>;

/// Errors surfaced on the request path.
///
/// These never affect the lifecycle state of the service that observes them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// HTTP status used when the error crosses the wire.
    pub fn status(&self) -> StatusCode {
        match self {
            CallError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CallError::Forbidden(_) => StatusCode::FORBIDDEN,
            CallError::NotFound(_) => StatusCode::NOT_FOUND,
            CallError::Timeout => StatusCode::REQUEST_TIMEOUT,
            CallError::Transport(_) => StatusCode::BAD_GATEWAY,
            CallError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The detail message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            CallError::Unauthorized(m)
            | CallError::Forbidden(m)
            | CallError::NotFound(m)
            | CallError::Transport(m)
            | CallError::Internal(m) => m.clone(),
            CallError::Timeout => "request timed out".to_string(),
        }
    }

    /// Rebuild an error from a peer's status code and body.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => CallError::Unauthorized(message),
            StatusCode::FORBIDDEN => CallError::Forbidden(message),
            StatusCode::NOT_FOUND => CallError::NotFound(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => CallError::Timeout,
            s if s.is_server_error() && s != StatusCode::INTERNAL_SERVER_ERROR => {
                CallError::Transport(message)
            }
            _ => CallError::Internal(message),
        }
    }
}

/// A request addressed to `service` at `endpoint` (`"Handler.Method"`).
#[derive(Debug, Clone, Default)]
pub struct Request {
    service: String,
    endpoint: String,
    headers: HeaderMap,
    body: Bytes,
    extensions: Extensions,
}

impl Request {
    pub fn new(service: impl Into<String>, endpoint: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            headers: HeaderMap::new(),
            body: body.into(),
            extensions: Extensions::new(),
        }
    }

    /// Build a request with a JSON body.
    pub fn json<T: Serialize>(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        body: &T,
    ) -> Result<Self, CallError> {
        let body = serde_json::to_vec(body).map_err(|e| CallError::Internal(e.to_string()))?;
        Ok(Self::new(service, endpoint, body))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Handler part of the endpoint (`"Greeter"` for `"Greeter.Hello"`).
    pub fn handler(&self) -> &str {
        self.endpoint
            .split_once('.')
            .map_or(self.endpoint.as_str(), |(handler, _)| handler)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Token carried in an `authorization: Bearer ...` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header(&AUTHORIZATION)
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// A handler or peer reply.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self, CallError> {
        serde_json::to_vec(value)
            .map(Self::new)
            .map_err(|e| CallError::Internal(e.to_string()))
    }
}
