//! Tags outbound calls with the calling service's name.

use std::task::{Context, Poll};

use axum::http::HeaderValue;
use tower::{Layer, Service};

use crate::rpc::{Request, FROM_SERVICE};

#[derive(Debug, Clone)]
pub struct FromServiceLayer {
    name: HeaderValue,
}

impl FromServiceLayer {
    /// A name that is not a valid header value is sent as `"unknown"`.
    pub fn new(name: &str) -> Self {
        let name = HeaderValue::from_str(name).unwrap_or_else(|_| {
            tracing::warn!(service = name, "Service name is not a valid header value");
            HeaderValue::from_static("unknown")
        });
        Self { name }
    }
}

impl<S> Layer<S> for FromServiceLayer {
    type Service = FromService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FromService {
            inner,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FromService<S> {
    inner: S,
    name: HeaderValue,
}

impl<S> Service<Request> for FromService<S>
where
    S: Service<Request>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        request
            .headers_mut()
            .insert(FROM_SERVICE, self.name.clone());
        self.inner.call(request)
    }
}
