//! Per-request statistics for handled requests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};

use crate::observability::stats::Stats;
use crate::rpc::{CallError, Request, Response};

#[derive(Debug, Clone)]
pub struct StatsLayer {
    stats: Arc<Stats>,
}

impl StatsLayer {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self { stats }
    }
}

impl<S> Layer<S> for StatsLayer {
    type Service = HandlerStats<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HandlerStats {
            inner,
            stats: Arc::clone(&self.stats),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerStats<S> {
    inner: S,
    stats: Arc<Stats>,
}

impl<S> Service<Request> for HandlerStats<S>
where
    S: Service<Request, Response = Response, Error = CallError>,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = CallError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, CallError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let start = Instant::now();
        let endpoint = request.endpoint().to_string();
        let stats = Arc::clone(&self.stats);
        let fut = self.inner.call(request);

        Box::pin(async move {
            let result = fut.await;
            stats.record(&endpoint, result.is_ok(), start);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let stats = Arc::new(Stats::new());
        let svc = StatsLayer::new(Arc::clone(&stats)).layer(tower::service_fn(|req: Request| {
            future::ready(if req.endpoint() == "Orders.Fail" {
                Err(CallError::Internal("boom".into()))
            } else {
                Ok(Response::default())
            })
        }));

        svc.clone()
            .oneshot(Request::new("orders", "Orders.Get", ""))
            .await
            .unwrap();
        svc.oneshot(Request::new("orders", "Orders.Fail", ""))
            .await
            .unwrap_err();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.errors, 1);
    }
}
