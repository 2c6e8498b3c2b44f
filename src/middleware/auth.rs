//! Credential attachment (outbound) and verification (inbound).
//!
//! Both layers resolve the auth provider through its [`Slot`] on every
//! request, so a provider installed by the flag parser after the layers were
//! built is still the one consulted.

use std::task::{Context, Poll};

use axum::http::{header::AUTHORIZATION, HeaderValue};
use futures_util::future::{self, Either, Ready};
use tower::{Layer, Service};

use crate::components::auth::{Auth, AuthOption, Token, TokenOptions};
use crate::components::Slot;
use crate::rpc::{CallError, Request, Response};

/// Outbound: attach `authorization: Bearer {token}` from the active client
/// token, refreshing it first when it has expired.
#[derive(Debug, Clone)]
pub struct AuthClientLayer {
    auth: Slot<dyn Auth>,
}

impl AuthClientLayer {
    pub fn new(auth: Slot<dyn Auth>) -> Self {
        Self { auth }
    }
}

impl<S> Layer<S> for AuthClientLayer {
    type Service = AuthClient<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthClient {
            inner,
            auth: self.auth.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthClient<S> {
    inner: S,
    auth: Slot<dyn Auth>,
}

/// The active client token, refreshed and re-installed if it has expired.
fn active_token(auth: &dyn Auth) -> Option<Token> {
    let token = auth.options().token?;
    if !token.is_expired() || token.refresh_token.is_empty() {
        return Some(token);
    }

    match auth.token(TokenOptions::refresh(&token.refresh_token)) {
        Ok(fresh) => {
            if let Err(e) = auth.init(vec![AuthOption::ClientToken(fresh.clone())]) {
                tracing::warn!(error = %e, "Failed to install refreshed token");
            }
            tracing::debug!(auth = auth.name(), "Client token refreshed");
            Some(fresh)
        }
        Err(e) => {
            tracing::warn!(auth = auth.name(), error = %e, "Client token refresh failed");
            Some(token)
        }
    }
}

impl<S> Service<Request> for AuthClient<S>
where
    S: Service<Request, Response = Response, Error = CallError>,
{
    type Response = Response;
    type Error = CallError;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        if !request.headers().contains_key(AUTHORIZATION) {
            let auth = self.auth.get();
            if let Some(token) = active_token(auth.as_ref()) {
                match HeaderValue::from_str(&format!("Bearer {}", token.access_token)) {
                    Ok(value) => {
                        request.headers_mut().insert(AUTHORIZATION, value);
                    }
                    Err(e) => tracing::warn!(error = %e, "Client token is not a valid header"),
                }
            }
        }
        self.inner.call(request)
    }
}

/// Inbound: require a valid bearer token from the service's namespace.
///
/// The resolved [`Account`](crate::components::auth::Account) is inserted into
/// the request extensions. Public endpoints skip the check.
#[derive(Debug, Clone)]
pub struct AuthHandlerLayer {
    auth: Slot<dyn Auth>,
}

impl AuthHandlerLayer {
    pub fn new(auth: Slot<dyn Auth>) -> Self {
        Self { auth }
    }
}

impl<S> Layer<S> for AuthHandlerLayer {
    type Service = AuthHandler<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthHandler {
            inner,
            auth: self.auth.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthHandler<S> {
    inner: S,
    auth: Slot<dyn Auth>,
}

impl<S> AuthHandler<S> {
    fn authorize(&self, request: &mut Request) -> Result<(), CallError> {
        let auth = self.auth.get();
        let opts = auth.options();

        if opts.public_endpoints.iter().any(|e| e == request.endpoint()) {
            return Ok(());
        }

        // The provider decides whether an absent token is acceptable.
        let token = request.bearer_token().unwrap_or_default();
        let account = auth
            .inspect(token)
            .map_err(|e| CallError::Unauthorized(e.to_string()))?;

        if account.namespace != opts.namespace {
            tracing::debug!(
                account = %account.id,
                namespace = %account.namespace,
                expected = %opts.namespace,
                "Rejected request from foreign namespace"
            );
            return Err(CallError::Forbidden(format!(
                "account {} is not in namespace {}",
                account.id, opts.namespace
            )));
        }

        request.extensions_mut().insert(account);
        Ok(())
    }
}

impl<S> Service<Request> for AuthHandler<S>
where
    S: Service<Request, Response = Response, Error = CallError>,
{
    type Response = Response;
    type Error = CallError;
    type Future = Either<Ready<Result<Response, CallError>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        match self.authorize(&mut request) {
            Ok(()) => Either::Right(self.inner.call(request)),
            Err(e) => {
                tracing::debug!(endpoint = %request.endpoint(), error = %e, "Request rejected");
                Either::Left(future::ready(Err(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tower::ServiceExt;

    use crate::components::auth::{Account, GenerateOptions, MemoryAuth, NoopAuth};

    fn provider(namespace: &str) -> Slot<dyn Auth> {
        let auth = MemoryAuth::new();
        auth.init(vec![AuthOption::Namespace(namespace.into())]).unwrap();
        Slot::new(Arc::new(auth))
    }

    fn login(auth: &Slot<dyn Auth>, id: &str, namespace: &str) -> Token {
        let auth = auth.get();
        let account = auth
            .generate(id, GenerateOptions::default().namespace(namespace))
            .unwrap();
        auth.token(TokenOptions::credentials(&account.id, &account.secret))
            .unwrap()
    }

    fn whoami() -> impl Service<
        Request,
        Response = Response,
        Error = CallError,
        Future = future::Ready<Result<Response, CallError>>,
    > + Clone {
        tower::service_fn(|req: Request| {
            let id = req
                .extensions()
                .get::<Account>()
                .map(|a| a.id.clone())
                .unwrap_or_default();
            future::ready(Ok(Response::new(id)))
        })
    }

    fn with_bearer(endpoint: &str, token: &str) -> Request {
        let mut req = Request::new("orders", endpoint, "");
        req.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        req
    }

    #[tokio::test]
    async fn test_client_attaches_active_token() {
        let auth = provider("ns");
        let token = login(&auth, "orders-i1", "ns");
        auth.get()
            .init(vec![AuthOption::ClientToken(token.clone())])
            .unwrap();

        let echo = tower::service_fn(|req: Request| {
            future::ready(Ok::<_, CallError>(Response::new(
                req.bearer_token().unwrap_or_default().to_string(),
            )))
        });
        let resp = AuthClientLayer::new(auth)
            .layer(echo)
            .oneshot(Request::new("billing", "Billing.Charge", ""))
            .await
            .unwrap();
        assert_eq!(resp.body, token.access_token);
    }

    #[tokio::test]
    async fn test_client_refreshes_expired_token() {
        let auth = provider("ns");
        let provider_ref = auth.get();
        let account = provider_ref
            .generate("orders-i1", GenerateOptions::default())
            .unwrap();
        let stale = provider_ref
            .token(
                TokenOptions::credentials(&account.id, &account.secret).expiry(Duration::ZERO),
            )
            .unwrap();
        provider_ref
            .init(vec![AuthOption::ClientToken(stale.clone())])
            .unwrap();

        let echo = tower::service_fn(|req: Request| {
            future::ready(Ok::<_, CallError>(Response::new(
                req.bearer_token().unwrap_or_default().to_string(),
            )))
        });
        let resp = AuthClientLayer::new(auth.clone())
            .layer(echo)
            .oneshot(Request::new("billing", "Billing.Charge", ""))
            .await
            .unwrap();

        assert_ne!(resp.body, stale.access_token);
        let installed = provider_ref.options().token.unwrap();
        assert_eq!(resp.body, installed.access_token);
        assert_eq!(provider_ref.inspect(&installed.access_token).unwrap().id, "orders-i1");
    }

    #[tokio::test]
    async fn test_handler_rejects_missing_token() {
        let err = AuthHandlerLayer::new(provider("ns"))
            .layer(whoami())
            .oneshot(Request::new("orders", "Orders.Get", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_handler_rejects_invalid_token() {
        let err = AuthHandlerLayer::new(provider("ns"))
            .layer(whoami())
            .oneshot(with_bearer("Orders.Get", "not-a-token"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_handler_rejects_foreign_namespace() {
        let auth = provider("ns");
        let token = login(&auth, "intruder", "other");

        let err = AuthHandlerLayer::new(auth)
            .layer(whoami())
            .oneshot(with_bearer("Orders.Get", &token.access_token))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_handler_exposes_account() {
        let auth = provider("ns");
        let token = login(&auth, "billing-i2", "ns");

        let resp = AuthHandlerLayer::new(auth)
            .layer(whoami())
            .oneshot(with_bearer("Orders.Get", &token.access_token))
            .await
            .unwrap();
        assert_eq!(resp.body, "billing-i2");
    }

    #[tokio::test]
    async fn test_public_endpoint_skips_check() {
        let resp = AuthHandlerLayer::new(provider("ns"))
            .layer(whoami())
            .oneshot(Request::new("orders", "Debug.Health", ""))
            .await
            .unwrap();
        assert_eq!(resp.body, "");
    }

    #[tokio::test]
    async fn test_allow_all_provider_admits_anonymous_caller() {
        let auth = NoopAuth::new();
        auth.init(vec![AuthOption::Namespace("ns".into())]).unwrap();
        let auth: Slot<dyn Auth> = Slot::new(Arc::new(auth));

        let resp = AuthHandlerLayer::new(auth)
            .layer(whoami())
            .oneshot(Request::new("orders", "Orders.Get", ""))
            .await
            .unwrap();
        assert_eq!(resp.body, "anonymous");
    }
}
