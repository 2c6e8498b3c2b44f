//! Call and handler middleware.
//!
//! # Data Flow
//! ```text
//! Outbound (compose_outbound, left fold, last layer outermost):
//!     caller → auth → trace → from_service → base client
//!
//! Inbound (compose_inbound, first layer outermost):
//!     server → stats → trace → auth → handler
//! ```
//!
//! # Design Decisions
//! - A layer is a named function from one [`Capability`] to another
//! - Ordering is decided by the fold, never by call-site mutation order
//! - Layers are tower `Layer`/`Service` pairs boxed behind [`Middleware`]

pub mod auth;
pub mod composer;
pub mod from_service;
pub mod stats;
pub mod trace;

use std::fmt;
use std::sync::Arc;

use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use crate::rpc::{CallError, Capability, Request, Response};

pub use composer::Composer;

/// A named capability transformer.
#[derive(Clone)]
pub struct Middleware {
    name: &'static str,
    wrap: Arc<dyn Fn(Capability) -> Capability + Send + Sync>,
}

impl Middleware {
    pub fn new<F>(name: &'static str, wrap: F) -> Self
    where
        F: Fn(Capability) -> Capability + Send + Sync + 'static,
    {
        Self {
            name,
            wrap: Arc::new(wrap),
        }
    }

    /// Box a tower layer as middleware.
    pub fn from_layer<L>(name: &'static str, layer: L) -> Self
    where
        L: Layer<Capability> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = CallError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(name, move |inner| BoxCloneSyncService::new(layer.layer(inner)))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, inner: Capability) -> Capability {
        (self.wrap)(inner)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Wrap `base` with each layer in turn; the last layer ends up outermost.
pub fn compose_outbound(base: Capability, layers: &[Middleware]) -> Capability {
    layers.iter().fold(base, |inner, layer| layer.apply(inner))
}

/// Wrap `handler` so that the first layer ends up outermost.
pub fn compose_inbound(handler: Capability, layers: &[Middleware]) -> Capability {
    layers
        .iter()
        .rev()
        .fold(handler, |inner, layer| layer.apply(inner))
}
