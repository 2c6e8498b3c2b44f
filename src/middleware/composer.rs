//! Builds the outbound and inbound layer lists for a service.

use std::sync::Arc;

use crate::components::auth::Auth;
use crate::components::Slot;
use crate::observability::stats::Stats;
use crate::observability::trace::Tracer;

use super::auth::{AuthClientLayer, AuthHandlerLayer};
use super::from_service::FromServiceLayer;
use super::stats::StatsLayer;
use super::trace::TraceLayer;
use super::Middleware;

#[derive(Debug, Clone)]
pub struct Composer {
    service: String,
    auth: Slot<dyn Auth>,
    tracer: Arc<Tracer>,
    stats: Arc<Stats>,
}

impl Composer {
    pub fn new(
        service: impl Into<String>,
        auth: Slot<dyn Auth>,
        tracer: Arc<Tracer>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            service: service.into(),
            auth,
            tracer,
            stats,
        }
    }

    /// `[from_service, trace, auth]`, folded with `compose_outbound` so that
    /// auth is outermost.
    pub fn outbound(&self) -> Vec<Middleware> {
        vec![
            Middleware::from_layer("from_service", FromServiceLayer::new(&self.service)),
            Middleware::from_layer("trace", TraceLayer::client(Arc::clone(&self.tracer))),
            Middleware::from_layer("auth", AuthClientLayer::new(self.auth.clone())),
        ]
    }

    /// `[stats, trace, auth]`, folded with `compose_inbound` so that stats is
    /// outermost and auth sits next to the handler.
    pub fn inbound(&self) -> Vec<Middleware> {
        vec![
            Middleware::from_layer("stats", StatsLayer::new(Arc::clone(&self.stats))),
            Middleware::from_layer("trace", TraceLayer::handler(Arc::clone(&self.tracer))),
            Middleware::from_layer("auth", AuthHandlerLayer::new(self.auth.clone())),
        ]
    }
}
