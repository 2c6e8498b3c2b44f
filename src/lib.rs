//! Service lifecycle orchestration.
//!
//! A [`Service`] owns its collaborators (server, auth, registry, store,
//! broker, runtime) and drives them through `init`, `start`, `run` and
//! `stop`, wrapping inbound and outbound calls with tracing, stats and auth
//! middleware.

pub mod components;
pub mod config;
pub mod debug;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod options;
pub mod rpc;

pub use error::{Error, Result};
pub use lifecycle::{LifecycleState, Service};
pub use options::{Options, Override};
pub use rpc::{CallError, Client, Request, Response};
