//! Crate-wide error type.
//!
//! # Taxonomy
//! ```text
//! Fatal bootstrap   → Plugin, Flags          (process halts)
//! Lifecycle phases  → Hook, Server, Profile   (returned from start/stop/run)
//! Identity          → Auth                    (returned from run)
//! Collaborators     → Registry, Store, Broker (returned from init or the call)
//! Request path      → Call(CallError)         (returned to the caller only)
//! ```

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::lifecycle::state::LifecycleState;
use crate::rpc::CallError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A plugin could not be loaded or initialised.
    #[error("plugin {name}: {reason}")]
    Plugin { name: String, reason: String },

    /// Command line or environment configuration could not be parsed.
    #[error("flag parsing failed: {0}")]
    Flags(String),

    /// The one-time initialization sequence already failed.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("hook failed: {0}")]
    Hook(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("profiler error: {0}")]
    Profile(String),

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },

    #[error(transparent)]
    Call(#[from] CallError),
}

impl Error {
    /// Shorthand for hook authors.
    pub fn hook(msg: impl Into<String>) -> Self {
        Error::Hook(msg.into())
    }

    /// Bootstrap failures the process cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Plugin { .. } | Error::Flags(_))
    }
}
