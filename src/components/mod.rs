//! Collaborator contracts consumed by the lifecycle orchestrator.
//!
//! # Data Flow
//! ```text
//! Service::new      → Options holds one Slot per collaborator
//! Service::init     → cmd.rs binds flags/env into the slots
//!                   → auth/registry/runtime/store receive WithClient(client)
//! Service::run      → auth.rs mints the self-identity
//!                   → server.rs starts accepting, registers in registry.rs
//! ```
//!
//! # Design Decisions
//! - Every collaborator is a trait object; each ships one in-process
//!   implementation so a service runs without external infrastructure
//! - Collaborators use interior mutability: `init` takes `&self`
//! - Slots can be re-pointed by the flag parser; readers always see the latest

pub mod auth;
pub mod broker;
pub mod cmd;
pub mod plugin;
pub mod profile;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod store;

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

pub use auth::{Account, Auth, AuthOption, MemoryAuth, NoopAuth, Token};
pub use broker::{Broker, MemoryBroker};
pub use cmd::{Cmd, FlagCmd};
pub use plugin::{Plugin, PluginLoader, StaticLoader};
pub use profile::Profiler;
pub use registry::{MemoryRegistry, Registry};
pub use runtime::{LocalRuntime, Runtime};
pub use server::{Handler, Server, ServerOption};
pub use store::{MemoryStore, Store};

/// A shared, swappable handle to a collaborator.
///
/// Clones share the same cell, so a replacement made through one clone is
/// observed by every layer holding another.
pub struct Slot<T: ?Sized>(Arc<ArcSwap<Arc<T>>>);

impl<T: ?Sized> Slot<T> {
    pub fn new(value: Arc<T>) -> Self {
        Slot(Arc::new(ArcSwap::from_pointee(value)))
    }

    /// Current collaborator.
    pub fn get(&self) -> Arc<T> {
        let guard = self.0.load();
        Arc::clone(&**guard)
    }

    /// Replace the collaborator for every holder of this slot.
    pub fn set(&self, value: Arc<T>) {
        self.0.store(Arc::new(value));
    }
}

impl<T: ?Sized> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Slot(..)")
    }
}
