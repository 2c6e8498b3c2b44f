//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Init (service.rs + gate.rs):
//!     overrides → [once] plugins → flags/config → store table → cross-wiring
//!
//! Run (service.rs):
//!     debug handler → profiler → identity → start → wait → stop
//!
//! Start / Stop (hooks.rs):
//!     BeforeStart (fail fast) → server start → AfterStart (fail fast)
//!     BeforeStop (best effort) → server stop → AfterStop (best effort)
//!
//! Shutdown (shutdown.rs + signals.rs):
//!     SIGTERM/SIGINT/SIGQUIT or context cancellation → stop
//! ```
//!
//! # Design Decisions
//! - Initialization runs once per service, concurrent callers wait for it
//! - Start fails fast, stop always attempts every cleanup step
//! - The first shutdown source wins; `stop` runs exactly once

pub mod gate;
pub mod hooks;
pub mod service;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use gate::InitGate;
pub use hooks::HookChain;
pub use service::Service;
pub use shutdown::{ShutdownTrigger, Trigger};
pub use state::LifecycleState;
