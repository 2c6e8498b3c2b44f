//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle and middleware produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → stats.rs   (in-process counters for Debug.Stats)
//!     → trace.rs   (span buffer for Debug.Trace)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace id flows across services in the `x-trace-id` header
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod stats;
pub mod trace;
