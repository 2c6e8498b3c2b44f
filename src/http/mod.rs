//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, tower-http trace/timeout)
//!     → dispatch: endpoint "Handler.Method" → handler by name
//!     → inbound chain (stats → trace → auth) → handler
//!     → body + status back to the caller
//! ```
//!
//! The outbound counterpart is [`crate::rpc::HttpClient`].

pub mod server;

pub use server::HttpServer;
