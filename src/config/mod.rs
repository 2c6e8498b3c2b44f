//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command line flags overlaid (components::cmd)
//!     → validation.rs (semantic checks)
//!     → bound into the service collaborators
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, BrokerConfig, ClientConfig, LogFormat, ObservabilityConfig, ServerConfig,
    ServiceConfig, StoreConfig,
};
pub use validation::{validate_config, ValidationError};
