//! Service self-identity.
//!
//! # Data Flow
//! ```text
//! server options (name, id) + auth namespace
//!     → ServiceIdentity → Role::classify(name)
//!     → bootstrap.rs: generate account → issue token → install as client token
//! ```
//!
//! # Design Decisions
//! - Role classification is a substring match, `"api"` before `"web"`,
//!   so `"webfoo"` is `web` and `"apiweb"` is `api`
//! - The identity is derived on demand, never cached

pub mod bootstrap;

use std::fmt;

pub use bootstrap::register_account;

/// Coarse role assigned to a service account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Service,
    Api,
    Web,
}

impl Role {
    pub fn classify(name: &str) -> Self {
        if name.contains("api") {
            Role::Api
        } else if name.contains("web") {
            Role::Web
        } else {
            Role::Service
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Service => "service",
            Role::Api => "api",
            Role::Web => "web",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub instance_id: String,
    pub namespace: String,
}

impl ServiceIdentity {
    pub fn new(
        name: impl Into<String>,
        instance_id: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instance_id: instance_id.into(),
            namespace: namespace.into(),
        }
    }

    /// `"{name}-{instance_id}"`.
    pub fn account_name(&self) -> String {
        format!("{}-{}", self.name, self.instance_id)
    }

    pub fn role(&self) -> Role {
        Role::classify(&self.name)
    }
}
