//! Workload runtime contract.
//!
//! Scheduling workloads is the runtime's own concern; the orchestrator only
//! hands it the outbound client during initialization.

use std::sync::RwLock;

use crate::error::Result;
use crate::rpc::Client;

#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub client: Option<Client>,
}

#[derive(Debug, Clone)]
pub enum RuntimeOption {
    WithClient(Client),
}

pub trait Runtime: Send + Sync {
    fn init(&self, opts: Vec<RuntimeOption>) -> Result<()>;

    fn options(&self) -> RuntimeOptions;

    fn name(&self) -> &'static str;
}

/// Runtime for services managed outside this process.
#[derive(Default)]
pub struct LocalRuntime {
    options: RwLock<RuntimeOptions>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Runtime for LocalRuntime {
    fn init(&self, opts: Vec<RuntimeOption>) -> Result<()> {
        let mut options = self
            .options
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for opt in opts {
            match opt {
                RuntimeOption::WithClient(client) => options.client = Some(client),
            }
        }
        Ok(())
    }

    fn options(&self) -> RuntimeOptions {
        self.options
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
