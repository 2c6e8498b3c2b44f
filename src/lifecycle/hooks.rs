//! Ordered lifecycle hooks.
//!
//! Two execution modes keep the start/stop asymmetry explicit:
//! - `run_fail_fast`: the first failure aborts the chain (start phases)
//! - `run_best_effort`: every hook runs, the last failure is returned (stop phases)

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::observability::metrics;

/// A fallible zero-argument async action.
pub type Hook = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Hook>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; hooks run in insertion order.
    pub fn push<F, Fut>(&mut self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.push(Arc::new(move || Box::pin(hook())));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run hooks in order, returning the first error without running the rest.
    pub async fn run_fail_fast(&self, phase: &'static str) -> Result<()> {
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook().await {
                tracing::warn!(phase, index, error = %e, "Hook failed, aborting phase");
                metrics::record_hook_failure(phase);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run every hook in order; a failure is recorded and the chain continues.
    /// Returns the last recorded error.
    pub async fn run_best_effort(&self, phase: &'static str) -> Result<()> {
        let mut last = None;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook().await {
                tracing::warn!(phase, index, error = %e, "Hook failed, continuing");
                metrics::record_hook_failure(phase);
                last = Some(e);
            }
        }
        last.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("len", &self.hooks.len())
            .finish()
    }
}
