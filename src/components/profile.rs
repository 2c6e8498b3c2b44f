//! Profiler contract.
//!
//! Engaged only when `Options::profile` is set: `Service::run` starts it
//! before the identity bootstrap and stops it when `run` returns.

use crate::error::Result;

pub trait Profiler: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}
