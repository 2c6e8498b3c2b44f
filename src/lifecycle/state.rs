//! Service lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Uninitialized → Initializing → Initialized     (first successful init)
//! Initialized   → Starting     → Running         (start)
//! Starting      → Initialized                    (BeforeStart or server failure)
//! Running       → Stopping     → Stopped         (stop)
//! Stopped       → Starting                       (restart)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{Error, Result};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
    Starting = 3,
    Running = 4,
    Stopping = 5,
    Stopped = 6,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Initialized,
            3 => LifecycleState::Starting,
            4 => LifecycleState::Running,
            5 => LifecycleState::Stopping,
            6 => LifecycleState::Stopped,
            _ => LifecycleState::Uninitialized,
        }
    }
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }

    /// States from which `start` may proceed.
    pub fn can_start(&self) -> bool {
        matches!(self, LifecycleState::Initialized | LifecycleState::Stopped)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder of the current [`LifecycleState`].
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
        }
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, state: LifecycleState) {
        let prev = LifecycleState::from(self.state.swap(state as u8, Ordering::AcqRel));
        if prev != state {
            tracing::debug!(from = %prev, to = %state, "Lifecycle transition");
        }
    }

    /// Move `from → to` atomically, failing with `InvalidState` when the
    /// current state is not `from`.
    pub fn transition(
        &self,
        action: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| tracing::debug!(from = %from, to = %to, "Lifecycle transition"))
            .map_err(|current| Error::InvalidState {
                action,
                state: LifecycleState::from(current),
            })
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
