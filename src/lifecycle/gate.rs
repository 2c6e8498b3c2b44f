//! Exactly-once gate for the initialization sequence.
//!
//! # States
//! ```text
//! Pending → Running → Done(outcome)
//! ```
//! The first caller moves the gate to `Running` and executes the sequence.
//! Concurrent callers block on the condvar until `Done`; later callers read
//! the recorded outcome without running anything.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    Pending,
    Running,
    Done(Option<String>),
}

#[derive(Debug)]
pub struct InitGate {
    state: Mutex<GateState>,
    done: Condvar,
}

impl InitGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Pending),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `sequence` if no caller has yet, otherwise wait for the first
    /// caller and report its outcome.
    ///
    /// The caller that executes `sequence` receives its error unchanged;
    /// every other caller receives `Error::InitFailed` carrying its message.
    pub fn run<F>(&self, sequence: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        {
            let mut state = self.lock();
            while *state == GateState::Running {
                state = self
                    .done
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match &*state {
                GateState::Done(None) => return Ok(()),
                GateState::Done(Some(msg)) => return Err(Error::InitFailed(msg.clone())),
                _ => {}
            }
            *state = GateState::Running;
        }

        let mut completion = Completion {
            gate: self,
            outcome: Some("initialization panicked".to_string()),
        };
        let result = sequence();
        completion.outcome = result.as_ref().err().map(ToString::to_string);
        drop(completion);

        result
    }

    /// Whether the sequence has finished (successfully or not).
    pub fn is_done(&self) -> bool {
        matches!(&*self.lock(), GateState::Done(_))
    }
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the outcome and wakes waiters, also when `sequence` unwinds.
struct Completion<'a> {
    gate: &'a InitGate,
    outcome: Option<String>,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        *self.gate.lock() = GateState::Done(self.outcome.take());
        self.gate.done.notify_all();
    }
}
