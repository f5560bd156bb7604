//! Per-instance run state and the re-entrancy guard.

use std::sync::Mutex;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Faulted,
}

/// Tracks the state of one engine instance.
///
/// `Idle → Running → {Completed | Faulted}`. Entering while `Running` is
/// rejected; a finished instance may be entered again.
#[derive(Debug)]
pub struct RunGuard {
    engine: &'static str,
    state: Mutex<RunState>,
}

impl RunGuard {
    pub fn new(engine: &'static str) -> Self {
        RunGuard {
            engine,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn engine(&self) -> &'static str {
        self.engine
    }

    pub fn state(&self) -> RunState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Move to `Running`. The returned ticket leaves the guard `Faulted`
    /// unless [`RunTicket::complete`] is called.
    pub fn enter(&self) -> Result<RunTicket<'_>, EngineError> {
        let mut state = self.state.lock().map_err(|_| {
            EngineError::Precondition(format!("{} run state is poisoned", self.engine))
        })?;
        if *state == RunState::Running {
            return Err(EngineError::AlreadyRunning {
                engine: self.engine,
            });
        }
        *state = RunState::Running;
        Ok(RunTicket {
            guard: self,
            completed: false,
        })
    }

    fn finish(&self, outcome: RunState) {
        match self.state.lock() {
            Ok(mut state) => *state = outcome,
            Err(poisoned) => *poisoned.into_inner() = outcome,
        }
    }
}

/// Proof that a run is in flight.
#[derive(Debug)]
pub struct RunTicket<'a> {
    guard: &'a RunGuard,
    completed: bool,
}

impl RunTicket<'_> {
    pub fn complete(mut self) {
        self.completed = true;
        self.guard.finish(RunState::Completed);
    }
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.guard.finish(RunState::Faulted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_entry_while_running_is_rejected() {
        let guard = RunGuard::new("eks");
        let ticket = guard.enter().unwrap();
        assert_eq!(guard.state(), RunState::Running);
        assert!(matches!(
            guard.enter(),
            Err(EngineError::AlreadyRunning { engine: "eks" })
        ));
        ticket.complete();
        assert_eq!(guard.state(), RunState::Completed);
    }

    #[test]
    fn dropped_ticket_faults() {
        let guard = RunGuard::new("iks");
        drop(guard.enter().unwrap());
        assert_eq!(guard.state(), RunState::Faulted);
    }

    #[test]
    fn finished_guard_can_run_again() {
        let guard = RunGuard::new("eks");
        guard.enter().unwrap().complete();
        drop(guard.enter().unwrap());
        assert!(guard.enter().is_ok());
    }
}
