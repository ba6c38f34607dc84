//! Profiling lifecycle state machine: process-wide init guard plus the
//! start/stop transitions around the engine.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::{ProfilingEngine, ReqprofError, ReqprofResult, Session, SessionState};

struct ControllerState<E> {
    engine: E,
    init_pid: Option<u32>,
    active: bool,
    ever_started: bool,
    finalized: bool,
}

/// Drives the process-global engine. Init runs at most once per process
/// identity; a forked child sees a new pid and re-initializes in its own
/// identity space. At most one session is active per process at a time;
/// concurrent profiling within one process is unsupported and an overlapping
/// start is rejected.
pub struct ProfilingController<E: ProfilingEngine> {
    state: Mutex<ControllerState<E>>,
}

impl<E: ProfilingEngine> ProfilingController<E> {
    pub fn new(engine: E) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                engine,
                init_pid: None,
                active: false,
                ever_started: false,
                finalized: false,
            }),
        }
    }

    fn lock(&self) -> ReqprofResult<MutexGuard<'_, ControllerState<E>>> {
        self.state
            .lock()
            .map_err(|_| ReqprofError::Engine("controller state poisoned".to_string()))
    }

    /// Idempotent per process identity. The first call under a given pid
    /// applies the env directive and forces the engine quiescent so sampling
    /// never starts implicitly. Concurrent first requests serialize on the
    /// state lock and initialize exactly once.
    pub fn ensure_process_initialized(&self, directive: &str) -> ReqprofResult<()> {
        let mut state = self.lock()?;
        let pid = std::process::id();
        if state.init_pid == Some(pid) {
            return Ok(());
        }
        state.engine.configure(directive)?;
        state.engine.disable()?;
        // A fork leaves the child holding the parent's counters.
        state.active = false;
        state.ever_started = false;
        state.finalized = false;
        state.init_pid = Some(pid);
        tracing::debug!(pid, directive, "profiling engine initialized");
        Ok(())
    }

    pub fn start(&self, session: &mut Session) -> ReqprofResult<()> {
        let mut state = self.lock()?;
        if state.init_pid != Some(std::process::id()) {
            return Err(ReqprofError::Config(
                "process not initialized before session start".to_string(),
            ));
        }
        if state.active {
            return Err(ReqprofError::Engine(
                "a session is already active in this process".to_string(),
            ));
        }
        if session.state() != SessionState::Idle {
            return Err(ReqprofError::Engine(format!(
                "session {} is not idle",
                session.id()
            )));
        }
        state.engine.begin(session.result_path())?;
        state.active = true;
        state.ever_started = true;
        session.transition(SessionState::Active)?;
        tracing::debug!(session_id = session.id(), "profiling session started");
        Ok(())
    }

    pub fn stop(&self, session: &mut Session) -> ReqprofResult<()> {
        let mut state = self.lock()?;
        if session.state() != SessionState::Active {
            return Err(ReqprofError::Engine(format!(
                "session {} is not active",
                session.id()
            )));
        }
        // Clear the active flag even if end() fails; a wedged engine must not
        // block every later request.
        let ended = state.engine.end();
        state.active = false;
        ended?;
        session.transition(SessionState::Stopped)?;
        tracing::debug!(session_id = session.id(), "profiling session stopped");
        Ok(())
    }

    /// Best-effort release for unwind paths. Ends the engine if a session is
    /// active and swallows the error; there is no session left to fail.
    pub fn abort_active(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.active {
            if let Err(err) = state.engine.end() {
                tracing::warn!(error = %err, "failed to end aborted profiling session");
            }
            state.active = false;
        }
    }

    /// Dummy begin/end pair against a discard path. The engine requires this
    /// to finalize the previous result file before the renderer reads it.
    pub fn null_bracket(&self, null_path: &Path) -> ReqprofResult<()> {
        let mut state = self.lock()?;
        if state.active {
            return Err(ReqprofError::Engine(
                "cannot flush while a session is active".to_string(),
            ));
        }
        state.engine.begin(null_path)?;
        state.engine.end()?;
        Ok(())
    }

    /// Finalize the engine if any session was ever started under the current
    /// identity. Advisory; also attempted from `Drop`, but not guaranteed on
    /// abrupt termination.
    pub fn shutdown(&self) -> ReqprofResult<()> {
        let mut state = self.lock()?;
        if state.ever_started && !state.finalized {
            state.engine.finalize()?;
            state.finalized = true;
        }
        Ok(())
    }
}

impl<E: ProfilingEngine> Drop for ProfilingController<E> {
    fn drop(&mut self) {
        let Ok(state) = self.state.get_mut() else {
            return;
        };
        if state.ever_started && !state.finalized {
            if let Err(err) = state.engine.finalize() {
                tracing::warn!(error = %err, "engine finalize failed at teardown");
            }
            state.finalized = true;
        }
    }
}
