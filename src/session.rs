//! Per-request session bookkeeping and id generation.

use serde::Serialize;

use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::{ReqprofError, ReqprofResult};

/// Lifecycle of one profiled request. Transitions only move forward; a
/// session is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Stopped,
    Reported,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    result_path: PathBuf,
    state: SessionState,
    started_at: OffsetDateTime,
    finished_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn new(id: String, result_path: PathBuf) -> Self {
        Self {
            id,
            result_path,
            state: SessionState::Idle,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Derived once at creation; never changes for the lifetime of the session.
    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<OffsetDateTime> {
        self.finished_at
    }

    pub(crate) fn transition(&mut self, next: SessionState) -> ReqprofResult<()> {
        let ok = matches!(
            (self.state, next),
            (SessionState::Idle, SessionState::Active)
                | (SessionState::Active, SessionState::Stopped)
                | (SessionState::Stopped, SessionState::Reported)
        );
        if !ok {
            return Err(ReqprofError::Engine(format!(
                "invalid session transition {:?} -> {:?} for {}",
                self.state, next, self.id
            )));
        }
        if next == SessionState::Stopped {
            self.finished_at = Some(OffsetDateTime::now_utc());
        }
        self.state = next;
        Ok(())
    }
}

/// Default session id: process id plus a nanosecond timestamp. Unique within
/// a process with high probability; override via `Config::with_generate_id`
/// for deterministic tests.
pub fn default_session_id() -> String {
    let pid = std::process::id();
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{pid}.{nanos}")
}
