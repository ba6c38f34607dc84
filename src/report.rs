//! Post-capture report generation via the external renderer.

use serde::Serialize;

use std::path::Path;
use std::process::Command;

use time::format_description::well_known::Rfc3339;

use crate::{
    ProfilingController, ProfilingEngine, RendererConfig, ReqprofError, ReqprofResult, Session,
    SessionState,
};

/// Session summary persisted next to the rendered report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionMeta {
    pub session_id: String,
    pub result_path: String,
    pub state: SessionState,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub renderer: String,
    pub renderer_outcome: String,
}

/// Runs the null-file bracketing, spawns the renderer, and records the
/// outcome. Renderer failures are logged and surfaced in the metadata but
/// never fail the request.
pub struct ReportInvoker {
    renderer: RendererConfig,
    write_session_meta: bool,
}

impl ReportInvoker {
    pub fn new(renderer: RendererConfig, write_session_meta: bool) -> Self {
        Self {
            renderer,
            write_session_meta,
        }
    }

    pub fn invoke<E: ProfilingEngine>(
        &self,
        controller: &ProfilingController<E>,
        null_path: &Path,
        report_dir: &Path,
        session: &mut Session,
    ) -> ReqprofResult<()> {
        if session.state() != SessionState::Stopped || session.id().is_empty() {
            return Err(ReqprofError::Report(format!(
                "session {:?} is not ready for reporting (state {:?})",
                session.id(),
                session.state()
            )));
        }

        // The engine needs a dummy begin/end pair to finalize the previous
        // result file before the renderer reads it.
        controller.null_bracket(null_path)?;

        let status = Command::new(&self.renderer.program)
            .args(&self.renderer.args)
            .arg(session.result_path())
            .arg(report_dir)
            .status();
        let outcome = match status {
            Ok(status) if status.success() => "ok".to_string(),
            Ok(status) => {
                tracing::warn!(
                    session_id = session.id(),
                    renderer = %self.renderer.program,
                    code = status.code(),
                    "report renderer exited with failure"
                );
                format!("exit code {:?}", status.code())
            }
            Err(err) => {
                tracing::warn!(
                    session_id = session.id(),
                    renderer = %self.renderer.program,
                    error = %err,
                    "report renderer could not be spawned"
                );
                format!("spawn failed: {err}")
            }
        };

        session.transition(SessionState::Reported)?;

        if self.write_session_meta {
            if let Err(err) = self.write_meta(report_dir, session, &outcome) {
                tracing::warn!(session_id = session.id(), error = %err, "failed to write session metadata");
            }
        }
        Ok(())
    }

    fn write_meta(&self, report_dir: &Path, session: &Session, outcome: &str) -> ReqprofResult<()> {
        let meta = SessionMeta {
            session_id: session.id().to_string(),
            result_path: session.result_path().display().to_string(),
            state: session.state(),
            started_at: format_timestamp(session.started_at())?,
            finished_at: session
                .finished_at()
                .map(format_timestamp)
                .transpose()?,
            renderer: self.renderer.program.clone(),
            renderer_outcome: outcome.to_string(),
        };
        std::fs::create_dir_all(report_dir)?;
        let path = report_dir.join("meta.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }
}

fn format_timestamp(ts: time::OffsetDateTime) -> ReqprofResult<String> {
    ts.format(&Rfc3339)
        .map_err(|err| ReqprofError::Report(format!("format timestamp: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::RecordingEngine;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reqprof-report-{name}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn stopped_session(id: &str) -> Session {
        let mut s = Session::new(id.to_string(), PathBuf::from(format!("/tmp/{id}.out")));
        s.transition(SessionState::Active).expect("activate");
        s.transition(SessionState::Stopped).expect("stop");
        s
    }

    fn renderer(program: &str) -> RendererConfig {
        RendererConfig {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn brackets_then_renders_and_writes_meta() {
        let engine = RecordingEngine::new();
        let log = engine.log();
        let controller = ProfilingController::new(engine);
        let report_dir = temp_dir("ok");
        let mut session = stopped_session("s1");

        let invoker = ReportInvoker::new(renderer("/bin/true"), true);
        invoker
            .invoke(
                &controller,
                Path::new("/tmp/profile.null.out"),
                &report_dir,
                &mut session,
            )
            .expect("invoke");

        assert_eq!(session.state(), SessionState::Reported);
        let calls = log.lock().expect("log lock").clone();
        assert_eq!(calls, vec!["begin:/tmp/profile.null.out", "end"]);

        let meta = std::fs::read_to_string(report_dir.join("meta.json")).expect("read meta");
        let meta: serde_json::Value = serde_json::from_str(&meta).expect("parse meta");
        assert_eq!(meta["session_id"], "s1");
        assert_eq!(meta["renderer_outcome"], "ok");
        assert_eq!(meta["state"], "reported");
    }

    #[test]
    fn renderer_failure_does_not_fail_the_invocation() {
        let controller = ProfilingController::new(RecordingEngine::new());
        let report_dir = temp_dir("fail");
        let mut session = stopped_session("s2");

        let invoker = ReportInvoker::new(renderer("/bin/false"), true);
        invoker
            .invoke(
                &controller,
                Path::new("/tmp/profile.null.out"),
                &report_dir,
                &mut session,
            )
            .expect("non-zero exit is non-fatal");

        assert_eq!(session.state(), SessionState::Reported);
        let meta = std::fs::read_to_string(report_dir.join("meta.json")).expect("read meta");
        assert!(meta.contains("exit code"));
    }

    #[test]
    fn missing_renderer_is_non_fatal_too() {
        let controller = ProfilingController::new(RecordingEngine::new());
        let report_dir = temp_dir("missing");
        let mut session = stopped_session("s3");

        let invoker = ReportInvoker::new(renderer("/nonexistent/renderer-binary"), true);
        invoker
            .invoke(
                &controller,
                Path::new("/tmp/profile.null.out"),
                &report_dir,
                &mut session,
            )
            .expect("spawn failure is non-fatal");
        let meta = std::fs::read_to_string(report_dir.join("meta.json")).expect("read meta");
        assert!(meta.contains("spawn failed"));
    }

    #[test]
    fn sessions_that_never_stopped_are_rejected() {
        let controller = ProfilingController::new(RecordingEngine::new());
        let report_dir = temp_dir("idle");
        let mut session = Session::new("s4".to_string(), PathBuf::from("/tmp/s4.out"));

        let invoker = ReportInvoker::new(renderer("/bin/true"), false);
        let err = invoker
            .invoke(
                &controller,
                Path::new("/tmp/profile.null.out"),
                &report_dir,
                &mut session,
            )
            .expect_err("idle session");
        assert!(matches!(err, ReqprofError::Report(_)));
    }
}
