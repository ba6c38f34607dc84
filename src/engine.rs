//! The profiling engine seam.

use std::path::Path;

use crate::ReqprofResult;

/// External capability that performs the actual sampling and writes raw
/// profile data. The controller drives it through this minimal surface; the
/// raw file's layout is owned entirely by the engine.
pub trait ProfilingEngine: Send {
    /// Apply the environment directive. Called once per process identity,
    /// before any session.
    fn configure(&mut self, directive: &str) -> ReqprofResult<()>;

    /// Force the engine quiescent after `configure` so sampling never starts
    /// implicitly.
    fn disable(&mut self) -> ReqprofResult<()>;

    /// Start writing profile data to `path`.
    fn begin(&mut self, path: &Path) -> ReqprofResult<()>;

    /// Stop writing.
    fn end(&mut self) -> ReqprofResult<()>;

    /// Best-effort process-exit cleanup.
    fn finalize(&mut self) -> ReqprofResult<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ReqprofError;
    use std::sync::{Arc, Mutex};

    /// Fake engine recording every call into a shared log so tests can
    /// assert ordering across hooks, handler, and engine.
    pub(crate) struct RecordingEngine {
        log: Arc<Mutex<Vec<String>>>,
        fail_begin: bool,
    }

    impl RecordingEngine {
        pub(crate) fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                fail_begin: false,
            }
        }

        pub(crate) fn failing_begin() -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                fail_begin: true,
            }
        }

        pub(crate) fn log(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.log)
        }

        fn push(&self, entry: String) {
            self.log.lock().expect("log lock").push(entry);
        }
    }

    impl ProfilingEngine for RecordingEngine {
        fn configure(&mut self, directive: &str) -> ReqprofResult<()> {
            self.push(format!("configure:{directive}"));
            Ok(())
        }

        fn disable(&mut self) -> ReqprofResult<()> {
            self.push("disable".to_string());
            Ok(())
        }

        fn begin(&mut self, path: &Path) -> ReqprofResult<()> {
            self.push(format!("begin:{}", path.display()));
            if self.fail_begin {
                return Err(ReqprofError::Engine("begin refused".to_string()));
            }
            Ok(())
        }

        fn end(&mut self) -> ReqprofResult<()> {
            self.push("end".to_string());
            Ok(())
        }

        fn finalize(&mut self) -> ReqprofResult<()> {
            self.push("finalize".to_string());
            Ok(())
        }
    }
}
