//! Path policy: pure mapping from request context to artifact paths.

use std::path::PathBuf;
use std::sync::Arc;

pub type DirFn<Req> = Arc<dyn Fn(&Req) -> PathBuf + Send + Sync>;
pub type FileNameFn<Req> = Arc<dyn Fn(&Req, &str) -> String + Send + Sync>;

/// Two pure functions plus a fixed discard-file name. Evaluated lazily on
/// every call, never cached, so output location can vary by request
/// attributes. Performs no I/O; directory creation belongs to the engine or
/// the caller.
pub struct PathPolicy<Req> {
    result_dir: DirFn<Req>,
    result_file_name: FileNameFn<Req>,
    null_file_name: String,
}

impl<Req> Clone for PathPolicy<Req> {
    fn clone(&self) -> Self {
        Self {
            result_dir: Arc::clone(&self.result_dir),
            result_file_name: Arc::clone(&self.result_file_name),
            null_file_name: self.null_file_name.clone(),
        }
    }
}

impl<Req> Default for PathPolicy<Req> {
    fn default() -> Self {
        Self {
            result_dir: Arc::new(|_| PathBuf::from(".")),
            result_file_name: Arc::new(|_, id| format!("profile.{id}.out")),
            null_file_name: "profile.null.out".to_string(),
        }
    }
}

impl<Req> PathPolicy<Req> {
    pub fn with_result_dir(mut self, f: impl Fn(&Req) -> PathBuf + Send + Sync + 'static) -> Self {
        self.result_dir = Arc::new(f);
        self
    }

    pub fn with_result_file_name(
        mut self,
        f: impl Fn(&Req, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.result_file_name = Arc::new(f);
        self
    }

    pub fn with_null_file_name(mut self, name: impl Into<String>) -> Self {
        self.null_file_name = name.into();
        self
    }

    pub fn null_file_name(&self) -> &str {
        &self.null_file_name
    }

    pub fn result_file_path(&self, req: &Req, session_id: &str) -> PathBuf {
        (self.result_dir)(req).join((self.result_file_name)(req, session_id))
    }

    pub fn null_file_path(&self, req: &Req) -> PathBuf {
        (self.result_dir)(req).join(&self.null_file_name)
    }
}
