//! Middleware configuration: typed function fields plus `reqprof.toml`
//! loading for the scalar subset.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{HookFn, PathPolicy, ReqprofResult, noop_hook};

pub type EnableFn<Req> = Arc<dyn Fn(&Req) -> bool + Send + Sync>;
pub type IdFn<Req> = Arc<dyn Fn(&Req) -> String + Send + Sync>;

/// External report renderer, invoked as
/// `program [args..] <result-file> <report-dir>`.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "profile-report".to_string(),
            args: Vec::new(),
        }
    }
}

/// Immutable once constructed. Every optional field resolves to a statically
/// known default at construction time; nothing is probed per call.
pub struct Config<Req> {
    pub(crate) enable: EnableFn<Req>,
    pub(crate) reporting: bool,
    pub(crate) paths: PathPolicy<Req>,
    pub(crate) report_dir: crate::paths::DirFn<Req>,
    pub(crate) generate_id: IdFn<Req>,
    pub(crate) before: HookFn<Req>,
    pub(crate) after: HookFn<Req>,
    pub(crate) env_directive: String,
    pub(crate) renderer: RendererConfig,
    pub(crate) write_session_meta: bool,
}

impl<Req> Clone for Config<Req> {
    fn clone(&self) -> Self {
        Self {
            enable: Arc::clone(&self.enable),
            reporting: self.reporting,
            paths: self.paths.clone(),
            report_dir: Arc::clone(&self.report_dir),
            generate_id: Arc::clone(&self.generate_id),
            before: Arc::clone(&self.before),
            after: Arc::clone(&self.after),
            env_directive: self.env_directive.clone(),
            renderer: self.renderer.clone(),
            write_session_meta: self.write_session_meta,
        }
    }
}

impl<Req> Default for Config<Req> {
    fn default() -> Self {
        Self {
            enable: Arc::new(|_| true),
            reporting: true,
            paths: PathPolicy::default(),
            report_dir: Arc::new(|_| PathBuf::from("report")),
            generate_id: Arc::new(|_| crate::default_session_id()),
            before: noop_hook(),
            after: noop_hook(),
            env_directive: default_env_directive(),
            renderer: RendererConfig::default(),
            write_session_meta: true,
        }
    }
}

impl<Req> Config<Req> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-request predicate gating profiling. Evaluated exactly once per
    /// request, before any session exists.
    pub fn with_enable(mut self, f: impl Fn(&Req) -> bool + Send + Sync + 'static) -> Self {
        self.enable = Arc::new(f);
        self
    }

    pub fn with_reporting(mut self, reporting: bool) -> Self {
        self.reporting = reporting;
        self
    }

    pub fn with_result_dir(mut self, f: impl Fn(&Req) -> PathBuf + Send + Sync + 'static) -> Self {
        self.paths = self.paths.with_result_dir(f);
        self
    }

    pub fn with_result_file_name(
        mut self,
        f: impl Fn(&Req, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.paths = self.paths.with_result_file_name(f);
        self
    }

    pub fn with_null_file_name(mut self, name: impl Into<String>) -> Self {
        self.paths = self.paths.with_null_file_name(name);
        self
    }

    pub fn with_report_dir(mut self, f: impl Fn(&Req) -> PathBuf + Send + Sync + 'static) -> Self {
        self.report_dir = Arc::new(f);
        self
    }

    pub fn with_generate_id(mut self, f: impl Fn(&Req) -> String + Send + Sync + 'static) -> Self {
        self.generate_id = Arc::new(f);
        self
    }

    pub fn with_before(
        mut self,
        f: impl Fn(&Req) -> ReqprofResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.before = Arc::new(f);
        self
    }

    pub fn with_after(
        mut self,
        f: impl Fn(&Req) -> ReqprofResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.after = Arc::new(f);
        self
    }

    pub fn with_env_directive(mut self, directive: impl Into<String>) -> Self {
        self.env_directive = directive.into();
        self
    }

    pub fn with_renderer(mut self, renderer: RendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_session_meta(mut self, write: bool) -> Self {
        self.write_session_meta = write;
        self
    }

    pub fn reporting(&self) -> bool {
        self.reporting
    }

    pub fn env_directive(&self) -> &str {
        &self.env_directive
    }

    pub fn paths(&self) -> &PathPolicy<Req> {
        &self.paths
    }

    pub fn renderer(&self) -> &RendererConfig {
        &self.renderer
    }
}

/// Scalar subset of the configuration, loadable from `reqprof.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigFile {
    #[serde(default = "default_reporting")]
    pub reporting: bool,

    #[serde(default = "default_env_directive")]
    pub env_directive: String,

    #[serde(default)]
    pub result_dir: Option<PathBuf>,

    #[serde(default)]
    pub report_dir: Option<PathBuf>,

    #[serde(default)]
    pub null_file_name: Option<String>,

    #[serde(default)]
    pub renderer_program: Option<String>,

    #[serde(default)]
    pub renderer_args: Vec<String>,

    #[serde(default = "default_session_meta")]
    pub write_session_meta: bool,
}

fn default_reporting() -> bool {
    true
}

fn default_env_directive() -> String {
    "start=no".to_string()
}

fn default_session_meta() -> bool {
    true
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            reporting: default_reporting(),
            env_directive: default_env_directive(),
            result_dir: None,
            report_dir: None,
            null_file_name: None,
            renderer_program: None,
            renderer_args: Vec::new(),
            write_session_meta: default_session_meta(),
        }
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> ReqprofResult<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&s)?)
    }

    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<ConfigFile>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Merge the file's scalar options over `config`. Fixed directories
    /// become constant path functions; function-valued options are untouched.
    pub fn apply<Req>(&self, mut config: Config<Req>) -> Config<Req> {
        config.reporting = self.reporting;
        config.env_directive = self.env_directive.clone();
        config.write_session_meta = self.write_session_meta;
        if let Some(dir) = &self.result_dir {
            let dir = dir.clone();
            config.paths = config.paths.with_result_dir(move |_| dir.clone());
        }
        if let Some(dir) = &self.report_dir {
            let dir = dir.clone();
            config.report_dir = Arc::new(move |_| dir.clone());
        }
        if let Some(name) = &self.null_file_name {
            config.paths = config.paths.with_null_file_name(name.clone());
        }
        if let Some(program) = &self.renderer_program {
            config.renderer.program = program.clone();
        }
        if !self.renderer_args.is_empty() {
            config.renderer.args = self.renderer_args.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reqprof-config-{name}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ConfigFile::load_optional(Path::new("/nonexistent/reqprof.toml"));
        assert!(cfg.reporting);
        assert_eq!(cfg.env_directive, "start=no");
        assert!(cfg.result_dir.is_none());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = temp_dir("malformed");
        let path = dir.join("reqprof.toml");
        std::fs::write(&path, "reporting = \"not a bool\"").expect("write config");
        let cfg = ConfigFile::load_optional(&path);
        assert!(cfg.reporting);
        assert!(ConfigFile::load(&path).is_err());
    }

    #[test]
    fn file_options_apply_over_defaults() {
        let dir = temp_dir("apply");
        let path = dir.join("reqprof.toml");
        std::fs::write(
            &path,
            concat!(
                "reporting = false\n",
                "env_directive = \"start=init\"\n",
                "result_dir = \"/var/prof\"\n",
                "renderer_program = \"renderx\"\n",
                "renderer_args = [\"--quiet\"]\n",
            ),
        )
        .expect("write config");

        let file = ConfigFile::load(&path).expect("load");
        let config = file.apply(Config::<()>::new());
        assert!(!config.reporting());
        assert_eq!(config.env_directive(), "start=init");
        assert_eq!(config.renderer().program, "renderx");
        assert_eq!(config.renderer().args, vec!["--quiet".to_string()]);
        assert_eq!(
            config.paths().result_file_path(&(), "7"),
            PathBuf::from("/var/prof/profile.7.out")
        );
    }
}
