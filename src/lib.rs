//! Request-scoped profiling session middleware: wraps a request pipeline,
//! decides per request whether to capture a profile, drives the external
//! engine's start/stop lifecycle, and dispatches post-capture reporting.

mod config;
mod controller;
mod engine;
mod error;
mod hooks;
mod middleware;
mod paths;
mod report;
mod session;

pub use config::*;
pub use controller::*;
pub use engine::*;
pub use error::*;
pub use hooks::*;
pub use middleware::*;
pub use paths::*;
pub use report::*;
pub use session::*;
