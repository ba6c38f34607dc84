//! Middleware glue: composes policy, hooks, controller, and reporting
//! around one request.

use thiserror::Error;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::{
    Config, HookDispatcher, ProfilingController, ProfilingEngine, ReportInvoker, ReqprofError,
    Session,
};

/// The wrapped request pipeline.
pub trait Handler {
    type Request;
    type Response;
    type Error;

    fn handle(&self, req: &mut Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Adapts a plain closure into a [`Handler`].
pub struct FnHandler<Req, Resp, Err, F> {
    f: F,
    _marker: PhantomData<fn(&mut Req) -> Result<Resp, Err>>,
}

impl<Req, Resp, Err, F> FnHandler<Req, Resp, Err, F>
where
    F: Fn(&mut Req) -> Result<Resp, Err>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp, Err, F> Handler for FnHandler<Req, Resp, Err, F>
where
    F: Fn(&mut Req) -> Result<Resp, Err>,
{
    type Request = Req;
    type Response = Resp;
    type Error = Err;

    fn handle(&self, req: &mut Req) -> Result<Resp, Err> {
        (self.f)(req)
    }
}

/// Splits middleware failures from wrapped-handler failures so callers can
/// tell which side of the seam gave up.
#[derive(Debug, Error)]
pub enum ServeError<E> {
    #[error("profiler error: {0}")]
    Profiler(#[from] ReqprofError),

    #[error("handler error")]
    Handler(E),
}

/// Ends the engine if the handler unwinds while a session is active. The
/// normal paths stop explicitly and disarm.
struct ReleaseGuard<'a, E: ProfilingEngine> {
    controller: &'a ProfilingController<E>,
    armed: bool,
}

impl<E: ProfilingEngine> ReleaseGuard<'_, E> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<E: ProfilingEngine> Drop for ReleaseGuard<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            self.controller.abort_active();
        }
    }
}

/// Wraps a [`Handler`] with per-request profiling sessions.
pub struct SessionMiddleware<H: Handler, E: ProfilingEngine> {
    inner: H,
    config: Config<H::Request>,
    hooks: HookDispatcher<H::Request>,
    invoker: ReportInvoker,
    controller: Arc<ProfilingController<E>>,
}

impl<H: Handler, E: ProfilingEngine> SessionMiddleware<H, E> {
    pub fn new(inner: H, config: Config<H::Request>, engine: E) -> Self {
        let hooks = HookDispatcher::new(Arc::clone(&config.before), Arc::clone(&config.after));
        let invoker = ReportInvoker::new(config.renderer.clone(), config.write_session_meta);
        Self {
            inner,
            config,
            hooks,
            invoker,
            controller: Arc::new(ProfilingController::new(engine)),
        }
    }

    /// Shared handle to the controller, e.g. for an explicit `shutdown()`
    /// at process exit.
    pub fn controller(&self) -> Arc<ProfilingController<E>> {
        Arc::clone(&self.controller)
    }

    /// One request through the middleware. When profiling is enabled for the
    /// request the observed order is `before, start, handler, stop, report,
    /// after`; `stop` runs on every exit path once `start` succeeded,
    /// including handler error and unwind.
    pub fn call(&self, req: &mut H::Request) -> Result<H::Response, ServeError<H::Error>> {
        if !(self.config.enable)(req) {
            return self.inner.handle(req).map_err(ServeError::Handler);
        }

        self.controller
            .ensure_process_initialized(&self.config.env_directive)?;

        let id = (self.config.generate_id)(req);
        let result_path = self.config.paths.result_file_path(req, &id);
        let mut session = Session::new(id, result_path);

        self.hooks.before(req)?;

        // A start failure (engine busy, bad result path) is fatal for this
        // request's profiling only; the wrapped handler still runs.
        let profiling = match self.controller.start(&mut session) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    session_id = session.id(),
                    error = %err,
                    "profiling start failed; request continues unprofiled"
                );
                false
            }
        };

        let mut guard = ReleaseGuard {
            controller: &self.controller,
            armed: profiling,
        };
        let outcome = self.inner.handle(req);
        guard.disarm();

        if profiling {
            // A stop failure must not alter the already-computed response.
            if let Err(err) = self.controller.stop(&mut session) {
                tracing::warn!(session_id = session.id(), error = %err, "profiling stop failed");
            }
        }

        let response = outcome.map_err(ServeError::Handler)?;

        if profiling && self.config.reporting {
            let null_path = self.config.paths.null_file_path(req);
            let report_dir = (self.config.report_dir)(req);
            if let Err(err) =
                self.invoker
                    .invoke(&self.controller, &null_path, &report_dir, &mut session)
            {
                tracing::warn!(session_id = session.id(), error = %err, "report generation failed");
            }
        }

        self.hooks.after(req)?;

        Ok(response)
    }
}
