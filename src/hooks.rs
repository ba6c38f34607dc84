//! Before/after hook dispatch around a profiling session.

use std::sync::Arc;

use crate::ReqprofResult;

pub type HookFn<Req> = Arc<dyn Fn(&Req) -> ReqprofResult<()> + Send + Sync>;

pub fn noop_hook<Req>() -> HookFn<Req> {
    Arc::new(|_| Ok(()))
}

/// Hooks run un-trapped: a hook error fails the whole middleware call for
/// that request. `before` runs strictly before engine start; `after` runs
/// strictly after reporting (or after stop when reporting is disabled).
pub struct HookDispatcher<Req> {
    before: HookFn<Req>,
    after: HookFn<Req>,
}

impl<Req> HookDispatcher<Req> {
    pub fn new(before: HookFn<Req>, after: HookFn<Req>) -> Self {
        Self { before, after }
    }

    pub fn before(&self, req: &Req) -> ReqprofResult<()> {
        tracing::debug!("dispatching before-profile hook");
        (self.before)(req)
    }

    pub fn after(&self, req: &Req) -> ReqprofResult<()> {
        tracing::debug!("dispatching after-profile hook");
        (self.after)(req)
    }
}
