//! Impersonation hook (§4.3.3). There is no real Windows token subsystem in
//! this execution environment, so impersonation is modeled as a pluggable
//! strategy invoked by the dispatcher: a no-op by default, but observable
//! in the dispatch log and swappable in tests via [`Impersonator`].

use tracing::debug;

/// Strategy invoked around a create/open when
/// `ServiceFlags::IMPERSONATE_CALLER_USER` is set (§4.3.3).
pub trait Impersonator: Send + Sync {
    /// Called before the real open; any guard it returns is dropped
    /// (reverting impersonation) once the open completes, on every exit
    /// path — success or failure.
    fn begin(&self) -> Box<dyn ImpersonationGuard>;
}

pub trait ImpersonationGuard: Send {}

struct NoopGuard;
impl ImpersonationGuard for NoopGuard {}

/// Default strategy: does nothing beyond logging, since this core has no
/// real caller-token subsystem to impersonate into.
pub struct NoopImpersonator;

impl Impersonator for NoopImpersonator {
    fn begin(&self) -> Box<dyn ImpersonationGuard> {
        debug!("impersonation requested but no token subsystem is wired up; no-op");
        Box::new(NoopGuard)
    }
}
