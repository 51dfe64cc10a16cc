//! Step wrappers (spec §4.3): validator, monitor, scoper. They compose as
//! scope ▸ validate ▸ monitor, applied outermost-first during `Run` — the
//! scoper decides whether the step runs at all, the validator checks the
//! post-run invariants, and the monitor is the innermost layer closest to
//! the actual implementation so its latency measurement excludes wrapper
//! overhead.

pub mod monitor;
pub mod scoper;
pub mod validator;

pub use monitor::Monitor;
pub use scoper::Scoper;
pub use validator::Validator;

use std::sync::Arc;

use cortex_common::records::step::{DisabledValidations, ScopeSpec, StepKind};

use crate::step::Step;

/// Wraps `inner` in scope ▸ validate ▸ monitor order, matching how a
/// `Step` record's configuration (kind, scope, disabled-validations) is
/// applied once per pipeline rebuild.
pub fn compose(
    inner: Arc<dyn Step>,
    kind: StepKind,
    scope: ScopeSpec,
    disabled: DisabledValidations,
) -> Arc<dyn Step> {
    let monitored = Arc::new(Monitor::new(inner));
    let validated = Arc::new(Validator::new(monitored, kind, disabled));
    Arc::new(Scoper::new(validated, scope))
}
