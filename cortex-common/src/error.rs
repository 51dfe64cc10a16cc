use thiserror::Error;

/// Error taxonomy surfaced through status conditions and controller return
/// values (spec §7). Each variant maps to a distinct propagation policy:
/// `Configuration` and `DependencyNotReady` stop automatic retry and wait
/// for the record to change; `TransientIo` is requeued with jittered
/// back-off; `PipelineRun` is written to `Decision.status.error` and
/// surfaced to the HTTP caller as a 5xx; `CycleDetected` and `VmGone` are
/// not errors from the operator's perspective, just different outcomes.
#[derive(Debug, Error)]
pub enum CortexError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dependency not ready: {0}")]
    DependencyNotReady(String),

    #[error("transient I/O error: {0}")]
    TransientIo(#[source] anyhow::Error),

    #[error("pipeline run failed: {0}")]
    PipelineRun(String),

    #[error("cycle detected for {0}")]
    CycleDetected(String),

    #[error("referenced VM is gone: {0}")]
    VmGone(String),

    #[error("record not found: {kind} {name}")]
    NotFound { kind: &'static str, name: String },
}

impl CortexError {
    /// The skip sentinel a step may return (spec §4.1/§7): tolerated by the
    /// pipeline and treated as a no-op rather than a failure.
    pub fn skip() -> Self {
        CortexError::Configuration("__skip__".to_string())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, CortexError::Configuration(msg) if msg == "__skip__")
    }

    /// Whether this error class should be retried transparently by a
    /// controller requeue (spec §7 "Propagation policy").
    pub fn is_transient(&self) -> bool {
        matches!(self, CortexError::TransientIo(_))
    }
}
