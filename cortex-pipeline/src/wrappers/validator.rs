use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::records::step::{DisabledValidations, StepKind};
use cortex_common::CortexError;

use crate::cycle_state::CycleState;
use crate::knowledge_db::DbResolver;
use crate::request::PipelineRequest;
use crate::step::{Step, StepInitContext, StepResult};

/// After `Run` returns normally, checks the post-run invariants (spec
/// §4.3 "Validator"): a weigher must not shrink the subject set (unless
/// disabled), and at least one subject must remain (unless disabled —
/// default **on**, resolving Open Question (a)).
pub struct Validator {
    inner: Arc<dyn Step>,
    kind: StepKind,
    disabled: DisabledValidations,
}

impl Validator {
    pub fn new(inner: Arc<dyn Step>, kind: StepKind, disabled: DisabledValidations) -> Self {
        Self { inner, kind, disabled }
    }
}

#[async_trait]
impl Step for Validator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        self.inner.init(ctx, resolver).await
    }

    async fn run(&self, request: &PipelineRequest, cycle: &mut CycleState) -> Result<StepResult, CortexError> {
        let before = request.subjects().len();
        let result = self.inner.run(request, cycle).await?;

        if self.kind == StepKind::Weigher
            && !self.disabled.subject_set_unchanged
            && result.activations.len() != before
        {
            return Err(CortexError::PipelineRun(format!(
                "weigher step {} changed the subject set ({} -> {})",
                self.inner.name(),
                before,
                result.activations.len()
            )));
        }

        if !self.disabled.some_subjects_remain && result.activations.is_empty() {
            return Err(CortexError::PipelineRun(format!(
                "step {} left no subjects — likely misconfigured",
                self.inner.name()
            )));
        }

        Ok(result)
    }

    async fn deinit(&self) {
        self.inner.deinit().await
    }
}
