use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::records::step::ScopeSpec;
use cortex_common::CortexError;

use crate::cycle_state::CycleState;
use crate::knowledge_db::DbResolver;
use crate::request::{PipelineRequest, Subject};
use crate::step::{Step, StepInitContext, StepResult};

/// Declarative, per-host capability data a Scoper consults for the
/// `*_trait_infixes`/`*_hypervisor_type_infixes` selectors (spec §4.3
/// "Scoper"). Backed by the knowledge plane's host-capability feature
/// table; steps that never scope by capability use `NoCapabilityLookup`.
#[async_trait]
pub trait HostCapabilityLookup: Send + Sync {
    async fn traits(&self, host: &Subject) -> Vec<String>;
    async fn hypervisor_type(&self, host: &Subject) -> Option<String>;
}

pub struct NoCapabilityLookup;

#[async_trait]
impl HostCapabilityLookup for NoCapabilityLookup {
    async fn traits(&self, _host: &Subject) -> Vec<String> {
        Vec::new()
    }

    async fn hypervisor_type(&self, _host: &Subject) -> Option<String> {
        None
    }
}

fn any_infix(haystacks: &[String], infixes: &[String]) -> bool {
    infixes.is_empty() || infixes.iter().any(|infix| haystacks.iter().any(|h| h.contains(infix.as_str())))
}

fn all_infix(haystacks: &[String], infixes: &[String]) -> bool {
    infixes.is_empty() || infixes.iter().all(|infix| haystacks.iter().any(|h| h.contains(infix.as_str())))
}

/// A declarative restriction narrowing which hosts a step evaluates
/// (spec §4.3 "Scoper"). If the request-spec predicate evaluates false,
/// the whole step is bypassed (include-all). Otherwise each host is
/// checked individually against the capability selectors; a host outside
/// scope keeps its prior-step state untouched rather than being filtered.
pub struct Scoper {
    inner: Arc<dyn Step>,
    scope: ScopeSpec,
    capabilities: Arc<dyn HostCapabilityLookup>,
}

impl Scoper {
    pub fn new(inner: Arc<dyn Step>, scope: ScopeSpec) -> Self {
        Self {
            inner,
            scope,
            capabilities: Arc::new(NoCapabilityLookup),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Arc<dyn HostCapabilityLookup>) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn request_level_match(&self, request: &PipelineRequest) -> bool {
        if self.scope.all_of_flavor_name_infixes.is_empty() {
            return true;
        }
        let flavor = request.payload.flavor_name().map(|s| s.to_string()).into_iter().collect::<Vec<_>>();
        all_infix(&flavor, &self.scope.all_of_flavor_name_infixes)
    }

    async fn host_in_scope(&self, host: &Subject) -> bool {
        let traits = self.capabilities.traits(host).await;
        let hypervisor_type = self.capabilities.hypervisor_type(host).await.into_iter().collect::<Vec<_>>();

        let matched = any_infix(&traits, &self.scope.any_of_trait_infixes)
            && all_infix(&traits, &self.scope.all_of_trait_infixes)
            && any_infix(&hypervisor_type, &self.scope.any_of_hypervisor_type_infixes);

        if self.scope.invert_selection {
            !matched
        } else {
            matched
        }
    }
}

#[async_trait]
impl Step for Scoper {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        self.inner.init(ctx, resolver).await
    }

    async fn run(&self, request: &PipelineRequest, cycle: &mut CycleState) -> Result<StepResult, CortexError> {
        if self.scope.is_empty() {
            return self.inner.run(request, cycle).await;
        }

        if !self.request_level_match(request) {
            let mut result = StepResult::new();
            for subject in request.subjects() {
                result.set(subject.clone(), 0.0);
            }
            return Ok(result);
        }

        let mut in_scope = Vec::new();
        let mut out_of_scope = Vec::new();
        for subject in request.subjects() {
            if self.host_in_scope(subject).await {
                in_scope.push(subject.clone());
            } else {
                out_of_scope.push(subject.clone());
            }
        }

        let scoped_request = request.with_subjects(in_scope);
        let mut result = self.inner.run(&scoped_request, cycle).await?;
        for subject in out_of_scope {
            result.activations.entry(subject).or_insert(0.0);
        }
        Ok(result)
    }

    async fn deinit(&self) {
        self.inner.deinit().await
    }
}
