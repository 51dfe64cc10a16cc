use std::collections::HashMap;
use std::sync::Arc;

use cortex_pipeline::descheduling::DeschedulingStep;
use cortex_pipeline::Step;
use tokio::sync::RwLock;

/// Builds a fresh, un-initialized step instance. Steps carry per-instance
/// state behind `BaseStep`, so the registry hands out a constructor
/// rather than a shared singleton (spec §4.1 "Init ... re-Init replaces
/// prior state").
pub type StepConstructor = Arc<dyn Fn() -> Arc<dyn Step> + Send + Sync>;

/// Process-wide map from a Step record's `impl` key to its constructor
/// (spec §3 "Step ... a registered plugin key"). The Pipeline rebuild
/// watcher looks steps up here when assembling a runnable pipeline.
#[derive(Default)]
pub struct Registry {
    constructors: RwLock<HashMap<String, StepConstructor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, key: impl Into<String>, constructor: StepConstructor) {
        self.constructors.write().await.insert(key.into(), constructor);
    }

    pub async fn build(&self, key: &str) -> Option<Arc<dyn Step>> {
        let guard = self.constructors.read().await;
        guard.get(key).map(|constructor| constructor())
    }

    pub async fn keys(&self) -> Vec<String> {
        self.constructors.read().await.keys().cloned().collect()
    }
}

/// Registers every step shipped with this crate under its canonical
/// plugin key. Operators extend this list in `cortex`'s own startup code
/// for site-specific steps.
pub async fn register_builtin_steps(registry: &Registry) {
    registry
        .register(
            "filter_has_enough_capacity",
            Arc::new(|| Arc::new(crate::capacity::FilterHasEnoughCapacity::new()) as Arc<dyn Step>),
        )
        .await;
    registry
        .register(
            "weigher_utilization",
            Arc::new(|| Arc::new(crate::utilization::WeigherUtilization::new()) as Arc<dyn Step>),
        )
        .await;
    registry
        .register(
            "filter_pinned_projects",
            Arc::new(|| Arc::new(crate::pinned_projects::FilterPinnedProjects::new()) as Arc<dyn Step>),
        )
        .await;
}

/// Builds a fresh, un-initialized descheduling step instance, mirroring
/// `StepConstructor` for the descheduling side of the plugin registry
/// (spec §3 "Step ... a registered plugin key").
pub type DeschedulingStepConstructor = Arc<dyn Fn() -> Arc<dyn DeschedulingStep> + Send + Sync>;

/// Process-wide map from a descheduling Step record's `impl` key to its
/// constructor, mirroring `Registry` for the descheduling pipeline type
/// (spec §4.2 "For descheduling pipelines").
#[derive(Default)]
pub struct DeschedulingStepRegistry {
    constructors: RwLock<HashMap<String, DeschedulingStepConstructor>>,
}

impl DeschedulingStepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, key: impl Into<String>, constructor: DeschedulingStepConstructor) {
        self.constructors.write().await.insert(key.into(), constructor);
    }

    pub async fn build(&self, key: &str) -> Option<Arc<dyn DeschedulingStep>> {
        let guard = self.constructors.read().await;
        guard.get(key).map(|constructor| constructor())
    }
}

/// Registers every descheduling step shipped with this crate under its
/// canonical plugin key.
pub async fn register_builtin_descheduling_steps(registry: &DeschedulingStepRegistry) {
    registry
        .register(
            "descheduler_host_contention",
            Arc::new(|| Arc::new(crate::descheduler_contention::DeschedulerHostContention::new()) as Arc<dyn DeschedulingStep>),
        )
        .await;
}
