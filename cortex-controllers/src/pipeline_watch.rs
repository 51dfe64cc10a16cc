use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cortex_common::meta::Operator;
use cortex_common::records::pipeline::PipelineType;
use cortex_common::records::{Pipeline as PipelineRecord, Step as StepRecord};
use cortex_common::CortexError;
use cortex_pipeline::descheduling::DeschedulingPipeline;
use cortex_pipeline::step::StepInitContext;
use cortex_pipeline::{DbResolver, Pipeline};
use cortex_steps::{DeschedulingStepRegistry, Registry as StepRegistry};
use cortex_store::operator_filter::owns;
use cortex_store::{RecordEvent, StoreClient};
use tokio::sync::RwLock;

/// Holds the live, swappable pipeline instances built from the current
/// Pipeline/Step records (spec §4.4 "Pipeline rebuild"). A Run call
/// clones the `Arc` it needs up front, so a rebuild never disturbs a
/// request already in flight.
pub struct PipelineManager {
    steps: Arc<StepRegistry>,
    descheduling_steps: Arc<DeschedulingStepRegistry>,
    db_resolver: Arc<dyn DbResolver>,
    scheduling: RwLock<HashMap<String, Arc<Pipeline>>>,
    descheduling: RwLock<HashMap<String, Arc<DeschedulingPipeline>>>,
}

impl PipelineManager {
    pub fn new(steps: Arc<StepRegistry>, descheduling_steps: Arc<DeschedulingStepRegistry>, db_resolver: Arc<dyn DbResolver>) -> Self {
        Self {
            steps,
            descheduling_steps,
            db_resolver,
            scheduling: RwLock::new(HashMap::new()),
            descheduling: RwLock::new(HashMap::new()),
        }
    }

    pub async fn scheduling(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.scheduling.read().await.get(name).cloned()
    }

    pub async fn descheduling(&self, name: &str) -> Option<Arc<DeschedulingPipeline>> {
        self.descheduling.read().await.get(name).cloned()
    }

    /// Re-initializes one Pipeline record from scratch: builds and
    /// `Init`s every referenced Step, wraps it scope ▸ validate ▸
    /// monitor, then atomically swaps the live instance. The previous
    /// instance, if any, is Deinit'd only once no in-flight Run still
    /// holds it (spec §4.4, §5 "at most one in-flight rebuild... old
    /// instance serves until new is ready").
    pub async fn rebuild(&self, pipeline: &PipelineRecord, step_records: &[StepRecord]) -> Result<(), CortexError> {
        let by_name: HashMap<&str, &StepRecord> = step_records.iter().map(|s| (s.meta.name.as_str(), s)).collect();

        match pipeline.spec.type_ {
            PipelineType::FilterWeigher => {
                let mut built = Vec::with_capacity(pipeline.spec.steps.len());
                for step_ref in &pipeline.spec.steps {
                    let record = by_name.get(step_ref.name.as_str()).ok_or_else(|| {
                        CortexError::Configuration(format!("pipeline {}: step {} not found", pipeline.meta.name, step_ref.name))
                    })?;
                    let inner = self.steps.build(&record.spec.impl_).await.ok_or_else(|| {
                        CortexError::Configuration(format!("pipeline {}: unknown step impl {}", pipeline.meta.name, record.spec.impl_))
                    })?;
                    inner
                        .init(
                            StepInitContext {
                                options: record.spec.options.clone(),
                                database_secret_ref: record.spec.database_secret_ref.clone(),
                            },
                            self.db_resolver.as_ref(),
                        )
                        .await?;
                    built.push(cortex_pipeline::wrappers::compose(
                        inner,
                        record.spec.kind,
                        record.spec.scope.clone(),
                        record.spec.disabled_validations.clone(),
                    ));
                }
                let new_pipeline = Arc::new(Pipeline::new(pipeline.meta.name.clone(), built));
                let previous = self.scheduling.write().await.insert(pipeline.meta.name.clone(), new_pipeline);
                retire_scheduling(previous);
            }
            PipelineType::Descheduler => {
                let mut built = Vec::with_capacity(pipeline.spec.steps.len());
                for step_ref in &pipeline.spec.steps {
                    let record = by_name.get(step_ref.name.as_str()).ok_or_else(|| {
                        CortexError::Configuration(format!("pipeline {}: step {} not found", pipeline.meta.name, step_ref.name))
                    })?;
                    let inner = self.descheduling_steps.build(&record.spec.impl_).await.ok_or_else(|| {
                        CortexError::Configuration(format!("pipeline {}: unknown descheduling step impl {}", pipeline.meta.name, record.spec.impl_))
                    })?;
                    inner
                        .init(
                            StepInitContext {
                                options: record.spec.options.clone(),
                                database_secret_ref: record.spec.database_secret_ref.clone(),
                            },
                            self.db_resolver.as_ref(),
                        )
                        .await?;
                    built.push(inner);
                }
                let new_pipeline = Arc::new(DeschedulingPipeline::new(pipeline.meta.name.clone(), built));
                let previous = self.descheduling.write().await.insert(pipeline.meta.name.clone(), new_pipeline);
                retire_descheduling(previous);
            }
        }
        Ok(())
    }

    pub async fn remove(&self, name: &str) {
        let previous = self.scheduling.write().await.remove(name);
        retire_scheduling(previous);
        let previous = self.descheduling.write().await.remove(name);
        retire_descheduling(previous);
    }
}

/// Waits until the caller holds the only strong reference to `pipeline`
/// (i.e. every in-flight Run that captured it has finished), then
/// releases its steps' resources.
fn retire_scheduling(pipeline: Option<Arc<Pipeline>>) {
    let Some(pipeline) = pipeline else { return };
    tokio::spawn(async move {
        while Arc::strong_count(&pipeline) > 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        pipeline.deinit_all().await;
    });
}

fn retire_descheduling(pipeline: Option<Arc<DeschedulingPipeline>>) {
    let Some(pipeline) = pipeline else { return };
    tokio::spawn(async move {
        while Arc::strong_count(&pipeline) > 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        pipeline.deinit_all().await;
    });
}

/// Watches `Pipeline`/`Step` records and keeps a `PipelineManager` in
/// sync. A Step change triggers a rebuild of every owned pipeline,
/// since the store holds no reverse index from step name to the
/// pipelines referencing it; this trades a few unnecessary rebuilds for
/// not needing one (an Open Question resolution, see DESIGN.md).
pub struct PipelineWatcher {
    store: Arc<StoreClient>,
    manager: Arc<PipelineManager>,
    operator: Operator,
}

impl PipelineWatcher {
    pub fn new(store: Arc<StoreClient>, manager: Arc<PipelineManager>, operator: Operator) -> Self {
        Self { store, manager, operator }
    }

    pub async fn run(&self) -> Result<(), CortexError> {
        self.rebuild_all().await;

        let (_pipelines, pipeline_rev) = self.store.snapshot_with_rev::<PipelineRecord>().await?;
        let (_steps, step_rev) = self.store.snapshot_with_rev::<StepRecord>().await?;
        let mut pipeline_watch = self.store.watch::<PipelineRecord>(pipeline_rev + 1).await?;
        let mut step_watch = self.store.watch::<StepRecord>(step_rev + 1).await?;

        loop {
            tokio::select! {
                batch = pipeline_watch.next() => {
                    match batch {
                        Some(Ok(events)) => self.handle_pipeline_events(events).await,
                        Some(Err(e)) => log::warn!("pipeline watch error: {e}"),
                        None => break,
                    }
                }
                batch = step_watch.next() => {
                    match batch {
                        Some(Ok(_events)) => self.rebuild_all().await,
                        Some(Err(e)) => log::warn!("step watch error: {e}"),
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_pipeline_events(&self, events: Vec<RecordEvent<PipelineRecord>>) {
        for event in events {
            match event {
                RecordEvent::Put(pipeline) => {
                    if !owns(&self.operator, &pipeline.meta) {
                        continue;
                    }
                    if let Err(e) = self.rebuild_one(&pipeline).await {
                        log::error!("rebuilding pipeline {}: {e}", pipeline.meta.name);
                    }
                }
                RecordEvent::Delete { name } => self.manager.remove(&name).await,
            }
        }
    }

    async fn rebuild_all(&self) {
        let pipelines = match self.store.list::<PipelineRecord>().await {
            Ok(p) => p,
            Err(e) => {
                log::error!("listing pipelines: {e}");
                return;
            }
        };
        let steps = match self.store.list::<StepRecord>().await {
            Ok(s) => s,
            Err(e) => {
                log::error!("listing steps: {e}");
                return;
            }
        };
        for pipeline in pipelines.iter().filter(|p| owns(&self.operator, &p.meta)) {
            if let Err(e) = self.manager.rebuild(pipeline, &steps).await {
                log::error!("rebuilding pipeline {}: {e}", pipeline.meta.name);
            }
        }
    }

    async fn rebuild_one(&self, pipeline: &PipelineRecord) -> Result<(), CortexError> {
        let steps = self.store.list::<StepRecord>().await?;
        self.manager.rebuild(pipeline, &steps).await
    }
}
