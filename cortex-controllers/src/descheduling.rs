use std::sync::Arc;
use std::time::Duration;

use cortex_common::meta::Operator;
use cortex_common::records::descheduling::{Descheduling, DeschedulingPhase, DeschedulingSpec, DeschedulingStatus, HostType, RefType};
use cortex_common::CortexError;
use cortex_knowledge::metrics::metrics;
use cortex_pipeline::cycle_detector::{filter_cycles, MigrationHistoryProvider};
use cortex_store::operator_filter::owns;
use cortex_store::StoreClient;
use chrono::Utc;

use crate::collaborators::{NovaMigrator, NovaServerLookup};
use crate::pipeline_watch::PipelineManager;
use crate::queue::{jittered, WorkQueue};

const TICK: Duration = Duration::from_secs(60);
const TICK_JITTER: f64 = 0.2;
const EXECUTOR_POLL: Duration = Duration::from_secs(1);
const TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs the descheduling pipeline on a jittered tick, combines, cycle-
/// filters, and creates one `Descheduling` record per surviving candidate,
/// named by VM UUID so re-nomination on the next tick is a no-op (spec
/// §4.5 "Pipeline runner").
pub struct DeschedulingRunner {
    store: Arc<StoreClient>,
    manager: Arc<PipelineManager>,
    history: Arc<dyn MigrationHistoryProvider>,
    operator: Operator,
    pipeline_name: String,
}

impl DeschedulingRunner {
    pub fn new(
        store: Arc<StoreClient>,
        manager: Arc<PipelineManager>,
        history: Arc<dyn MigrationHistoryProvider>,
        operator: Operator,
        pipeline_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            manager,
            history,
            operator,
            pipeline_name: pipeline_name.into(),
        }
    }

    pub async fn run_forever(&self) {
        loop {
            if let Err(e) = self.tick().await {
                log::error!("descheduling runner tick: {e}");
            }
            tokio::time::sleep(jittered(TICK, TICK_JITTER)).await;
        }
    }

    async fn tick(&self) -> Result<(), CortexError> {
        let Some(pipeline) = self.manager.descheduling(&self.pipeline_name).await else {
            log::debug!("descheduling pipeline {} not yet built, skipping tick", self.pipeline_name);
            return Ok(());
        };
        let candidates = pipeline.run().await?;
        let survivors = filter_cycles(self.history.as_ref(), candidates).await;
        for candidate in survivors {
            if self.store.get::<Descheduling>(&candidate.vm_id).await?.is_some() {
                continue;
            }
            let record = Descheduling {
                meta: cortex_common::meta::ObjectMeta::new(candidate.vm_id.clone(), self.operator.clone()),
                spec: DeschedulingSpec {
                    ref_: candidate.vm_id.clone(),
                    ref_type: RefType::NovaServer,
                    prev_host: candidate.host,
                    prev_host_type: HostType::ComputeHost,
                    reason: candidate.reason,
                },
                status: DeschedulingStatus::default(),
            };
            log::info!("descheduling {}: nominated, reason={}", record.meta.name, record.spec.reason);
            self.store.put(&record).await?;
        }
        Ok(())
    }
}

/// Drives each non-terminal, non-`InProgress` `Descheduling` through
/// validation, live-migration, and polling to a terminal phase (spec §4.5
/// "Executor reconciler"). `dry_run` lets an operator observe nominations
/// without ever issuing a migration.
pub struct DeschedulingExecutor {
    store: Arc<StoreClient>,
    nova: Arc<dyn NovaServerLookup>,
    migrator: Arc<dyn NovaMigrator>,
    operator: Operator,
    dry_run: bool,
    queue: Arc<WorkQueue<String>>,
}

impl DeschedulingExecutor {
    pub fn new(store: Arc<StoreClient>, nova: Arc<dyn NovaServerLookup>, migrator: Arc<dyn NovaMigrator>, operator: Operator, dry_run: bool) -> Self {
        Self {
            store,
            nova,
            migrator,
            operator,
            dry_run,
            queue: Arc::new(WorkQueue::new()),
        }
    }

    pub async fn run(&self) -> Result<(), CortexError> {
        self.queue.spawn_flush_loop();
        loop {
            let records = self.store.list::<Descheduling>().await?;
            for record in &records {
                if owns(&self.operator, &record.meta) && !record.status.is_terminal() && record.status.phase != DeschedulingPhase::InProgress {
                    self.queue.push(record.meta.name.clone()).await;
                }
            }
            let name = tokio::select! {
                name = self.queue.pop() => name,
                _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
            };
            if let Err(e) = self.execute(&name).await {
                log::error!("executing descheduling {name}: {e}");
            }
        }
    }

    async fn execute(&self, name: &str) -> Result<(), CortexError> {
        let Some(mut record) = self.store.get::<Descheduling>(name).await? else {
            return Ok(());
        };
        if record.status.is_terminal() || record.status.phase == DeschedulingPhase::InProgress {
            return Ok(());
        }

        if record.spec.ref_type != RefType::NovaServer || record.spec.prev_host_type != HostType::ComputeHost {
            record.status.phase = DeschedulingPhase::Failed;
            record.status.error = Some("unsupported refType/prevHostType".to_string());
            self.store.put(&record).await?;
            metrics().descheduling_outcomes_total.with_label_values(&["failed"]).inc();
            return Ok(());
        }

        let Some(state) = self.nova.server_state(&record.spec.ref_).await? else {
            log::info!("descheduling {name}: server gone, deleting record");
            self.store.delete::<Descheduling>(name).await?;
            return Ok(());
        };

        if state.host != record.spec.prev_host {
            record.status.phase = DeschedulingPhase::Failed;
            record.status.error = Some(format!("server moved off {} to {} before migration started", record.spec.prev_host, state.host));
            self.store.put(&record).await?;
            metrics().descheduling_outcomes_total.with_label_values(&["failed"]).inc();
            return Ok(());
        }

        if state.status != "ACTIVE" {
            record.status.phase = DeschedulingPhase::Failed;
            record.status.error = Some(format!("server not ACTIVE (status={})", state.status));
            self.store.put(&record).await?;
            metrics().descheduling_outcomes_total.with_label_values(&["failed"]).inc();
            return Ok(());
        }

        if self.dry_run {
            log::info!("descheduling {name}: dry-run, leaving Queued");
            return Ok(());
        }

        record.status.phase = DeschedulingPhase::InProgress;
        self.store.put(&record).await?;

        if let Err(e) = self.migrator.live_migrate(&record.spec.ref_, "").await {
            record.status.phase = DeschedulingPhase::Failed;
            record.status.error = Some(format!("live_migrate failed: {e}"));
            self.store.put(&record).await?;
            metrics().descheduling_outcomes_total.with_label_values(&["failed"]).inc();
            return Ok(());
        }

        loop {
            tokio::time::sleep(jittered(EXECUTOR_POLL, 0.2)).await;
            let Some(state) = self.nova.server_state(&record.spec.ref_).await? else {
                record.status.phase = DeschedulingPhase::Failed;
                record.status.error = Some("server disappeared mid-migration".to_string());
                self.store.put(&record).await?;
                metrics().descheduling_outcomes_total.with_label_values(&["failed"]).inc();
                return Ok(());
            };
            match state.status.as_str() {
                "ACTIVE" => {
                    record.status.phase = DeschedulingPhase::Completed;
                    record.status.new_host = Some(state.host);
                    self.store.put(&record).await?;
                    metrics().descheduling_outcomes_total.with_label_values(&["completed"]).inc();
                    return Ok(());
                }
                "ERROR" => {
                    record.status.phase = DeschedulingPhase::Failed;
                    record.status.error = Some("migration entered ERROR state".to_string());
                    self.store.put(&record).await?;
                    metrics().descheduling_outcomes_total.with_label_values(&["failed"]).inc();
                    return Ok(());
                }
                _ => continue,
            }
        }
    }
}

/// Deletes `Descheduling` records older than 24h regardless of phase;
/// younger ones are requeued for the remaining time (spec §4.5 "TTL
/// cleanup reconciler").
pub struct DeschedulingTtlCleanup {
    store: Arc<StoreClient>,
    operator: Operator,
}

impl DeschedulingTtlCleanup {
    pub fn new(store: Arc<StoreClient>, operator: Operator) -> Self {
        Self { store, operator }
    }

    pub async fn sweep(&self) -> Result<usize, CortexError> {
        let records = self.store.list::<Descheduling>().await?;
        let mut deleted = 0;
        for record in records {
            if !owns(&self.operator, &record.meta) {
                continue;
            }
            let age = Utc::now().signed_duration_since(record.meta.created_at);
            if age.to_std().unwrap_or(Duration::ZERO) >= TTL {
                self.store.delete::<Descheduling>(&record.meta.name).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_pipeline::descheduling::DeschedulingCandidate;

    struct FakeHistory;

    #[async_trait::async_trait]
    impl MigrationHistoryProvider for FakeHistory {
        async fn history(&self, _vm_id: &str) -> Result<Vec<(String, String)>, CortexError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn filter_cycles_keeps_candidates_with_no_history() {
        let candidates = vec![DeschedulingCandidate {
            vm_id: "vm1".to_string(),
            host: "host1".to_string(),
            reason: "overloaded".to_string(),
        }];
        let kept = filter_cycles(&FakeHistory, candidates.clone()).await;
        assert_eq!(kept, candidates);
    }
}
