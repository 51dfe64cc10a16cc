use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::meta::{set_condition, Condition, ConditionType, Operator};
use cortex_common::records::kpi::{DependencyKind, DependencyRef};
use cortex_common::records::{Datasource, Knowledge, Kpi};
use cortex_common::CortexError;
use cortex_knowledge::kpi::{DependencyFacts, DependencySource, KpiOrchestrator};
use cortex_store::operator_filter::owns;
use cortex_store::StoreClient;

/// Resolves a KPI's dependency readiness and database secret straight off
/// the live record store (spec §4.7 "walk its dependency references").
pub struct StoreDependencySource {
    store: Arc<StoreClient>,
}

impl StoreDependencySource {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencySource for StoreDependencySource {
    async fn facts(&self, dependency: &DependencyRef) -> Result<DependencyFacts, CortexError> {
        match dependency.kind {
            DependencyKind::Datasource => {
                let Some(datasource) = self.store.get::<Datasource>(&dependency.name).await? else {
                    return Ok(DependencyFacts {
                        ready: false,
                        database_secret_ref: None,
                    });
                };
                Ok(DependencyFacts {
                    ready: datasource.ready(),
                    database_secret_ref: datasource.spec.database_secret_ref.clone(),
                })
            }
            DependencyKind::Knowledge => {
                let Some(knowledge) = self.store.get::<Knowledge>(&dependency.name).await? else {
                    return Ok(DependencyFacts {
                        ready: false,
                        database_secret_ref: None,
                    });
                };
                Ok(DependencyFacts {
                    ready: knowledge.ready(),
                    database_secret_ref: knowledge.spec.database_secret_ref.clone(),
                })
            }
        }
    }
}

/// Keeps `Kpi.status` and the `KpiOrchestrator`'s registration state in
/// sync with the store. A Datasource/Knowledge change re-reconciles every
/// owned KPI, mirroring `PipelineWatcher`'s step-change handling: the
/// store holds no reverse index from dependency name to dependent KPIs,
/// so this trades a few unnecessary reconciles for not needing one.
pub struct KpiWatcher {
    store: Arc<StoreClient>,
    orchestrator: Arc<KpiOrchestrator>,
    source: Arc<dyn DependencySource>,
    operator: Operator,
}

impl KpiWatcher {
    pub fn new(store: Arc<StoreClient>, orchestrator: Arc<KpiOrchestrator>, source: Arc<dyn DependencySource>, operator: Operator) -> Self {
        Self {
            store,
            orchestrator,
            source,
            operator,
        }
    }

    pub async fn run(&self) -> Result<(), CortexError> {
        self.reconcile_all().await;

        let (_ds, ds_rev) = self.store.snapshot_with_rev::<Datasource>().await?;
        let (_kn, kn_rev) = self.store.snapshot_with_rev::<Knowledge>().await?;
        let (_kpi, kpi_rev) = self.store.snapshot_with_rev::<Kpi>().await?;
        let mut ds_watch = self.store.watch::<Datasource>(ds_rev + 1).await?;
        let mut kn_watch = self.store.watch::<Knowledge>(kn_rev + 1).await?;
        let mut kpi_watch = self.store.watch::<Kpi>(kpi_rev + 1).await?;

        loop {
            tokio::select! {
                batch = ds_watch.next() => {
                    match batch {
                        Some(Ok(_)) => self.reconcile_all().await,
                        Some(Err(e)) => log::warn!("datasource watch error: {e}"),
                        None => break,
                    }
                }
                batch = kn_watch.next() => {
                    match batch {
                        Some(Ok(_)) => self.reconcile_all().await,
                        Some(Err(e)) => log::warn!("knowledge watch error: {e}"),
                        None => break,
                    }
                }
                batch = kpi_watch.next() => {
                    match batch {
                        Some(Ok(events)) => {
                            for event in events {
                                match event {
                                    cortex_store::RecordEvent::Put(kpi) => {
                                        if owns(&self.operator, &kpi.meta) {
                                            self.reconcile_one(&kpi).await;
                                        }
                                    }
                                    cortex_store::RecordEvent::Delete { name } => self.orchestrator.forget(&name).await,
                                }
                            }
                        }
                        Some(Err(e)) => log::warn!("kpi watch error: {e}"),
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn reconcile_all(&self) {
        let kpis = match self.store.list::<Kpi>().await {
            Ok(kpis) => kpis,
            Err(e) => {
                log::error!("listing kpis: {e}");
                return;
            }
        };
        for kpi in kpis.iter().filter(|k| owns(&self.operator, &k.meta)) {
            self.reconcile_one(kpi).await;
        }
    }

    async fn reconcile_one(&self, kpi: &Kpi) {
        let mut kpi = kpi.clone();
        match self.orchestrator.reconcile(&kpi, self.source.as_ref()).await {
            Ok((ready_count, total_count)) => {
                kpi.status.ready_count = ready_count;
                kpi.status.total_count = total_count;
                kpi.status.ready = total_count > 0 && ready_count == total_count;
                set_condition(
                    &mut kpi.status.conditions,
                    Condition::new(ConditionType::Ready, kpi.status.ready, "DependenciesChecked", format!("{ready_count}/{total_count} dependencies ready")),
                );
            }
            Err(e) => {
                set_condition(&mut kpi.status.conditions, Condition::new(ConditionType::Error, true, "ReconcileFailed", e.to_string()));
                log::warn!("kpi {}: {e}", kpi.meta.name);
            }
        }
        if let Err(e) = self.store.put(&kpi).await {
            log::error!("persisting kpi {} status: {e}", kpi.meta.name);
        }
    }
}
