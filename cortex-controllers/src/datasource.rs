use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cortex_common::meta::{set_condition, Condition, ConditionType, Operator};
use cortex_common::records::Datasource;
use cortex_common::CortexError;
use cortex_knowledge::datasource::{authenticate_and_sync, SyncerRegistry};
use cortex_knowledge::secret::SecretResolver;
use cortex_store::operator_filter::owns;
use cortex_store::StoreClient;
use sqlx::PgPool;

use crate::queue::{jittered, WorkQueue};

const WAITING_REQUEUE: Duration = Duration::from_secs(60);
const SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Runs `authenticate_and_sync` on a `next_sync_time`-gated schedule and
/// persists the outcome onto `Datasource.status` (spec §4.8). A
/// `DependencyNotReady` error is the syncer's documented "waiting for
/// dependency datasource" sentinel: it requeues with a Waiting condition
/// rather than flipping to Error (spec §7).
pub struct DatasourceController {
    store: Arc<StoreClient>,
    pool: PgPool,
    secrets: Arc<dyn SecretResolver>,
    registry: Arc<SyncerRegistry>,
    operator: Operator,
    queue: Arc<WorkQueue<String>>,
}

impl DatasourceController {
    pub fn new(store: Arc<StoreClient>, pool: PgPool, secrets: Arc<dyn SecretResolver>, registry: Arc<SyncerRegistry>, operator: Operator) -> Self {
        Self {
            store,
            pool,
            secrets,
            registry,
            operator,
            queue: Arc::new(WorkQueue::new()),
        }
    }

    pub async fn run(&self) -> Result<(), CortexError> {
        self.queue.spawn_flush_loop();
        loop {
            let due = self.store.list::<Datasource>().await?;
            for datasource in &due {
                if !owns(&self.operator, &datasource.meta) {
                    continue;
                }
                let is_due = match datasource.status.next_sync_time {
                    None => true,
                    Some(next) => Utc::now() >= next,
                };
                if is_due {
                    self.queue.push(datasource.meta.name.clone()).await;
                }
            }
            let name = tokio::select! {
                name = self.queue.pop() => name,
                _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
            };
            if let Err(e) = self.reconcile(&name).await {
                log::error!("reconciling datasource {name}: {e}");
            }
        }
    }

    async fn reconcile(&self, name: &str) -> Result<(), CortexError> {
        let Some(mut datasource) = self.store.get::<Datasource>(name).await? else {
            return Ok(());
        };

        match authenticate_and_sync(&datasource, self.secrets.as_ref(), &self.registry, &self.pool).await {
            Ok(row_count) => {
                datasource.status.ready = true;
                datasource.status.last_sync_row_count = Some(row_count);
                datasource.status.next_sync_time = Some(Utc::now() + chrono::Duration::from_std(SYNC_INTERVAL).unwrap());
                set_condition(
                    &mut datasource.status.conditions,
                    Condition::new(ConditionType::Ready, true, "SyncSucceeded", format!("synced {row_count} rows")),
                );
                log::info!("datasource {name}: synced {row_count} rows");
                self.store.put(&datasource).await?;
            }
            Err(e) if matches!(e, CortexError::DependencyNotReady(_)) => {
                datasource.status.ready = false;
                set_condition(&mut datasource.status.conditions, Condition::new(ConditionType::Waiting, true, "DependencyNotReady", e.to_string()));
                self.store.put(&datasource).await?;
                self.queue.push_after(name.to_string(), jittered(WAITING_REQUEUE, 0.2)).await;
            }
            Err(e) => {
                datasource.status.ready = false;
                set_condition(&mut datasource.status.conditions, Condition::new(ConditionType::Error, true, "SyncFailed", e.to_string()));
                log::warn!("datasource {name}: sync failed: {e}");
                self.store.put(&datasource).await?;
                self.queue.push_after(name.to_string(), jittered(WAITING_REQUEUE, 0.2)).await;
            }
        }
        Ok(())
    }
}
