use async_trait::async_trait;
use cortex_common::CortexError;
use sqlx::PgPool;

/// What a Datasource dispatches to (spec §4.8 "To syncers"). `sync`
/// returns the row count written, or the skip sentinel to request a
/// requeue without marking the Datasource Failed (e.g. "waiting for
/// dependency datasource").
#[async_trait]
pub trait Syncer: Send + Sync {
    async fn init(&self, pool: &PgPool) -> Result<(), CortexError>;
    async fn sync(&self, pool: &PgPool) -> Result<i64, CortexError>;
}

/// Creates `table` if absent (spec §4.8 "a database handle and a
/// table-creation helper"). Syncers own their table's schema; the core
/// never migrates it on their behalf.
pub async fn ensure_table(pool: &PgPool, table: &str, columns_ddl: &str) -> Result<(), CortexError> {
    let statement = format!("CREATE TABLE IF NOT EXISTS {table} ({columns_ddl})");
    sqlx::query(&statement)
        .execute(pool)
        .await
        .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("creating table {table}: {e}")))?;
    Ok(())
}

/// One hypervisor's reported capacity/usage, as the authenticated
/// OpenStack collaborator would hand it to the syncer. Kept as a small
/// trait so the syncer's storage logic is testable without a live Nova
/// endpoint; the concrete Keystone-authenticated HTTP client is supplied
/// by the deployment, not by this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct HypervisorStat {
    pub compute_host: String,
    pub vcpu_total: i64,
    pub vcpu_used: i64,
    pub memory_mb_total: i64,
    pub memory_mb_used: i64,
}

#[async_trait]
pub trait NovaHypervisorSource: Send + Sync {
    async fn list_hypervisors(&self) -> Result<Vec<HypervisorStat>, CortexError>;
}

const TABLE: &str = "feature_host_capacity";

/// Syncs Nova's hypervisor list into `feature_host_capacity`, the table
/// `filter_has_enough_capacity` reads (spec §6 "Database schema"). This
/// is the one syncer implemented end-to-end to prove the `Syncer`
/// interface out; further syncers are a deployment concern.
pub struct NovaHypervisorSyncer {
    source: std::sync::Arc<dyn NovaHypervisorSource>,
}

impl NovaHypervisorSyncer {
    pub fn new(source: std::sync::Arc<dyn NovaHypervisorSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Syncer for NovaHypervisorSyncer {
    async fn init(&self, pool: &PgPool) -> Result<(), CortexError> {
        ensure_table(
            pool,
            TABLE,
            "compute_host TEXT PRIMARY KEY, vcpu_total BIGINT NOT NULL, vcpu_used BIGINT NOT NULL, \
             memory_mb_total BIGINT NOT NULL, memory_mb_used BIGINT NOT NULL, synced_at TIMESTAMPTZ NOT NULL DEFAULT now()",
        )
        .await
    }

    async fn sync(&self, pool: &PgPool) -> Result<i64, CortexError> {
        let hypervisors = self.source.list_hypervisors().await?;
        let mut written = 0i64;
        for h in &hypervisors {
            sqlx::query(
                "INSERT INTO feature_host_capacity (compute_host, vcpu_total, vcpu_used, memory_mb_total, memory_mb_used, synced_at) \
                 VALUES ($1, $2, $3, $4, $5, now()) \
                 ON CONFLICT (compute_host) DO UPDATE SET \
                 vcpu_total = EXCLUDED.vcpu_total, vcpu_used = EXCLUDED.vcpu_used, \
                 memory_mb_total = EXCLUDED.memory_mb_total, memory_mb_used = EXCLUDED.memory_mb_used, \
                 synced_at = EXCLUDED.synced_at",
            )
            .bind(&h.compute_host)
            .bind(h.vcpu_total)
            .bind(h.vcpu_used)
            .bind(h.memory_mb_total)
            .bind(h.memory_mb_used)
            .execute(pool)
            .await
            .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("writing {TABLE} row for {}: {e}", h.compute_host)))?;
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource(Vec<HypervisorStat>);

    #[async_trait]
    impl NovaHypervisorSource for FakeSource {
        async fn list_hypervisors(&self) -> Result<Vec<HypervisorStat>, CortexError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn source_returns_configured_stats() {
        let stats = vec![HypervisorStat {
            compute_host: "host1".to_string(),
            vcpu_total: 16,
            vcpu_used: 4,
            memory_mb_total: 32768,
            memory_mb_used: 8192,
        }];
        let source = FakeSource(stats.clone());
        assert_eq!(source.list_hypervisors().await.unwrap(), stats);
    }
}
