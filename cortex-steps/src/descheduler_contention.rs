use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::CortexError;
use cortex_pipeline::descheduling::{DeschedulingCandidate, DeschedulingStep};
use cortex_pipeline::knowledge_db::{FeatureRow, ToSqlParam};
use cortex_pipeline::step::StepInitContext;
use cortex_pipeline::{DbResolver, KnowledgeDb};
use serde::Deserialize;
use tokio::sync::RwLock;

const CONTENTION_TABLE: &str = "feature_host_contention";
const VMS_TABLE: &str = "feature_host_vms";

fn default_threshold_pct() -> f64 {
    90.0
}

#[derive(Debug, Clone, Deserialize)]
struct Options {
    #[serde(default = "default_threshold_pct")]
    threshold_pct: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threshold_pct: default_threshold_pct(),
        }
    }
}

fn row_f64(row: &FeatureRow, column: &str) -> Option<f64> {
    row.get(column).and_then(|v| v.as_f64())
}

fn row_str(row: &FeatureRow, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_str()).map(str::to_string)
}

struct State {
    options: Options,
    db: Arc<dyn KnowledgeDb>,
}

/// Nominates every VM running on a host whose reported contention
/// exceeds `threshold_pct` (default 90), reading the same kind of
/// feature table the scheduling weighers read (spec §6 lists
/// `feature_vrops_hostsystem_contention_long_term` as a concrete
/// example of this shape). One concrete `DeschedulingStep` shipped with
/// this crate, proving `combine`/the cycle detector out against a real
/// plugin rather than only hand-built candidates (spec §4.5, §8
/// scenario S4).
pub struct DeschedulerHostContention {
    state: RwLock<Option<State>>,
}

impl DeschedulerHostContention {
    pub fn new() -> Self {
        Self { state: RwLock::new(None) }
    }
}

impl Default for DeschedulerHostContention {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeschedulingStep for DeschedulerHostContention {
    fn name(&self) -> &str {
        "descheduler_host_contention"
    }

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        let options: Options = if ctx.options.is_null() {
            Options::default()
        } else {
            serde_json::from_value(ctx.options.clone()).map_err(|e| CortexError::Configuration(format!("descheduler_host_contention: invalid options: {e}")))?
        };
        let secret_ref = ctx
            .database_secret_ref
            .ok_or_else(|| CortexError::Configuration("descheduler_host_contention requires a database secret ref".to_string()))?;
        let db = resolver.resolve(&secret_ref).await?;
        *self.state.write().await = Some(State { options, db });
        Ok(())
    }

    async fn run(&self) -> Result<Vec<DeschedulingCandidate>, CortexError> {
        let guard = self.state.read().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| CortexError::Configuration("descheduler_host_contention not initialized".to_string()))?;

        let rows = state.db.query("descheduler_host_contention", &format!("SELECT * FROM {CONTENTION_TABLE}"), &[]).await?;
        let mut candidates = Vec::new();
        for row in &rows {
            let Some(host) = row_str(row, "compute_host") else { continue };
            let contention_pct = row_f64(row, "contention_pct").unwrap_or(0.0);
            if contention_pct <= state.options.threshold_pct {
                continue;
            }
            let vm_rows = state
                .db
                .query(
                    "descheduler_host_contention_vms",
                    &format!("SELECT * FROM {VMS_TABLE} WHERE compute_host = $1"),
                    &[&host as &(dyn ToSqlParam + Sync)],
                )
                .await?;
            for vm_row in &vm_rows {
                let Some(vm_id) = row_str(vm_row, "vm_id") else { continue };
                candidates.push(DeschedulingCandidate {
                    vm_id,
                    host: host.clone(),
                    reason: format!("host contention {contention_pct:.1}% exceeds threshold {:.1}%", state.options.threshold_pct),
                });
            }
        }
        Ok(candidates)
    }

    async fn deinit(&self) {
        *self.state.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_pipeline::knowledge_db::FeatureRow;
    use std::collections::HashMap;

    struct FakeDb {
        contention: Vec<FeatureRow>,
        vms_by_host: HashMap<String, Vec<FeatureRow>>,
    }

    #[async_trait]
    impl KnowledgeDb for FakeDb {
        async fn query(&self, name: &str, _sql: &str, params: &[&(dyn ToSqlParam + Sync)]) -> Result<Vec<FeatureRow>, CortexError> {
            if name == "descheduler_host_contention" {
                return Ok(self.contention.clone());
            }
            let host = params[0].as_text();
            Ok(self.vms_by_host.get(&host).cloned().unwrap_or_default())
        }
    }

    struct AlwaysDbResolver(Arc<dyn KnowledgeDb>);

    #[async_trait]
    impl DbResolver for AlwaysDbResolver {
        async fn resolve(&self, _secret_ref: &cortex_common::SecretRef) -> Result<Arc<dyn KnowledgeDb>, CortexError> {
            Ok(self.0.clone())
        }
    }

    fn contention_row(host: &str, pct: f64) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.insert("compute_host".into(), serde_json::json!(host));
        row.insert("contention_pct".into(), serde_json::json!(pct));
        row
    }

    fn vm_row(vm_id: &str) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.insert("vm_id".into(), serde_json::json!(vm_id));
        row
    }

    async fn init_step(db: Arc<dyn KnowledgeDb>) -> DeschedulerHostContention {
        let step = DeschedulerHostContention::new();
        step.init(
            StepInitContext {
                options: serde_json::Value::Null,
                database_secret_ref: Some(cortex_common::SecretRef {
                    name: "db".to_string(),
                    key: "dsn".to_string(),
                }),
            },
            &AlwaysDbResolver(db),
        )
        .await
        .unwrap();
        step
    }

    #[tokio::test]
    async fn nominates_vms_on_hosts_over_threshold() {
        let db: Arc<dyn KnowledgeDb> = Arc::new(FakeDb {
            contention: vec![contention_row("host1", 95.0), contention_row("host2", 40.0)],
            vms_by_host: HashMap::from([("host1".to_string(), vec![vm_row("vm1"), vm_row("vm2")])]),
        });
        let step = init_step(db).await;

        let candidates = step.run().await.unwrap();
        let vm_ids: Vec<&str> = candidates.iter().map(|c| c.vm_id.as_str()).collect();
        assert_eq!(vm_ids, vec!["vm1", "vm2"]);
        assert!(candidates.iter().all(|c| c.host == "host1"));
    }

    #[tokio::test]
    async fn host_under_threshold_contributes_nothing() {
        let db: Arc<dyn KnowledgeDb> = Arc::new(FakeDb {
            contention: vec![contention_row("host2", 40.0)],
            vms_by_host: HashMap::new(),
        });
        let step = init_step(db).await;
        assert!(step.run().await.unwrap().is_empty());
    }
}
