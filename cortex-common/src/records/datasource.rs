use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{Condition, ObjectMeta, SecretRef};

/// Which concrete syncer a Datasource dispatches to (spec §4.8 "To
/// syncers").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceSpec {
    pub syncer: String,
    pub auth_secret_ref: SecretRef,
    pub database_secret_ref: Option<SecretRef>,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceStatus {
    pub conditions: Vec<Condition>,
    pub ready: bool,
    pub next_sync_time: Option<DateTime<Utc>>,
    pub last_sync_row_count: Option<i64>,
}

impl Default for DatasourceStatus {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            ready: false,
            next_sync_time: None,
            last_sync_row_count: None,
        }
    }
}

/// An upstream readiness-gated record that authenticates to
/// OpenStack/Prometheus and periodically syncs feature tables (spec §3,
/// §4.8). The core only reads `ready()` and the database secret
/// reference; the concrete sync logic is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datasource {
    pub meta: ObjectMeta,
    pub spec: DatasourceSpec,
    #[serde(default)]
    pub status: DatasourceStatus,
}

impl Datasource {
    pub fn ready(&self) -> bool {
        self.status.ready
    }
}
