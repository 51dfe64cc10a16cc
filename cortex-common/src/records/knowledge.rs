use serde::{Deserialize, Serialize};

use crate::meta::{Condition, ObjectMeta, SecretRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSpec {
    pub database_secret_ref: Option<SecretRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeStatus {
    pub conditions: Vec<Condition>,
    pub ready: bool,
}

/// A readiness-gated record whose features are derived from one or more
/// Datasources (spec §3 "Knowledge / Datasource"). The core only reads
/// `ready()` and the database secret reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Knowledge {
    pub meta: ObjectMeta,
    pub spec: KnowledgeSpec,
    #[serde(default)]
    pub status: KnowledgeStatus,
}

impl Knowledge {
    pub fn ready(&self) -> bool {
        self.status.ready
    }
}
