use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::{CortexError, SecretRef};
use serde_json::Value;

/// One row of a feature table, keyed by column name. Kept as a loosely
/// typed map so `cortex-pipeline` doesn't need to depend on a concrete
/// SQL driver crate — `cortex-knowledge` provides the real `sqlx`-backed
/// implementation (spec §4.8 "To plugins").
pub type FeatureRow = HashMap<String, Value>;

/// The database selector handed to steps via `BaseStep::db()`. Steps
/// tolerate missing rows (spec §3 "Knowledge feature tables" invariant)
/// and never write.
#[async_trait]
pub trait KnowledgeDb: Send + Sync {
    /// Executes a named, timed, read-only query (spec §4.8 "a DB selector
    /// with a named prepared-statement timing helper").
    async fn query(&self, name: &str, sql: &str, params: &[&(dyn ToSqlParam + Sync)]) -> Result<Vec<FeatureRow>, CortexError>;
}

/// A minimal parameter abstraction so callers can pass strings/numbers
/// without pulling `sqlx::Encode`/`sqlx::Type` into this crate.
pub trait ToSqlParam: Send + Sync + std::fmt::Debug {
    fn as_text(&self) -> String;
}

impl ToSqlParam for String {
    fn as_text(&self) -> String {
        self.clone()
    }
}

impl ToSqlParam for &str {
    fn as_text(&self) -> String {
        (*self).to_string()
    }
}

impl ToSqlParam for i64 {
    fn as_text(&self) -> String {
        self.to_string()
    }
}

/// Resolves a `SecretRef` to a live, shared `KnowledgeDb` handle. The
/// step's own DB handle is never shared with another step (spec §5
/// "Shared-resource policy"); the resolver may still share pooled
/// connections underneath.
#[async_trait]
pub trait DbResolver: Send + Sync {
    async fn resolve(&self, secret_ref: &SecretRef) -> Result<Arc<dyn KnowledgeDb>, CortexError>;
}

/// A resolver that always fails with a configuration error — useful for
/// steps/tests that never touch the DB.
pub struct NoDbResolver;

#[async_trait]
impl DbResolver for NoDbResolver {
    async fn resolve(&self, secret_ref: &SecretRef) -> Result<Arc<dyn KnowledgeDb>, CortexError> {
        Err(CortexError::Configuration(format!(
            "no database resolver configured (requested secret {})",
            secret_ref.name
        )))
    }
}
