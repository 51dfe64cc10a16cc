use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cortex_common::{CortexError, SecretRef};
use cortex_pipeline::knowledge_db::{FeatureRow, ToSqlParam};
use cortex_pipeline::{DbResolver, KnowledgeDb};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, PgPool, Row, TypeInfo};

use crate::secret::SecretResolver;

fn decode_value(row: &sqlx::postgres::PgRow, column: &sqlx::postgres::PgColumn) -> serde_json::Value {
    let name = column.name();
    match column.type_info().name() {
        "INT2" | "INT4" => row
            .try_get::<Option<i32>, _>(name)
            .ok()
            .flatten()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(name)
            .ok()
            .flatten()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(name)
            .ok()
            .flatten()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        "BOOL" => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        _ => row
            .try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
    }
}

/// The real, Postgres-backed feature-table reader handed to steps via
/// `BaseStep::db()` (spec §4.8 "a DB selector with a named
/// prepared-statement timing helper"). Every query is logged with its
/// name and duration at `debug`, mirroring the Monitor wrapper's own
/// per-step timing (spec §4.3).
pub struct PgKnowledgeDb {
    pool: PgPool,
}

impl PgKnowledgeDb {
    pub async fn connect(dsn: &str) -> Result<Self, CortexError> {
        let pool = PgPoolOptions::new()
            .max_connections(12)
            .connect(dsn)
            .await
            .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("connecting to knowledge database: {e}")))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl KnowledgeDb for PgKnowledgeDb {
    async fn query(&self, name: &str, sql: &str, params: &[&(dyn ToSqlParam + Sync)]) -> Result<Vec<FeatureRow>, CortexError> {
        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.as_text());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("query {name} failed: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut feature_row = FeatureRow::new();
            for column in row.columns() {
                feature_row.insert(column.name().to_string(), decode_value(row, column));
            }
            out.push(feature_row);
        }

        log::debug!("knowledge query {name} took {:?} ({} rows)", started.elapsed(), out.len());
        Ok(out)
    }
}

/// Resolves a `SecretRef` to a live, pooled `PgKnowledgeDb` handle. Each
/// step gets its own resolved handle (spec §5 "Shared-resource policy");
/// this resolver may still share the underlying connection pool per DSN.
pub struct PgDbResolver {
    secrets: Arc<dyn SecretResolver>,
    pools: tokio::sync::Mutex<std::collections::HashMap<String, Arc<PgKnowledgeDb>>>,
}

impl PgDbResolver {
    pub fn new(secrets: Arc<dyn SecretResolver>) -> Self {
        Self {
            secrets,
            pools: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait]
impl DbResolver for PgDbResolver {
    async fn resolve(&self, secret_ref: &SecretRef) -> Result<Arc<dyn KnowledgeDb>, CortexError> {
        let dsn = self.secrets.reveal(secret_ref).await?;
        let mut pools = self.pools.lock().await;
        if let Some(existing) = pools.get(&dsn) {
            return Ok(existing.clone() as Arc<dyn KnowledgeDb>);
        }
        let db = Arc::new(PgKnowledgeDb::connect(&dsn).await?);
        pools.insert(dsn, db.clone());
        Ok(db as Arc<dyn KnowledgeDb>)
    }
}
