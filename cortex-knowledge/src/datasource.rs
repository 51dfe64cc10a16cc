use std::collections::HashMap;
use std::sync::Arc;

use cortex_common::records::datasource::Datasource;
use cortex_common::CortexError;
use sqlx::PgPool;

use crate::secret::SecretResolver;
use crate::syncer::Syncer;

/// Builds a `Syncer` from a Datasource's `syncer` key, its resolved auth
/// secret value, and its options blob (spec §4.8 "To syncers").
pub type SyncerConstructor = Arc<dyn Fn(String, serde_json::Value) -> Result<Arc<dyn Syncer>, CortexError> + Send + Sync>;

#[derive(Default)]
pub struct SyncerRegistry {
    constructors: HashMap<String, SyncerConstructor>,
}

impl SyncerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, constructor: SyncerConstructor) {
        self.constructors.insert(key.into(), constructor);
    }

    pub fn build(&self, key: &str, auth: String, options: serde_json::Value) -> Result<Arc<dyn Syncer>, CortexError> {
        let constructor = self
            .constructors
            .get(key)
            .ok_or_else(|| CortexError::Configuration(format!("unknown datasource syncer {key}")))?;
        constructor(auth, options)
    }
}

/// The Datasource reconciler's authenticate-and-sync control flow (spec
/// §4.8, §6 "Database schema"). Resolves the auth secret, builds the
/// matching syncer, lets it provision its own table, and runs one sync
/// pass. A `DependencyNotReady` error is the syncer's "waiting for
/// dependency datasource" sentinel and should be requeued without
/// flipping the Datasource to an error condition (spec §7).
pub async fn authenticate_and_sync(
    datasource: &Datasource,
    secrets: &dyn SecretResolver,
    registry: &SyncerRegistry,
    pool: &PgPool,
) -> Result<i64, CortexError> {
    let auth = secrets.reveal(&datasource.spec.auth_secret_ref).await?;
    let syncer = registry.build(&datasource.spec.syncer, auth, datasource.spec.options.clone())?;
    syncer.init(pool).await?;
    syncer.sync(pool).await
}
