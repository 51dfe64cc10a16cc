use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::records::kpi::{DependencyKind, DependencyRef, Kpi};
use cortex_common::{CortexError, SecretRef};
use tokio::sync::Mutex;

use crate::db::PgDbResolver;
use crate::metrics::metrics;

/// Readiness and database-secret facts about one KPI dependency, as
/// resolved from its Datasource or Knowledge record (spec §4.7 "walk its
/// dependency references").
#[derive(Debug, Clone)]
pub struct DependencyFacts {
    pub ready: bool,
    pub database_secret_ref: Option<SecretRef>,
}

#[async_trait]
pub trait DependencySource: Send + Sync {
    async fn facts(&self, dependency: &DependencyRef) -> Result<DependencyFacts, CortexError>;
}

/// A KPI's aggregation logic. `init` resolves the shared DB handle and
/// registers its Prometheus collectors; `deinit` always unregisters
/// first (spec §4.7 "Registered → Unregistered ... always unregister
/// before Deinit").
#[async_trait]
pub trait KpiPlugin: Send + Sync {
    async fn init(&self, options: serde_json::Value, db: Arc<dyn cortex_pipeline::KnowledgeDb>) -> Result<(), CortexError>;
    async fn deinit(&self);
}

pub type KpiPluginConstructor = Arc<dyn Fn() -> Arc<dyn KpiPlugin> + Send + Sync>;

#[derive(Default)]
pub struct KpiPluginRegistry {
    constructors: HashMap<String, KpiPluginConstructor>,
}

impl KpiPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, constructor: KpiPluginConstructor) {
        self.constructors.insert(key.into(), constructor);
    }

    pub fn build(&self, key: &str) -> Option<Arc<dyn KpiPlugin>> {
        self.constructors.get(key).map(|c| c())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistrationState {
    Unregistered,
    Registered,
}

struct LiveKpi {
    state: RegistrationState,
    plugin: Option<Arc<dyn KpiPlugin>>,
}

/// Tracks each KPI's Unregistered/Registered lifecycle and enforces the
/// shared-database invariant across its dependencies (spec §4.7).
pub struct KpiOrchestrator {
    plugins: Arc<KpiPluginRegistry>,
    db_resolver: Arc<PgDbResolver>,
    live: Mutex<HashMap<String, LiveKpi>>,
}

impl KpiOrchestrator {
    pub fn new(plugins: Arc<KpiPluginRegistry>, db_resolver: Arc<PgDbResolver>) -> Self {
        Self {
            plugins,
            db_resolver,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Recomputes one KPI's registration state against its current
    /// dependency set. Returns the computed `ready_count`/`total_count`
    /// for the caller to persist on `Kpi.status`.
    pub async fn reconcile(&self, kpi: &Kpi, source: &dyn DependencySource) -> Result<(usize, usize), CortexError> {
        let mut ready_count = 0;
        let mut shared_secret: Option<SecretRef> = None;
        let mut shared_secret_conflict = false;

        for dependency in &kpi.spec.dependencies {
            let facts = source.facts(dependency).await?;
            if facts.ready {
                ready_count += 1;
            }
            if let Some(secret) = &facts.database_secret_ref {
                match &shared_secret {
                    None => shared_secret = Some(secret.clone()),
                    Some(existing) if existing != secret => shared_secret_conflict = true,
                    Some(_) => {}
                }
            }
        }

        let total = kpi.spec.dependencies.len();
        let all_ready = total > 0 && ready_count == total;

        let mut live = self.live.lock().await;
        let entry = live.entry(kpi.meta.name.clone()).or_insert(LiveKpi {
            state: RegistrationState::Unregistered,
            plugin: None,
        });

        if entry.state == RegistrationState::Registered && !all_ready {
            if let Some(plugin) = entry.plugin.take() {
                metrics().kpi_registered.with_label_values(&[&kpi.meta.name]).set(0);
                plugin.deinit().await;
            }
            entry.state = RegistrationState::Unregistered;
        }

        if entry.state == RegistrationState::Unregistered && all_ready {
            if shared_secret_conflict {
                return Err(CortexError::Configuration(format!(
                    "kpi {}: dependencies reference more than one database secret",
                    kpi.meta.name
                )));
            }
            let Some(secret) = shared_secret else {
                return Err(CortexError::Configuration(format!(
                    "kpi {}: no dependency exposes a database secret",
                    kpi.meta.name
                )));
            };
            let Some(plugin) = self.plugins.build(&kpi.spec.impl_) else {
                return Err(CortexError::Configuration(format!("kpi {}: unknown impl {}", kpi.meta.name, kpi.spec.impl_)));
            };
            let db = self.db_resolver.resolve(&secret).await.map(|db| db as Arc<dyn cortex_pipeline::KnowledgeDb>)?;
            plugin.init(kpi.spec.options.clone(), db).await?;
            metrics().kpi_registered.with_label_values(&[&kpi.meta.name]).set(1);
            entry.state = RegistrationState::Registered;
            entry.plugin = Some(plugin);
        }

        Ok((ready_count, total))
    }

    /// Unregisters and drops a KPI that was deleted (spec §4.7
    /// "the KPI is deleted").
    pub async fn forget(&self, name: &str) {
        let mut live = self.live.lock().await;
        if let Some(mut entry) = live.remove(name) {
            if let Some(plugin) = entry.plugin.take() {
                metrics().kpi_registered.with_label_values(&[name]).set(0);
                plugin.deinit().await;
            }
        }
    }
}

pub fn dependency_kind_table(kind: DependencyKind) -> &'static str {
    match kind {
        DependencyKind::Datasource => "datasource",
        DependencyKind::Knowledge => "knowledge",
    }
}
