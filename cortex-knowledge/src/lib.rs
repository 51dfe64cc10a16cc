//! The knowledge plane (spec §3 "Knowledge feature tables" / §4.7 /
//! §4.8): the Postgres-backed feature-table reader, the Datasource
//! authenticate-and-sync control flow, and the KPI orchestrator with its
//! Prometheus registry.

pub mod datasource;
pub mod db;
pub mod kpi;
pub mod metrics;
pub mod secret;
pub mod syncer;

pub use db::{PgDbResolver, PgKnowledgeDb};
pub use kpi::{DependencyFacts, DependencySource, KpiOrchestrator, KpiPlugin, KpiPluginRegistry};
pub use secret::{SecretResolver, StaticSecretResolver};
pub use syncer::{HypervisorStat, NovaHypervisorSource, NovaHypervisorSyncer, Syncer};
