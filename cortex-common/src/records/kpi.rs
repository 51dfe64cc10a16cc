use serde::{Deserialize, Serialize};

use crate::meta::{Condition, ObjectMeta, Operator};

/// A reference to a Datasource or Knowledge record this KPI depends on
/// for readiness gating (spec §3 "KPI" / Design Notes "Cycle in
/// ownership").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRef {
    pub kind: DependencyKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    Datasource,
    Knowledge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiSpec {
    pub impl_: String,
    #[serde(default)]
    pub options: serde_json::Value,
    pub dependencies: Vec<DependencyRef>,
    pub operator: Operator,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KpiStatus {
    pub conditions: Vec<Condition>,
    pub ready: bool,
    pub ready_count: usize,
    pub total_count: usize,
}

/// A plugin that aggregates feature-table rows into exported Prometheus
/// metrics, gated on dependency readiness (spec §3 "KPI").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kpi {
    pub meta: ObjectMeta,
    pub spec: KpiSpec,
    #[serde(default)]
    pub status: KpiStatus,
}
