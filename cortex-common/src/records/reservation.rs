use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSpec {
    /// Currently only "cortex-nova" (spec §3 "Reservation").
    pub scheduler: String,
    pub project_id: String,
    pub flavor_name: String,
    #[serde(default)]
    pub extra_specs: HashMap<String, String>,
    pub vcpus: u64,
    pub memory_mb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationPhase {
    Pending,
    Active,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationStatus {
    pub phase: ReservationPhase,
    pub host: Option<String>,
    pub error: Option<String>,
}

impl Default for ReservationStatus {
    fn default() -> Self {
        Self {
            phase: ReservationPhase::Pending,
            host: None,
            error: None,
        }
    }
}

/// A persisted pre-commitment of capacity on a chosen host for a future
/// workload (spec §3 "Reservation"). Once `status.phase == Active`, the
/// host and resources are treated as consumed by
/// `filter_has_enough_capacity` for any unrelated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub meta: ObjectMeta,
    pub spec: ReservationSpec,
    #[serde(default)]
    pub status: ReservationStatus,
}
