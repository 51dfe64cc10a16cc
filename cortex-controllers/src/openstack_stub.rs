use async_trait::async_trait;
use cortex_common::CortexError;
use cortex_knowledge::syncer::{HypervisorStat, NovaHypervisorSource};

use crate::collaborators::{Hypervisor, HypervisorLookup, NovaMigrator, NovaServerLookup, ServerState};

/// Stands in for the authenticated Keystone/Nova client until a
/// deployment supplies one (spec §4.4/§4.5/§4.6/§4.8 all note the
/// concrete OpenStack client is a deployment concern, not this crate's).
/// Every call reports the dependency as not ready rather than fabricate
/// Nova state, so a `cortex` process started without a real client stays
/// honestly idle instead of scheduling against false data.
pub struct UnconfiguredOpenStack;

#[async_trait]
impl NovaServerLookup for UnconfiguredOpenStack {
    async fn list_server_ids(&self) -> Result<Vec<String>, CortexError> {
        Err(CortexError::DependencyNotReady("no Nova client configured".to_string()))
    }

    async fn server_state(&self, _server_id: &str) -> Result<Option<ServerState>, CortexError> {
        Err(CortexError::DependencyNotReady("no Nova client configured".to_string()))
    }
}

#[async_trait]
impl NovaMigrator for UnconfiguredOpenStack {
    async fn live_migrate(&self, _server_id: &str, _target_host: &str) -> Result<(), CortexError> {
        Err(CortexError::DependencyNotReady("no Nova client configured".to_string()))
    }
}

#[async_trait]
impl HypervisorLookup for UnconfiguredOpenStack {
    async fn list_hypervisors(&self) -> Result<Vec<Hypervisor>, CortexError> {
        Err(CortexError::DependencyNotReady("no Nova client configured".to_string()))
    }
}

#[async_trait]
impl NovaHypervisorSource for UnconfiguredOpenStack {
    async fn list_hypervisors(&self) -> Result<Vec<HypervisorStat>, CortexError> {
        Err(CortexError::DependencyNotReady("no Nova client configured".to_string()))
    }
}
