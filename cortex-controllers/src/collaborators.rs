use async_trait::async_trait;
use cortex_common::CortexError;

/// The current host and status of one Nova server, as reported by the
/// authenticated OpenStack collaborator. The concrete Keystone-backed
/// client is supplied by the deployment; these crates only need this
/// shape (spec §4.4 "Cleanup", §4.5 "Executor reconciler").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerState {
    pub host: String,
    pub status: String,
}

#[async_trait]
pub trait NovaServerLookup: Send + Sync {
    /// Every current Nova server id, for the Decision cleanup
    /// reconciler's existence check (spec §4.4 "batches by listing all
    /// current Nova servers").
    async fn list_server_ids(&self) -> Result<Vec<String>, CortexError>;

    /// `None` if the server no longer exists.
    async fn server_state(&self, server_id: &str) -> Result<Option<ServerState>, CortexError>;
}

/// Issues and tracks a live migration (spec §4.5 "issue live-migrate;
/// poll server status").
#[async_trait]
pub trait NovaMigrator: Send + Sync {
    async fn live_migrate(&self, server_id: &str, target_host: &str) -> Result<(), CortexError>;
}

/// One Nova compute hypervisor, as reported for the Reservation
/// controller's candidate-host construction (spec §4.6 "query the Nova
/// hypervisor list to build the candidate host set restricted to the
/// requested hypervisor type").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypervisor {
    pub host: String,
    pub hypervisor_type: String,
}

#[async_trait]
pub trait HypervisorLookup: Send + Sync {
    async fn list_hypervisors(&self) -> Result<Vec<Hypervisor>, CortexError>;
}

/// The internal scheduler endpoint the Reservation controller posts a
/// synthesized request to (spec §4.6 "POST a synthesized scheduling
/// request ... with a distinguished pipeline name"). In this build, the
/// Decision controller and HTTP surface run in the same process, so this
/// is an in-process call rather than a real loopback HTTP request; the
/// trait boundary keeps the Reservation controller ignorant of that.
#[async_trait]
pub trait ReservationScheduler: Send + Sync {
    async fn schedule(&self, pipeline: &str, candidate_hosts: Vec<String>, vcpus: u64, memory_mb: u64, project_id: &str, flavor_name: &str) -> Result<Vec<String>, CortexError>;
}
