//! Wire types for the external HTTP surface (spec §6). These are decoded
//! from a Decision's `spec.raw_request` once the pipeline is resolved, and
//! mirror the JSON bodies external schedulers post.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovaHostEntry {
    pub compute_host: String,
    pub hypervisor_hostname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NovaFlavorData {
    pub name: String,
    #[serde(default)]
    pub extra_specs: HashMap<String, String>,
    pub memory_mb: u64,
    pub vcpus: u64,
    pub root_gb: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NovaFlavor {
    pub data: NovaFlavorData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NovaImageProperties {
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NovaImageData {
    pub properties: NovaImageProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NovaImage {
    pub data: NovaImageData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NovaSpecData {
    pub project_id: String,
    pub user_id: String,
    pub instance_uuid: String,
    pub num_instances: u32,
    pub availability_zone: Option<String>,
    pub flavor: NovaFlavor,
    pub image: Option<NovaImage>,
    #[serde(default)]
    pub ignore_hosts: Vec<String>,
    #[serde(default)]
    pub force_hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NovaSpec {
    pub data: NovaSpecData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NovaContext {
    pub project_id: String,
    pub user_id: String,
    pub request_id: String,
    pub global_request_id: Option<String>,
}

/// `POST /scheduler/nova/external` body (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct NovaExternalRequest {
    pub pipeline: String,
    pub hosts: Vec<NovaHostEntry>,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    pub spec: NovaSpec,
    pub context: NovaContext,
    #[serde(default)]
    pub vmware: bool,
}

/// Common response for Nova/Cinder/Manila-style scheduling endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HostsResponse {
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodResourceRequests {
    #[serde(default)]
    pub cpu_millis: u64,
    #[serde(default)]
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodSpecData {
    #[serde(default)]
    pub tolerations: Vec<String>,
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
    #[serde(default)]
    pub resources: PodResourceRequests,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub metadata: PodMetadata,
    pub spec: PodSpecData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeMetadata {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatusAllocatable {
    #[serde(default)]
    pub cpu_millis: u64,
    #[serde(default)]
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub allocatable: NodeStatusAllocatable,
}

/// The pod scheduler extender's request shape (spec §6 "Pod scheduler
/// extender"): a Pod plus a list of candidate Nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct PodExtenderRequest {
    pub pipeline: String,
    pub pod: Pod,
    pub nodes: Vec<Node>,
}

/// The pod extender's response is a weighted activations map per node
/// name, rather than a flat ordered list (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct PodExtenderResponse {
    pub node_names: Vec<String>,
    pub priorities: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManilaShareRequest {
    pub pipeline: String,
    pub share_id: String,
    pub project_id: String,
    pub size_gb: u64,
    pub share_proto: String,
    pub pools: Vec<String>,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CinderVolumeRequest {
    pub pipeline: String,
    pub volume_id: String,
    pub project_id: String,
    pub size_gb: u64,
    pub volume_type: String,
    pub pools: Vec<String>,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}
