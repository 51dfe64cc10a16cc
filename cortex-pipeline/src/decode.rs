use cortex_common::records::decision::DecisionType;
use cortex_common::wire;
use cortex_common::CortexError;

use crate::request::{PipelineRequest, RequestPayload};

/// Decodes a Decision's opaque `spec.raw_request` into a `PipelineRequest`,
/// once the Decision reconciler has resolved which pipeline to run it
/// through (spec §4.4 "decode the raw request, run the pipeline"). Each
/// scheduler kind carries the candidate subject set and initial weights
/// in a different place in its wire body; this is the one place that
/// knows where to look for each.
pub fn decode_raw_request(decision_type: DecisionType, raw: &serde_json::Value) -> Result<PipelineRequest, CortexError> {
    match decision_type {
        DecisionType::NovaServer => {
            let body: wire::NovaExternalRequest = serde_json::from_value(raw.clone())
                .map_err(|e| CortexError::Configuration(format!("decoding nova-server raw request: {e}")))?;
            let subjects = body.hosts.iter().map(|h| h.compute_host.clone()).collect();
            Ok(PipelineRequest::new(subjects, body.weights, RequestPayload::NovaServer(body.spec.data)))
        }
        DecisionType::Pod => {
            let body: wire::PodExtenderRequest = serde_json::from_value(raw.clone())
                .map_err(|e| CortexError::Configuration(format!("decoding pod raw request: {e}")))?;
            let subjects = body.nodes.iter().map(|n| n.metadata.name.clone()).collect();
            Ok(PipelineRequest::new(subjects, std::collections::HashMap::new(), RequestPayload::Pod(body.pod)))
        }
        DecisionType::ManilaShare => {
            let body: wire::ManilaShareRequest = serde_json::from_value(raw.clone())
                .map_err(|e| CortexError::Configuration(format!("decoding manila-share raw request: {e}")))?;
            let subjects = body.pools.clone();
            let weights = body.weights.clone();
            Ok(PipelineRequest::new(subjects, weights, RequestPayload::ManilaShare(body)))
        }
        DecisionType::CinderVolume => {
            let body: wire::CinderVolumeRequest = serde_json::from_value(raw.clone())
                .map_err(|e| CortexError::Configuration(format!("decoding cinder-volume raw request: {e}")))?;
            let subjects = body.pools.clone();
            let weights = body.weights.clone();
            Ok(PipelineRequest::new(subjects, weights, RequestPayload::CinderVolume(body)))
        }
    }
}

/// Best-effort extraction of the Nova server id a nova-server Decision's
/// raw request concerns, used by the Decision cleanup reconciler to check
/// whether the underlying resource still exists (spec §4.4 "Cleanup").
pub fn nova_instance_uuid(raw: &serde_json::Value) -> Option<String> {
    raw.get("spec")?.get("data")?.get("instance_uuid")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nova_external_request() {
        let raw = json!({
            "pipeline": "default",
            "hosts": [{"compute_host": "host1", "hypervisor_hostname": "host1.internal"}],
            "weights": {"host1": 0.5},
            "spec": {"data": {
                "project_id": "p", "user_id": "u", "instance_uuid": "vm1", "num_instances": 1,
                "availability_zone": null,
                "flavor": {"data": {"name": "m1.large", "extra_specs": {}, "memory_mb": 4096, "vcpus": 2, "root_gb": 20}},
                "image": null, "ignore_hosts": [], "force_hosts": []
            }},
            "context": {"project_id": "p", "user_id": "u", "request_id": "r1", "global_request_id": null},
        });
        let request = decode_raw_request(DecisionType::NovaServer, &raw).unwrap();
        assert_eq!(request.subjects(), &["host1".to_string()]);
        assert_eq!(nova_instance_uuid(&raw).as_deref(), Some("vm1"));
    }
}
