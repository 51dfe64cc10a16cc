use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// A small bag of named string values (DB DSNs, Keystone credentials,
/// MQTT broker auth), addressed by a `SecretRef { name, key }` from other
/// records (spec §6 "Environment/config" — secrets are resolved through
/// the store, never read from the process environment directly).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretSpec {
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub meta: ObjectMeta,
    pub spec: SecretSpec,
}
