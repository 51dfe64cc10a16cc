use async_trait::async_trait;
use cortex_common::{CortexError, SecretRef};

/// Looks up the live string value a `SecretRef` points to (DB DSN,
/// Keystone credentials, MQTT broker auth). Implemented against whatever
/// concrete record store backs the process; the core never reads
/// secrets from the process environment directly (spec §6
/// "Environment/config").
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn reveal(&self, secret_ref: &SecretRef) -> Result<String, CortexError>;
}

/// An in-memory resolver, useful for tests and for the "reservations"
/// synthetic pipeline name that never touches real secrets.
pub struct StaticSecretResolver {
    values: std::collections::HashMap<(String, String), String>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self {
            values: std::collections::HashMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert((name.into(), key.into()), value.into());
        self
    }
}

impl Default for StaticSecretResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn reveal(&self, secret_ref: &SecretRef) -> Result<String, CortexError> {
        self.values
            .get(&(secret_ref.name.clone(), secret_ref.key.clone()))
            .cloned()
            .ok_or_else(|| CortexError::Configuration(format!("secret {}/{} not found", secret_ref.name, secret_ref.key)))
    }
}
