use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::records::Secret;
use cortex_common::{CortexError, SecretRef};
use cortex_knowledge::secret::SecretResolver;
use cortex_store::StoreClient;

/// Resolves a `SecretRef` against `Secret` records in the same store
/// every other record lives in (spec §6 "Environment/config" — secrets
/// are resolved through the store, never read from the process
/// environment directly).
pub struct StoreSecretResolver {
    store: Arc<StoreClient>,
}

impl StoreSecretResolver {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SecretResolver for StoreSecretResolver {
    async fn reveal(&self, secret_ref: &SecretRef) -> Result<String, CortexError> {
        let secret = self
            .store
            .get::<Secret>(&secret_ref.name)
            .await?
            .ok_or_else(|| CortexError::NotFound {
                kind: "secrets",
                name: secret_ref.name.clone(),
            })?;
        secret
            .spec
            .data
            .get(&secret_ref.key)
            .cloned()
            .ok_or_else(|| CortexError::Configuration(format!("secret {}/{} not found", secret_ref.name, secret_ref.key)))
    }
}
