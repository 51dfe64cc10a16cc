use std::sync::Arc;

use cortex_common::records::{RecordKind, WithMeta};
use cortex_common::CortexError;
use etcd_client::{Client, DeleteOptions, GetOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::watch::WatchHandle;

const PREFIX: &str = "/registry";

fn key_for(kind: &str, name: &str) -> String {
    format!("{PREFIX}/{kind}/{name}")
}

fn prefix_for(kind: &str) -> String {
    format!("{PREFIX}/{kind}/")
}

fn io_error(context: &str, err: etcd_client::Error) -> CortexError {
    CortexError::TransientIo(anyhow::anyhow!("{context}: {err}"))
}

/// A generic record store over etcd/Xline. Grounded in `XlineStore`
/// (`rks/src/api/xlinestore.rs`), generalized from its per-resource
/// methods (`insert_pod_yaml`, `get_pod_yaml`, `watch_pods`, ...) to one
/// set of operations parameterized over any `RecordKind + WithMeta`.
#[derive(Clone)]
pub struct StoreClient {
    client: Arc<RwLock<Client>>,
}

impl StoreClient {
    pub async fn connect(endpoints: &[String]) -> Result<Self, CortexError> {
        let endpoints: Vec<&str> = endpoints.iter().map(String::as_str).collect();
        let client = Client::connect(&endpoints, None)
            .await
            .map_err(|e| io_error("connecting to store", e))?;
        Ok(Self {
            client: Arc::new(RwLock::new(client)),
        })
    }

    /// Reads one record by name, stamping `resource_version` from the
    /// key's mod-revision (spec §6 "optimistic-concurrency status
    /// writes").
    pub async fn get<T>(&self, name: &str) -> Result<Option<T>, CortexError>
    where
        T: RecordKind + WithMeta + DeserializeOwned,
    {
        let key = key_for(T::KIND, name);
        let mut client = self.client.write().await;
        let resp = client
            .get(key, None)
            .await
            .map_err(|e| io_error(&format!("get {} {name}", T::KIND), e))?;
        let Some(kv) = resp.kvs().first() else {
            return Ok(None);
        };
        let mut record: T = serde_yaml::from_str(&String::from_utf8_lossy(kv.value()))
            .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("decoding {} {name}: {e}", T::KIND)))?;
        record.meta_mut().resource_version = kv.mod_revision();
        Ok(Some(record))
    }

    /// Lists every record of one kind, each stamped with its own
    /// mod-revision.
    pub async fn list<T>(&self) -> Result<Vec<T>, CortexError>
    where
        T: RecordKind + WithMeta + DeserializeOwned,
    {
        let prefix = prefix_for(T::KIND);
        let mut client = self.client.write().await;
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| io_error(&format!("list {}", T::KIND), e))?;
        let mut out = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let mut record: T = serde_yaml::from_str(&String::from_utf8_lossy(kv.value()))
                .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("decoding {} entry: {e}", T::KIND)))?;
            record.meta_mut().resource_version = kv.mod_revision();
            out.push(record);
        }
        Ok(out)
    }

    /// Writes a record under its own name (spec §6 "insert or replace").
    /// Bumps `generation` only when the caller has already bumped it;
    /// the store itself never infers spec changes.
    pub async fn put<T>(&self, record: &T) -> Result<(), CortexError>
    where
        T: RecordKind + WithMeta + Serialize,
    {
        let key = key_for(T::KIND, &record.meta().name);
        let yaml = serde_yaml::to_string(record)
            .map_err(|e| CortexError::Configuration(format!("encoding {} {}: {e}", T::KIND, record.meta().name)))?;
        let mut client = self.client.write().await;
        client
            .put(key, yaml, None)
            .await
            .map_err(|e| io_error(&format!("put {} {}", T::KIND, record.meta().name), e))?;
        Ok(())
    }

    pub async fn delete<T>(&self, name: &str) -> Result<(), CortexError>
    where
        T: RecordKind,
    {
        let key = key_for(T::KIND, name);
        let mut client = self.client.write().await;
        client
            .delete(key, None)
            .await
            .map_err(|e| io_error(&format!("delete {} {name}", T::KIND), e))?;
        Ok(())
    }

    /// A prefix snapshot plus the revision it was taken at, the starting
    /// point for a subsequent `watch` (spec §6 "watch stream"; grounded
    /// in `pods_snapshot_with_rev`).
    pub async fn snapshot_with_rev<T>(&self) -> Result<(Vec<T>, i64), CortexError>
    where
        T: RecordKind + WithMeta + DeserializeOwned,
    {
        let prefix = prefix_for(T::KIND);
        let mut client = self.client.write().await;
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| io_error(&format!("snapshot {}", T::KIND), e))?;
        let rev = resp.header().map(|h| h.revision()).unwrap_or(0);
        let mut out = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let mut record: T = serde_yaml::from_str(&String::from_utf8_lossy(kv.value()))
                .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("decoding {} entry: {e}", T::KIND)))?;
            record.meta_mut().resource_version = kv.mod_revision();
            out.push(record);
        }
        Ok((out, rev))
    }

    /// Opens a prefix watch over one record kind starting at
    /// `start_revision` (grounded in `watch_pods`). Use the revision
    /// returned by `snapshot_with_rev` plus one so no event between the
    /// snapshot and the watch's start is missed.
    pub async fn watch<T>(&self, start_revision: i64) -> Result<WatchHandle<T>, CortexError>
    where
        T: RecordKind,
    {
        let prefix = prefix_for(T::KIND);
        let opts = etcd_client::WatchOptions::new()
            .with_prefix()
            .with_prev_key()
            .with_start_revision(start_revision);
        let mut client = self.client.write().await;
        let (watcher, stream) = client
            .watch(prefix, Some(opts))
            .await
            .map_err(|e| io_error(&format!("watch {}", T::KIND), e))?;
        Ok(WatchHandle::new(watcher, stream))
    }

    /// Deletes every key under a kind's prefix; used by tests and the
    /// daemon's `--reset-store` escape hatch, never by a controller.
    pub async fn delete_all(&self, kind: &str) -> Result<(), CortexError> {
        let prefix = prefix_for(kind);
        let mut client = self.client.write().await;
        client
            .delete(prefix, Some(DeleteOptions::new().with_prefix()))
            .await
            .map_err(|e| io_error(&format!("delete_all {kind}"), e))?;
        Ok(())
    }
}
