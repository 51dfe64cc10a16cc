use std::marker::PhantomData;

use cortex_common::CortexError;
use etcd_client::{EventType, Watcher, WatchStream};
use futures::StreamExt;
use serde::de::DeserializeOwned;

/// One change observed on a record-kind prefix watch (spec §6 "watch
/// stream"), generalized the same way `watch_pods` dispatches on
/// `event.event_type()` for a single resource.
#[derive(Debug)]
pub enum RecordEvent<T> {
    Put(T),
    Delete { name: String },
}

fn key_name(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

/// A live prefix watch over one record kind. Holds the `Watcher` handle
/// alongside the stream so callers can `cancel` it on shutdown, matching
/// `XlineStore::watch_pods`'s `(Watcher, WatchStream)` pair.
pub struct WatchHandle<T> {
    watcher: Watcher,
    stream: WatchStream,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> WatchHandle<T> {
    pub(crate) fn new(watcher: Watcher, stream: WatchStream) -> Self {
        Self {
            watcher,
            stream,
            _marker: PhantomData,
        }
    }

    /// Pulls the next batch of decoded events, or `None` once the
    /// underlying stream has ended.
    pub async fn next(&mut self) -> Option<Result<Vec<RecordEvent<T>>, CortexError>> {
        let resp = match self.stream.next().await? {
            Ok(resp) => resp,
            Err(e) => return Some(Err(CortexError::TransientIo(anyhow::anyhow!("watch stream error: {e}")))),
        };

        let mut events = Vec::with_capacity(resp.events().len());
        for event in resp.events() {
            match event.event_type() {
                EventType::Put => {
                    let Some(kv) = event.kv() else { continue };
                    match serde_yaml::from_str::<T>(&String::from_utf8_lossy(kv.value())) {
                        Ok(record) => events.push(RecordEvent::Put(record)),
                        Err(e) => return Some(Err(CortexError::TransientIo(anyhow::anyhow!("decoding watch event: {e}")))),
                    }
                }
                EventType::Delete => {
                    let Some(kv) = event.prev_kv().or_else(|| event.kv()) else { continue };
                    events.push(RecordEvent::Delete {
                        name: key_name(&String::from_utf8_lossy(kv.key())),
                    });
                }
            }
        }
        Some(Ok(events))
    }

    pub async fn cancel(&mut self) -> Result<(), CortexError> {
        self.watcher
            .cancel()
            .await
            .map_err(|e| CortexError::TransientIo(anyhow::anyhow!("cancel watch: {e}")))
    }
}
