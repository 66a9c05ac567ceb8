use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::{LiveQueryError, LiveQueryService, Query, ResultSet, ResultStream};

const WATCH_BUFFER: usize = 16;
const CHANGE_BUFFER: usize = 256;
const ID_FIELD: &str = "_id";

#[derive(Debug, Clone)]
enum Change {
    Mutated(String),
    Failed { collection: String, reason: String },
}

struct Inner {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    changes: broadcast::Sender<Change>,
    active_watchers: AtomicUsize,
}

impl Inner {
    async fn evaluate(&self, collection: &str, query: &Query) -> ResultSet {
        let guard = self.collections.read().await;
        let data = guard
            .get(collection)
            .map(|documents| query.apply(documents.iter()))
            .unwrap_or_default();
        ResultSet::new(data)
    }
}

/// Process-local document store whose watchers re-run their query on every
/// mutation of the watched collection.
#[derive(Clone)]
pub struct InMemoryLiveQuery {
    inner: Arc<Inner>,
}

impl Default for InMemoryLiveQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLiveQuery {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                changes,
                active_watchers: AtomicUsize::new(0),
            }),
        }
    }

    /// Inserts `document`, replacing any document with the same `_id`.
    pub async fn upsert(&self, collection: &str, document: Value) {
        {
            let mut guard = self.inner.collections.write().await;
            let documents = guard.entry(collection.to_string()).or_default();
            let id = document.get(ID_FIELD).cloned();
            match id.and_then(|id| documents.iter().position(|d| d.get(ID_FIELD) == Some(&id))) {
                Some(index) => documents[index] = document,
                None => documents.push(document),
            }
        }
        self.notify(collection);
    }

    pub async fn upsert_many<I>(&self, collection: &str, documents: I)
    where
        I: IntoIterator<Item = Value>,
    {
        {
            let mut guard = self.inner.collections.write().await;
            let stored = guard.entry(collection.to_string()).or_default();
            for document in documents {
                let id = document.get(ID_FIELD).cloned();
                match id.and_then(|id| stored.iter().position(|d| d.get(ID_FIELD) == Some(&id))) {
                    Some(index) => stored[index] = document,
                    None => stored.push(document),
                }
            }
        }
        self.notify(collection);
    }

    /// Merges the fields of `fields` into the document with `_id == id`.
    pub async fn patch(&self, collection: &str, id: &str, fields: Value) -> bool {
        let patched = {
            let mut guard = self.inner.collections.write().await;
            let target = guard.get_mut(collection).and_then(|documents| {
                documents
                    .iter_mut()
                    .find(|d| d.get(ID_FIELD).and_then(Value::as_str) == Some(id))
            });
            match (target, fields) {
                (Some(Value::Object(existing)), Value::Object(update)) => {
                    existing.extend(update);
                    true
                }
                _ => false,
            }
        };
        if patched {
            self.notify(collection);
        }
        patched
    }

    pub async fn remove(&self, collection: &str, id: &str) -> bool {
        let removed = {
            let mut guard = self.inner.collections.write().await;
            guard.get_mut(collection).is_some_and(|documents| {
                let before = documents.len();
                documents.retain(|d| d.get(ID_FIELD).and_then(Value::as_str) != Some(id));
                documents.len() != before
            })
        };
        if removed {
            self.notify(collection);
        }
        removed
    }

    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Terminates every watcher of `collection` with an error.
    pub fn fail_watchers(&self, collection: &str, reason: impl Into<String>) {
        let _ = self.inner.changes.send(Change::Failed {
            collection: collection.to_string(),
            reason: reason.into(),
        });
    }

    pub fn active_watchers(&self) -> usize {
        self.inner.active_watchers.load(Ordering::SeqCst)
    }

    fn notify(&self, collection: &str) {
        let _ = self
            .inner
            .changes
            .send(Change::Mutated(collection.to_string()));
    }
}

struct WatcherGuard(Arc<Inner>);

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.0.active_watchers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LiveQueryService for InMemoryLiveQuery {
    async fn watch(&self, collection: &str, query: Query) -> Result<ResultStream, LiveQueryError> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        // Subscribe before the first evaluation so no mutation falls in between.
        let mut changes = self.inner.changes.subscribe();
        let initial = self.inner.evaluate(collection, &query).await;
        tx.send(Ok(initial))
            .await
            .map_err(|_| LiveQueryError::Failed {
                collection: collection.to_string(),
                reason: "watcher dropped before first result".into(),
            })?;

        self.inner.active_watchers.fetch_add(1, Ordering::SeqCst);
        let guard = WatcherGuard(Arc::clone(&self.inner));
        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    change = changes.recv() => {
                        let refresh = match change {
                            Ok(Change::Mutated(name)) => name == collection,
                            Ok(Change::Failed { collection: name, reason }) => {
                                if name == collection {
                                    let _ = tx
                                        .send(Err(LiveQueryError::Failed {
                                            collection: collection.clone(),
                                            reason,
                                        }))
                                        .await;
                                    break;
                                }
                                false
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!(collection = %collection, skipped, "live query: watcher lagged, re-evaluating");
                                true
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        if refresh {
                            let result = inner.evaluate(&collection, &query).await;
                            if tx.send(Ok(result)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            debug!(collection = %collection, "live query: watcher stopped");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}
