//! Resource Store (C1): a typed, versioned in-memory store for one Kind, with
//! broadcast-based watches (spec.md §4.1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::core::common::{Kind, KubeObject, ResourceVersion};
use crate::core::patch::{apply, reject_immutable_field_changes, PatchKind};
use crate::core::selector::LabelSelector;
use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Serialize)]
pub struct WatchEvent<T> {
    pub kind: WatchEventKind,
    pub object: T,
}

impl<T: Clone> Clone for WatchEvent<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            object: self.object.clone(),
        }
    }
}

/// `{namespace?, names?, labelSelector}` for `DeleteObjects` (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct MatchCriteria {
    pub namespace: Option<String>,
    pub names: Option<Vec<String>>,
    pub label_selector: LabelSelector,
}

struct StoreIndex<T> {
    items: HashMap<String, T>,
}

/// Shared, cloneable handle to one Kind's store. Cloning shares state (`Arc`
/// internals) — this is the handle passed around the base/sandbox views and the API
/// surface, not a deep copy.
pub struct ResourceStore<T> {
    kind: Kind,
    index: Arc<RwLock<StoreIndex<T>>>,
    counter: Arc<AtomicI64>,
    broadcaster: Arc<Mutex<broadcast::Sender<Arc<WatchEvent<T>>>>>,
    queue_size: usize,
}

impl<T> Clone for ResourceStore<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            index: self.index.clone(),
            counter: self.counter.clone(),
            broadcaster: self.broadcaster.clone(),
            queue_size: self.queue_size,
        }
    }
}

impl<T> ResourceStore<T>
where
    T: KubeObject + Clone + Send + Sync + 'static,
{
    /// `counter` is shared across every store *of the same view* (spec.md §3) — a
    /// sandbox store is constructed with its delegate's counter, never its own.
    pub fn new(kind: Kind, counter: Arc<AtomicI64>, queue_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(queue_size.max(1));
        Self {
            kind,
            index: Arc::new(RwLock::new(StoreIndex { items: HashMap::new() })),
            counter,
            broadcaster: Arc::new(Mutex::new(tx)),
            queue_size,
        }
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_rv(&self) -> ResourceVersion {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn broadcast(&self, event: WatchEvent<T>) {
        // A send error only means there are currently no subscribers; that's fine.
        let _ = self.broadcaster.lock().unwrap().send(Arc::new(event));
    }

    pub fn add(&self, mut object: T) -> Result<T, StoreError> {
        if object.name().is_empty() {
            return Err(StoreError::BadRequest("object has empty name and empty generateName".to_string()));
        }
        let key = object.key();
        let mut index = self.index.write().unwrap();
        if index.items.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                namespace: object.namespace().to_string(),
                name: object.name().to_string(),
            });
        }
        object.set_resource_version(self.next_rv());
        index.items.insert(key, object.clone());
        drop(index);
        self.broadcast(WatchEvent {
            kind: WatchEventKind::Added,
            object: object.clone(),
        });
        Ok(object)
    }

    pub fn update(&self, mut object: T) -> Result<T, StoreError> {
        let key = object.key();
        let mut index = self.index.write().unwrap();
        if !index.items.contains_key(&key) {
            return Err(StoreError::NotFound {
                namespace: object.namespace().to_string(),
                name: object.name().to_string(),
            });
        }
        object.set_resource_version(self.next_rv());
        index.items.insert(key, object.clone());
        drop(index);
        self.broadcast(WatchEvent {
            kind: WatchEventKind::Modified,
            object: object.clone(),
        });
        Ok(object)
    }

    pub fn get(&self, key: &str) -> Result<T, StoreError> {
        self.index
            .read()
            .unwrap()
            .items
            .get(key)
            .cloned()
            .ok_or_else(|| key_not_found(key))
    }

    pub fn delete(&self, key: &str) -> Result<T, StoreError> {
        let mut index = self.index.write().unwrap();
        let mut removed = index.items.remove(key).ok_or_else(|| key_not_found(key))?;
        drop(index);
        removed.set_resource_version(self.next_rv());
        removed.meta_mut().deletion_timestamp = Some(chrono::Utc::now());
        self.broadcast(WatchEvent {
            kind: WatchEventKind::Deleted,
            object: removed.clone(),
        });
        Ok(removed)
    }

    /// Returns a snapshot slice plus the current counter value at snapshot time
    /// (spec.md §4.1).
    pub fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> (Vec<T>, ResourceVersion) {
        let index = self.index.read().unwrap();
        let items: Vec<T> = index
            .items
            .values()
            .filter(|o| namespace.map(|ns| ns.is_empty() || o.namespace() == ns).unwrap_or(true))
            .filter(|o| selector.matches(o.labels()))
            .cloned()
            .collect();
        (items, self.counter.load(Ordering::SeqCst))
    }

    pub fn delete_objects(&self, criteria: &MatchCriteria) -> Result<Vec<T>, StoreError> {
        let (candidates, _) = self.list(criteria.namespace.as_deref(), &criteria.label_selector);
        let mut deleted = Vec::new();
        for obj in candidates {
            if let Some(names) = &criteria.names {
                if !names.contains(&obj.name().to_string()) {
                    continue;
                }
            }
            match self.delete(&obj.key()) {
                Ok(removed) => deleted.push(removed),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    /// Empties the store and installs a fresh broadcaster; existing watchers observe
    /// end-of-stream (spec.md §4.1).
    pub fn reset(&self) {
        self.index.write().unwrap().items.clear();
        let (tx, _rx) = broadcast::channel(self.queue_size.max(1));
        *self.broadcaster.lock().unwrap() = tx;
    }

    /// Subscribes to future events. Combined with a replay snapshot in
    /// [`ResourceStore::watch`], this implements the two-phase watch contract.
    fn subscribe(&self) -> broadcast::Receiver<Arc<WatchEvent<T>>> {
        self.broadcaster.lock().unwrap().subscribe()
    }

    /// Watch: replay items with `RV > start_rv` as synthetic `Added` events, then
    /// stream live broadcast events with `RV > start_rv` matching the filters
    /// (spec.md §4.1). A lagging subscriber yields one `StoreError::WatchExpired`.
    /// The live stream is raced against `timeout`: once it elapses with no more
    /// events, the stream ends (spec.md §4.1 step 3 "watch-timeout elapsed").
    pub fn watch(
        &self,
        start_rv: ResourceVersion,
        namespace: Option<String>,
        selector: LabelSelector,
        timeout: Duration,
    ) -> impl Stream<Item = Result<WatchEvent<T>, StoreError>> + Send + 'static
    where
        T: Unpin,
    {
        let (replay, _) = self.list(namespace.as_deref(), &selector);
        let replay: Vec<T> = replay.into_iter().filter(|o| o.resource_version() > start_rv).collect();
        let receiver = self.subscribe();
        let broadcast_stream = BroadcastStream::new(receiver);
        let deadline = tokio::time::Instant::now() + timeout;

        let live = futures::stream::unfold((broadcast_stream, namespace, selector), move |(mut stream, namespace, selector)| async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => return None,
                    item = stream.next() => match item {
                        None => return None,
                        Some(Ok(event)) => {
                            let matches = event.object.resource_version() > start_rv
                                && namespace.as_deref().map(|ns| ns.is_empty() || event.object.namespace() == ns).unwrap_or(true)
                                && selector.matches(event.object.labels());
                            if matches {
                                return Some((Ok((*event).clone()), (stream, namespace, selector)));
                            }
                        }
                        Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                            return Some((Err(StoreError::WatchExpired(format!("subscriber lagged behind by {} events", n))), (stream, namespace, selector)));
                        }
                    },
                }
            }
        });
        let replay_events = replay.into_iter().map(|o| Ok(WatchEvent { kind: WatchEventKind::Added, object: o }));
        futures::stream::iter(replay_events).chain(live)
    }
}

impl<T> ResourceStore<T>
where
    T: KubeObject + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Applies a patch to the object at `key` and stores the result (spec.md §4.1).
    /// `status_only` routes through the status-subresource path: only the `status`
    /// key of the patch is applied, and only strategic-merge is accepted there.
    pub fn patch_object(&self, key: &str, kind: PatchKind, patch_body: &serde_json::Value, status_only: bool) -> Result<T, StoreError> {
        if status_only && kind != PatchKind::StrategicMerge {
            return Err(StoreError::BadRequest("status subresource only accepts strategic-merge-patch".to_string()));
        }
        let current = self.get(key)?;
        let current_json = serde_json::to_value(&current).map_err(|e| StoreError::Internal(e.to_string()))?;
        let effective_patch = if status_only {
            crate::core::patch::extract_status_only_patch(patch_body)
                .map_err(|e| StoreError::BadRequest(e.to_string()))?
        } else {
            patch_body.clone()
        };
        let merged = apply(kind, &current_json, &effective_patch);
        reject_immutable_field_changes(&current_json, &merged).map_err(|e| StoreError::Invalid(e.to_string()))?;
        let updated: T = serde_json::from_value(merged).map_err(|e| StoreError::Invalid(e.to_string()))?;
        self.update(updated)
    }
}

fn key_not_found(key: &str) -> StoreError {
    let (namespace, name) = match key.split_once('/') {
        Some((ns, n)) => (ns.to_string(), n.to_string()),
        None => (String::new(), key.to_string()),
    };
    StoreError::NotFound { namespace, name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::Node;
    use futures::StreamExt;

    fn new_store() -> ResourceStore<Node> {
        ResourceStore::new(Kind::core("Node"), Arc::new(AtomicI64::new(0)), 16)
    }

    #[test]
    fn add_assigns_monotonic_resource_versions() {
        let store = new_store();
        let n1 = store.add(Node::new("n1", Default::default())).unwrap();
        let n2 = store.add(Node::new("n2", Default::default())).unwrap();
        assert!(n2.metadata.resource_version > n1.metadata.resource_version);
    }

    #[test]
    fn add_duplicate_fails_already_exists() {
        let store = new_store();
        store.add(Node::new("n1", Default::default())).unwrap();
        let err = store.add(Node::new("n1", Default::default())).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn add_with_empty_name_fails_bad_request() {
        let store = new_store();
        let err = store.add(Node::new("", Default::default())).unwrap_err();
        assert!(matches!(err, StoreError::BadRequest(_)));
    }

    #[test]
    fn update_missing_fails_not_found() {
        let store = new_store();
        let err = store.update(Node::new("missing", Default::default())).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn delete_removes_from_index_but_broadcasts_tombstone() {
        let store = new_store();
        store.add(Node::new("n1", Default::default())).unwrap();
        let removed = store.delete("n1").unwrap();
        assert!(removed.metadata.deletion_timestamp.is_some());
        assert!(store.get("n1").is_err());
    }

    #[test]
    fn reset_clears_items() {
        let store = new_store();
        store.add(Node::new("n1", Default::default())).unwrap();
        store.reset();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn watch_replays_then_streams_live_events() {
        let store = new_store();
        for i in 0..5 {
            store.add(Node::new(format!("n{i}"), Default::default())).unwrap();
        }
        let mut stream = Box::pin(store.watch(0, None, LabelSelector::everything(), Duration::from_secs(5)));
        for _ in 0..5 {
            let ev = stream.next().await.unwrap().unwrap();
            assert_eq!(ev.kind, WatchEventKind::Added);
        }
        store.add(Node::new("n5", Default::default())).unwrap();
        let ev = stream.next().await.unwrap().unwrap();
        assert_eq!(ev.object.metadata.name, "n5");
    }
}
