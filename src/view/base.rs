//! Base View (C3): the root state container — one Resource Store per kind plus the
//! Event Sink, owning the view's version counter (spec.md §4.3).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::common::{Kind, KubeObject};
use crate::core::event_sink::EventSink;
use crate::core::node::Node;
use crate::core::patch::PatchKind;
use crate::core::pod::Pod;
use crate::core::selector::LabelSelector;
use crate::core::store::{MatchCriteria, ResourceStore};
use crate::errors::{StoreError, ViewError};
use crate::view::View;

#[derive(Clone)]
pub struct BaseView {
    pub(crate) nodes: ResourceStore<Node>,
    pub(crate) pods: ResourceStore<Pod>,
    pub(crate) events: EventSink,
    counter: Arc<AtomicI64>,
    change_count: Arc<AtomicI64>,
    watch_queue_size: usize,
}

impl BaseView {
    pub fn new(watch_queue_size: usize) -> Self {
        let counter = Arc::new(AtomicI64::new(0));
        Self {
            nodes: ResourceStore::new(Kind::core("Node"), counter.clone(), watch_queue_size),
            pods: ResourceStore::new(Kind::core("Pod"), counter.clone(), watch_queue_size),
            events: EventSink::new(),
            counter,
            change_count: Arc::new(AtomicI64::new(0)),
            watch_queue_size,
        }
    }

    pub fn watch_queue_size(&self) -> usize {
        self.watch_queue_size
    }

    pub fn counter(&self) -> Arc<AtomicI64> {
        self.counter.clone()
    }

    pub fn node_store(&self) -> &ResourceStore<Node> {
        &self.nodes
    }

    pub fn pod_store(&self) -> &ResourceStore<Pod> {
        &self.pods
    }

    pub fn event_sink(&self) -> &EventSink {
        &self.events
    }

    fn bump_change_count(&self) {
        self.change_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Stamps server defaults and inserts via `Add` (spec.md §4.3 `StoreObject`).
    pub fn store_object<T: KubeObject>(&self, store: &ResourceStore<T>, mut object: T) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        object.meta_mut().apply_server_defaults();
        let stored = store.add(object)?;
        self.bump_change_count();
        Ok(stored)
    }

    pub fn patch_node(&self, name: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Node, StoreError> {
        let result = self.nodes.patch_object(name, kind, patch, status_only);
        if result.is_ok() {
            self.bump_change_count();
        }
        result
    }

    pub fn patch_pod(&self, key: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Pod, StoreError> {
        let result = self.pods.patch_object(key, kind, patch, status_only);
        if result.is_ok() {
            self.bump_change_count();
        }
        result
    }

    pub fn delete_nodes(&self, criteria: &MatchCriteria) -> Result<Vec<Node>, StoreError> {
        self.nodes.delete_objects(criteria)
    }

    pub fn delete_pods(&self, criteria: &MatchCriteria) -> Result<Vec<Pod>, StoreError> {
        self.pods.delete_objects(criteria)
    }

    /// Resets every store and the sink, zeroes the change counter (spec.md §4.3).
    pub fn reset(&self) {
        self.nodes.reset();
        self.pods.reset();
        self.events.reset();
        self.change_count.store(0, Ordering::SeqCst);
    }
}

impl View for BaseView {
    fn get_node(&self, name: &str) -> Result<Node, ViewError> {
        Ok(self.nodes.get(name)?)
    }

    fn list_nodes(&self) -> Result<(Vec<Node>, i64), ViewError> {
        Ok(self.nodes.list(None, &LabelSelector::everything()))
    }

    fn store_node(&self, node: Node) -> Result<Node, ViewError> {
        Ok(self.store_object(&self.nodes, node)?)
    }

    fn update_node(&self, node: Node) -> Result<Node, ViewError> {
        let updated = self.nodes.update(node)?;
        self.bump_change_count();
        Ok(updated)
    }

    fn delete_node(&self, name: &str) -> Result<Node, ViewError> {
        let deleted = self.nodes.delete(name)?;
        self.bump_change_count();
        Ok(deleted)
    }

    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ViewError> {
        let key = if namespace.is_empty() { name.to_string() } else { format!("{namespace}/{name}") };
        Ok(self.pods.get(&key)?)
    }

    fn list_pods(&self, namespace: Option<&str>) -> Result<(Vec<Pod>, i64), ViewError> {
        Ok(self.pods.list(namespace, &LabelSelector::everything()))
    }

    fn store_pod(&self, pod: Pod) -> Result<Pod, ViewError> {
        Ok(self.store_object(&self.pods, pod)?)
    }

    fn update_pod(&self, pod: Pod) -> Result<Pod, ViewError> {
        let updated = self.pods.update(pod)?;
        self.bump_change_count();
        Ok(updated)
    }

    fn delete_pod(&self, namespace: &str, name: &str) -> Result<Pod, ViewError> {
        let key = if namespace.is_empty() { name.to_string() } else { format!("{namespace}/{name}") };
        let deleted = self.pods.delete(&key)?;
        self.bump_change_count();
        Ok(deleted)
    }

    fn patch_node(&self, name: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Node, ViewError> {
        Ok(self.patch_node(name, kind, patch, status_only)?)
    }

    fn delete_nodes(&self, criteria: &MatchCriteria) -> Result<Vec<Node>, ViewError> {
        Ok(self.delete_nodes(criteria)?)
    }

    fn watch_nodes(&self, start_rv: i64, selector: LabelSelector, timeout: Duration) -> crate::view::BoxWatchStream<Node> {
        Box::pin(self.nodes.watch(start_rv, None, selector, timeout))
    }

    fn patch_pod(&self, namespace: &str, name: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Pod, ViewError> {
        let key = if namespace.is_empty() { name.to_string() } else { format!("{namespace}/{name}") };
        Ok(self.patch_pod(&key, kind, patch, status_only)?)
    }

    fn delete_pods(&self, criteria: &MatchCriteria) -> Result<Vec<Pod>, ViewError> {
        Ok(self.delete_pods(criteria)?)
    }

    fn watch_pods(&self, start_rv: i64, namespace: Option<String>, selector: LabelSelector, timeout: Duration) -> crate::view::BoxWatchStream<Pod> {
        Box::pin(self.pods.watch(start_rv, namespace, selector, timeout))
    }

    fn create_event(&self, event: crate::core::event_sink::EventRecord) -> crate::core::event_sink::EventRecord {
        self.events.create(event)
    }

    fn list_events(&self, namespace: Option<&str>) -> Vec<crate::core::event_sink::EventRecord> {
        self.events.list(namespace)
    }

    fn object_change_count(&self) -> i64 {
        self.change_count.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.reset()
    }
}
