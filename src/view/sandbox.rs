//! Sandbox View (C4): a copy-on-write overlay over a delegate view, used by the
//! simulation engine (C7) to try scheduling decisions without mutating shared state
//! (spec.md §4.4).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::core::common::{Kind, KubeObject};
use crate::core::event_sink::EventSink;
use crate::core::node::Node;
use crate::core::patch::PatchKind;
use crate::core::pod::Pod;
use crate::core::selector::LabelSelector;
use crate::core::store::{MatchCriteria, ResourceStore};
use crate::errors::ViewError;
use crate::view::{BoxWatchStream, View};

/// Local overlay plus a delegate to fall back to. Reads check the overlay first,
/// then the delegate with delegate-only tombstones masked out; writes never touch
/// the delegate (spec.md §4.4 "writes are strictly local").
pub struct SandboxView {
    delegate: Arc<dyn View>,
    local_nodes: ResourceStore<Node>,
    local_pods: ResourceStore<Pod>,
    local_events: EventSink,
    tombstoned_nodes: RwLock<HashSet<String>>,
    tombstoned_pods: RwLock<HashSet<String>>,
}

impl SandboxView {
    /// `counter` must be the delegate's counter (or, transitively, the root Base
    /// View's) — a sandbox never mints resource versions of its own (spec.md §4.4).
    pub fn new(delegate: Arc<dyn View>, counter: Arc<std::sync::atomic::AtomicI64>, watch_queue_size: usize) -> Self {
        Self {
            delegate,
            local_nodes: ResourceStore::new(Kind::core("Node"), counter.clone(), watch_queue_size),
            local_pods: ResourceStore::new(Kind::core("Pod"), counter, watch_queue_size),
            local_events: EventSink::new(),
            tombstoned_nodes: RwLock::new(HashSet::new()),
            tombstoned_pods: RwLock::new(HashSet::new()),
        }
    }

    pub fn delegate(&self) -> &Arc<dyn View> {
        &self.delegate
    }

    /// `update` semantics for a delegate-only object: clone it into the local
    /// overlay first, then apply (spec.md §4.4 "the sandbox first clones the object
    /// and then updates the clone").
    fn clone_node_from_delegate(&self, name: &str) -> Result<(), ViewError> {
        if self.local_nodes.get(name).is_ok() || self.tombstoned_nodes.read().unwrap().contains(name) {
            return Ok(());
        }
        let upstream = self.delegate.get_node(name)?;
        self.local_nodes.add(upstream)?;
        Ok(())
    }

    fn clone_pod_from_delegate(&self, namespace: &str, name: &str) -> Result<(), ViewError> {
        let key = pod_key(namespace, name);
        if self.local_pods.get(&key).is_ok() || self.tombstoned_pods.read().unwrap().contains(&key) {
            return Ok(());
        }
        let upstream = self.delegate.get_pod(namespace, name)?;
        self.local_pods.add(upstream)?;
        Ok(())
    }
}

impl View for SandboxView {
    fn get_node(&self, name: &str) -> Result<Node, ViewError> {
        if self.tombstoned_nodes.read().unwrap().contains(name) {
            return Err(ViewError::Store(crate::errors::StoreError::NotFound {
                namespace: String::new(),
                name: name.to_string(),
            }));
        }
        if let Ok(local) = self.local_nodes.get(name) {
            return Ok(local);
        }
        self.delegate.get_node(name)
    }

    fn list_nodes(&self) -> Result<(Vec<Node>, i64), ViewError> {
        let (local, local_rv) = self.local_nodes.list(None, &LabelSelector::everything());
        let (delegate, delegate_rv) = self.delegate.list_nodes()?;
        let tombstoned = self.tombstoned_nodes.read().unwrap();
        let mut merged = local;
        let local_keys: HashSet<String> = merged.iter().map(|n| n.key()).collect();
        for node in delegate {
            if tombstoned.contains(&node.key()) || local_keys.contains(&node.key()) {
                continue;
            }
            merged.push(node);
        }
        Ok((merged, local_rv.max(delegate_rv)))
    }

    fn store_node(&self, node: Node) -> Result<Node, ViewError> {
        let mut node = node;
        node.meta_mut().apply_server_defaults();
        self.tombstoned_nodes.write().unwrap().remove(&node.key());
        Ok(self.local_nodes.add(node)?)
    }

    fn update_node(&self, node: Node) -> Result<Node, ViewError> {
        let key = node.key();
        if self.local_nodes.get(&key).is_ok() {
            return Ok(self.local_nodes.update(node)?);
        }
        if !self.tombstoned_nodes.read().unwrap().contains(&key) && self.delegate.get_node(&key).is_ok() {
            return Ok(self.local_nodes.add(node)?);
        }
        Err(ViewError::Store(crate::errors::StoreError::NotFound {
            namespace: String::new(),
            name: key,
        }))
    }

    fn delete_node(&self, name: &str) -> Result<Node, ViewError> {
        if let Ok(removed) = self.local_nodes.delete(name) {
            return Ok(removed);
        }
        let upstream = self.delegate.get_node(name)?;
        self.tombstoned_nodes.write().unwrap().insert(name.to_string());
        Ok(upstream)
    }

    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ViewError> {
        let key = pod_key(namespace, name);
        if self.tombstoned_pods.read().unwrap().contains(&key) {
            return Err(ViewError::Store(crate::errors::StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }));
        }
        if let Ok(local) = self.local_pods.get(&key) {
            return Ok(local);
        }
        self.delegate.get_pod(namespace, name)
    }

    fn list_pods(&self, namespace: Option<&str>) -> Result<(Vec<Pod>, i64), ViewError> {
        let (local, local_rv) = self.local_pods.list(namespace, &LabelSelector::everything());
        let (delegate, delegate_rv) = self.delegate.list_pods(namespace)?;
        let tombstoned = self.tombstoned_pods.read().unwrap();
        let mut merged = local;
        let local_keys: HashSet<String> = merged.iter().map(|p| p.key()).collect();
        for pod in delegate {
            if tombstoned.contains(&pod.key()) || local_keys.contains(&pod.key()) {
                continue;
            }
            merged.push(pod);
        }
        Ok((merged, local_rv.max(delegate_rv)))
    }

    fn store_pod(&self, pod: Pod) -> Result<Pod, ViewError> {
        let mut pod = pod;
        pod.meta_mut().apply_server_defaults();
        self.tombstoned_pods.write().unwrap().remove(&pod.key());
        Ok(self.local_pods.add(pod)?)
    }

    fn update_pod(&self, pod: Pod) -> Result<Pod, ViewError> {
        let key = pod.key();
        if self.local_pods.get(&key).is_ok() {
            return Ok(self.local_pods.update(pod)?);
        }
        let (namespace, name) = split_key(&key);
        if !self.tombstoned_pods.read().unwrap().contains(&key) && self.delegate.get_pod(&namespace, &name).is_ok() {
            return Ok(self.local_pods.add(pod)?);
        }
        Err(ViewError::Store(crate::errors::StoreError::NotFound { namespace, name }))
    }

    fn delete_pod(&self, namespace: &str, name: &str) -> Result<Pod, ViewError> {
        let key = pod_key(namespace, name);
        if let Ok(removed) = self.local_pods.delete(&key) {
            return Ok(removed);
        }
        let upstream = self.delegate.get_pod(namespace, name)?;
        self.tombstoned_pods.write().unwrap().insert(key);
        Ok(upstream)
    }

    fn patch_node(&self, name: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Node, ViewError> {
        self.clone_node_from_delegate(name)?;
        Ok(self.local_nodes.patch_object(name, kind, patch, status_only)?)
    }

    fn delete_nodes(&self, criteria: &MatchCriteria) -> Result<Vec<Node>, ViewError> {
        let mut deleted = self.local_nodes.delete_objects(criteria)?;
        let (delegate_matches, _) = self.delegate.list_nodes()?;
        for node in delegate_matches {
            if !criteria.label_selector.matches(node.labels()) {
                continue;
            }
            if let Some(names) = &criteria.names {
                if !names.contains(&node.name().to_string()) {
                    continue;
                }
            }
            if self.tombstoned_nodes.read().unwrap().contains(&node.key()) {
                continue;
            }
            self.tombstoned_nodes.write().unwrap().insert(node.key());
            deleted.push(node);
        }
        Ok(deleted)
    }

    fn watch_nodes(&self, start_rv: i64, selector: LabelSelector, timeout: Duration) -> BoxWatchStream<Node> {
        let local: BoxWatchStream<Node> = Box::pin(self.local_nodes.watch(start_rv, None, selector.clone(), timeout));
        let delegate = self.delegate.watch_nodes(start_rv, selector, timeout);
        Box::pin(futures::stream::select(local, delegate))
    }

    fn patch_pod(&self, namespace: &str, name: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Pod, ViewError> {
        self.clone_pod_from_delegate(namespace, name)?;
        let key = pod_key(namespace, name);
        Ok(self.local_pods.patch_object(&key, kind, patch, status_only)?)
    }

    fn delete_pods(&self, criteria: &MatchCriteria) -> Result<Vec<Pod>, ViewError> {
        let mut deleted = self.local_pods.delete_objects(criteria)?;
        let (delegate_matches, _) = self.delegate.list_pods(criteria.namespace.as_deref())?;
        for pod in delegate_matches {
            if !criteria.label_selector.matches(pod.labels()) {
                continue;
            }
            if let Some(names) = &criteria.names {
                if !names.contains(&pod.name().to_string()) {
                    continue;
                }
            }
            if self.tombstoned_pods.read().unwrap().contains(&pod.key()) {
                continue;
            }
            self.tombstoned_pods.write().unwrap().insert(pod.key());
            deleted.push(pod);
        }
        Ok(deleted)
    }

    fn watch_pods(&self, start_rv: i64, namespace: Option<String>, selector: LabelSelector, timeout: Duration) -> BoxWatchStream<Pod> {
        let local: BoxWatchStream<Pod> = Box::pin(self.local_pods.watch(start_rv, namespace.clone(), selector.clone(), timeout));
        let delegate = self.delegate.watch_pods(start_rv, namespace, selector, timeout);
        Box::pin(futures::stream::select(local, delegate))
    }

    fn create_event(&self, event: crate::core::event_sink::EventRecord) -> crate::core::event_sink::EventRecord {
        self.local_events.create(event)
    }

    fn list_events(&self, namespace: Option<&str>) -> Vec<crate::core::event_sink::EventRecord> {
        self.local_events.list(namespace)
    }

    fn object_change_count(&self) -> i64 {
        self.local_nodes.len() as i64 + self.local_pods.len() as i64 + self.delegate.object_change_count()
    }

    fn reset(&self) {
        self.local_nodes.reset();
        self.local_pods.reset();
        self.local_events.reset();
        self.tombstoned_nodes.write().unwrap().clear();
        self.tombstoned_pods.write().unwrap().clear();
    }
}

fn pod_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

fn split_key(key: &str) -> (String, String) {
    match key.split_once('/') {
        Some((ns, n)) => (ns.to_string(), n.to_string()),
        None => (String::new(), key.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Resources;
    use crate::view::base::BaseView;

    fn sandbox_over(base: &Arc<BaseView>) -> SandboxView {
        SandboxView::new(base.clone(), base.counter(), 16)
    }

    #[test]
    fn read_through_sees_delegate_objects() {
        let base = Arc::new(BaseView::new(16));
        base.store_node(Node::new("n1", Resources::default())).unwrap();
        let sandbox = sandbox_over(&base);
        assert!(sandbox.get_node("n1").is_ok());
    }

    #[test]
    fn write_never_reaches_delegate() {
        let base = Arc::new(BaseView::new(16));
        let sandbox = sandbox_over(&base);
        sandbox.store_node(Node::new("n1", Resources::default())).unwrap();
        assert!(base.get_node("n1").is_err());
        assert!(sandbox.get_node("n1").is_ok());
    }

    #[test]
    fn delete_of_delegate_object_tombstones_without_mutating_delegate() {
        let base = Arc::new(BaseView::new(16));
        base.store_node(Node::new("n1", Resources::default())).unwrap();
        let sandbox = sandbox_over(&base);
        sandbox.delete_node("n1").unwrap();
        assert!(sandbox.get_node("n1").is_err());
        assert!(base.get_node("n1").is_ok());
    }

    #[test]
    fn update_of_delegate_only_object_clones_into_local_overlay() {
        let base = Arc::new(BaseView::new(16));
        let node = base.store_node(Node::new("n1", Resources::default())).unwrap();
        let sandbox = sandbox_over(&base);
        let mut updated = node;
        updated.spec.unschedulable = true;
        sandbox.update_node(updated).unwrap();
        assert!(!base.get_node("n1").unwrap().spec.unschedulable);
        assert!(sandbox.get_node("n1").unwrap().spec.unschedulable);
    }

    #[test]
    fn list_merges_local_and_delegate_masking_tombstones() {
        let base = Arc::new(BaseView::new(16));
        base.store_node(Node::new("n1", Resources::default())).unwrap();
        base.store_node(Node::new("n2", Resources::default())).unwrap();
        let sandbox = sandbox_over(&base);
        sandbox.delete_node("n1").unwrap();
        sandbox.store_node(Node::new("n3", Resources::default())).unwrap();
        let (listed, _) = sandbox.list_nodes().unwrap();
        let mut names: Vec<_> = listed.iter().map(|n| n.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["n2", "n3"]);
    }
}
