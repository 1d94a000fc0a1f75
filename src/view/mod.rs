//! Views (C3 Base View, C4 Sandbox View): aggregates of Resource Stores + an Event
//! Sink that the API surface and simulation engine read and write through.

pub mod base;
pub mod sandbox;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

use crate::core::event_sink::EventRecord;
use crate::core::node::Node;
use crate::core::patch::PatchKind;
use crate::core::pod::Pod;
use crate::core::selector::LabelSelector;
use crate::core::store::{MatchCriteria, WatchEvent};
use crate::errors::{StoreError, ViewError};

/// A boxed, object-safe watch stream — every `View::watch_*` method returns one of
/// these rather than `impl Stream`, since `View` is used as `Arc<dyn View>` (spec.md
/// §4.1 `Watch`).
pub type BoxWatchStream<T> = Pin<Box<dyn Stream<Item = Result<WatchEvent<T>, StoreError>> + Send>>;

/// Common read/write surface both [`base::BaseView`] and [`sandbox::SandboxView`]
/// implement, so the API surface (C5) and simulation engine (C7) can be generic over
/// "some view" without caring whether it's the base or an overlay.
pub trait View: Send + Sync {
    fn get_node(&self, name: &str) -> Result<Node, ViewError>;
    fn list_nodes(&self) -> Result<(Vec<Node>, i64), ViewError>;
    fn store_node(&self, node: Node) -> Result<Node, ViewError>;
    fn update_node(&self, node: Node) -> Result<Node, ViewError>;
    fn delete_node(&self, name: &str) -> Result<Node, ViewError>;
    fn patch_node(&self, name: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Node, ViewError>;
    fn delete_nodes(&self, criteria: &MatchCriteria) -> Result<Vec<Node>, ViewError>;
    fn watch_nodes(&self, start_rv: i64, selector: LabelSelector, timeout: Duration) -> BoxWatchStream<Node>;

    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ViewError>;
    fn list_pods(&self, namespace: Option<&str>) -> Result<(Vec<Pod>, i64), ViewError>;
    fn store_pod(&self, pod: Pod) -> Result<Pod, ViewError>;
    fn update_pod(&self, pod: Pod) -> Result<Pod, ViewError>;
    fn delete_pod(&self, namespace: &str, name: &str) -> Result<Pod, ViewError>;
    fn patch_pod(&self, namespace: &str, name: &str, kind: PatchKind, patch: &serde_json::Value, status_only: bool) -> Result<Pod, ViewError>;
    fn delete_pods(&self, criteria: &MatchCriteria) -> Result<Vec<Pod>, ViewError>;
    fn watch_pods(&self, start_rv: i64, namespace: Option<String>, selector: LabelSelector, timeout: Duration) -> BoxWatchStream<Pod>;

    /// Fetches the pod, sets `spec.nodeName` and the `PodScheduled` condition to
    /// true, then updates (spec.md §4.3 `UpdatePodNodeBinding`).
    fn update_pod_node_binding(&self, namespace: &str, pod_name: &str, node_name: &str) -> Result<Pod, ViewError> {
        let mut pod = self.get_pod(namespace, pod_name)?;
        pod.set_scheduled(node_name, chrono::Utc::now());
        self.update_pod(pod)
    }

    fn create_event(&self, event: EventRecord) -> EventRecord;
    fn list_events(&self, namespace: Option<&str>) -> Vec<EventRecord>;

    fn object_change_count(&self) -> i64;

    /// Resets every store and the sink, zeroing the change counter (spec.md §4.3).
    /// Sandboxes reset only their local overlay — the delegate is never mutated.
    fn reset(&self);
}

/// Mounts/unmounts a view under a path prefix so it's reachable over HTTP (spec.md
/// §4.5 "the API surface hosts multiple views concurrently under distinct path
/// prefixes ... each sandbox is mounted under `/{sandboxName}/...`"). Implemented by
/// the API surface's application state; the simulation engine depends only on this
/// trait so it stays free of any HTTP-layer type.
pub trait SandboxRegistry: Send + Sync {
    fn mount(&self, prefix: String, view: Arc<dyn View>);
    fn unmount(&self, prefix: &str);
}
