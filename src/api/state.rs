//! Shared application state: the base view plus the registry of mounted sandbox
//! views, one per path prefix (spec.md §4.5 "the API surface hosts multiple views
//! concurrently under distinct path prefixes").

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::errors::ApiError;
use crate::view::base::BaseView;
use crate::view::{SandboxRegistry, View};

pub struct AppState {
    pub base_prefix: String,
    pub base: Arc<BaseView>,
    pub watch_timeout: Duration,
    sandboxes: RwLock<HashMap<String, Arc<dyn View>>>,
}

impl AppState {
    pub fn new(base_prefix: impl Into<String>, base: Arc<BaseView>, watch_timeout: Duration) -> Self {
        Self {
            base_prefix: base_prefix.into(),
            base,
            watch_timeout,
            sandboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Mounts a sandbox view under `prefix`, replacing any prior view at that prefix.
    pub fn mount(&self, prefix: impl Into<String>, view: Arc<dyn View>) {
        self.sandboxes.write().expect("sandboxes lock poisoned").insert(prefix.into(), view);
    }

    pub fn unmount(&self, prefix: &str) {
        self.sandboxes.write().expect("sandboxes lock poisoned").remove(prefix);
    }

    /// Strip-prefix routing: resolves a mounted path segment to its view (spec.md
    /// §4.5). The base view is reached through its own configured prefix; every
    /// other prefix must have been mounted via [`AppState::mount`].
    pub fn resolve(&self, prefix: &str) -> Result<Arc<dyn View>, ApiError> {
        if prefix == self.base_prefix {
            let base: Arc<dyn View> = self.base.clone();
            return Ok(base);
        }
        self.sandboxes
            .read()
            .expect("sandboxes lock poisoned")
            .get(prefix)
            .cloned()
            .ok_or_else(|| ApiError::Store(crate::errors::StoreError::NotFound {
                namespace: String::new(),
                name: format!("view prefix {prefix}"),
            }))
    }
}

impl SandboxRegistry for AppState {
    fn mount(&self, prefix: String, view: Arc<dyn View>) {
        self.mount(prefix, view)
    }

    fn unmount(&self, prefix: &str) {
        self.unmount(prefix)
    }
}
