//! Event Sink (C2): ordered, append-only journal of Kubernetes-style `Event`
//! objects, with strategic-merge-patch support for deduplicating repeated events
//! (spec.md §3, §4.2).

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::common::{Kind, KubeObject, ObjectMeta};
use crate::core::patch::apply_strategic_merge_patch;
use crate::core::pod::ObjectReference;
use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub involved_object: ObjectReference,
    pub reason: String,
    pub message: String,
    pub r#type: EventType,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default = "chrono::Utc::now")]
    pub first_timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default = "chrono::Utc::now")]
    pub last_timestamp: chrono::DateTime<chrono::Utc>,
}

fn one() -> u32 {
    1
}

impl KubeObject for EventRecord {
    fn kind(&self) -> Kind {
        Kind::core("Event")
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Ordered append-only list; deletions mark the slot `None` rather than shifting
/// indices, so position is stable for the lifetime of the sink (spec.md §4.2).
#[derive(Clone)]
pub struct EventSink {
    entries: Arc<RwLock<Vec<Option<EventRecord>>>>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn create(&self, mut event: EventRecord) -> EventRecord {
        event.metadata.apply_server_defaults();
        self.entries.write().unwrap().push(Some(event.clone()));
        event
    }

    pub fn update(&self, event: EventRecord) -> Result<EventRecord, StoreError> {
        let key = event.key();
        let mut entries = self.entries.write().unwrap();
        for slot in entries.iter_mut() {
            if let Some(existing) = slot {
                if existing.key() == key {
                    *slot = Some(event.clone());
                    return Ok(event);
                }
            }
        }
        Err(StoreError::NotFound {
            namespace: event.metadata.namespace,
            name: event.metadata.name,
        })
    }

    /// Applies a strategic-merge-patch to the located event by `(namespace, name)`.
    pub fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<EventRecord, StoreError> {
        let key = if namespace.is_empty() { name.to_string() } else { format!("{namespace}/{name}") };
        let mut entries = self.entries.write().unwrap();
        for slot in entries.iter_mut() {
            if let Some(existing) = slot {
                if existing.key() == key {
                    let current = serde_json::to_value(&*existing).map_err(|e| StoreError::Internal(e.to_string()))?;
                    let merged = apply_strategic_merge_patch(&current, patch);
                    let updated: EventRecord = serde_json::from_value(merged).map_err(|e| StoreError::Invalid(e.to_string()))?;
                    *existing = updated.clone();
                    return Ok(updated);
                }
            }
        }
        Err(StoreError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    pub fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let key = if namespace.is_empty() { name.to_string() } else { format!("{namespace}/{name}") };
        let mut entries = self.entries.write().unwrap();
        for slot in entries.iter_mut() {
            if let Some(existing) = slot {
                if existing.key() == key {
                    *slot = None;
                    return Ok(());
                }
            }
        }
        Err(StoreError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Returns non-nil entries in order, optionally filtered by namespace.
    pub fn list(&self, namespace: Option<&str>) -> Vec<EventRecord> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter_map(|slot| slot.clone())
            .filter(|e| namespace.map(|ns| ns.is_empty() || e.metadata.namespace == ns).unwrap_or(true))
            .collect()
    }

    pub fn reset(&self) {
        self.entries.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(name: &str) -> EventRecord {
        EventRecord {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: "default".to_string(),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: "Pod".to_string(),
                name: "p1".to_string(),
                namespace: "default".to_string(),
            },
            reason: "Scheduled".to_string(),
            message: "placed on node n1".to_string(),
            r#type: EventType::Normal,
            count: 1,
            first_timestamp: chrono::Utc::now(),
            last_timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn create_then_list_returns_event() {
        let sink = EventSink::new();
        sink.create(sample_event("e1"));
        assert_eq!(sink.list(None).len(), 1);
    }

    #[test]
    fn delete_marks_slot_nil_without_shifting() {
        let sink = EventSink::new();
        sink.create(sample_event("e1"));
        sink.create(sample_event("e2"));
        sink.delete("default", "e1").unwrap();
        let listed = sink.list(None);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.name, "e2");
    }

    #[test]
    fn patch_merges_count_field() {
        let sink = EventSink::new();
        sink.create(sample_event("e1"));
        let patched = sink.patch("default", "e1", &serde_json::json!({"count": 2})).unwrap();
        assert_eq!(patched.count, 2);
    }
}
