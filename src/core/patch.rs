//! Patch semantics: RFC 7396 merge-patch and a strategic-merge-patch with
//! `patchMergeKey`-aware list merge for `conditions` arrays (spec.md §4.1).

use serde_json::{Map, Value};

use crate::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    StrategicMerge,
    Merge,
}

impl PatchKind {
    pub fn from_content_type(content_type: &str) -> Result<Self, ApiError> {
        match content_type {
            "application/strategic-merge-patch+json" => Ok(PatchKind::StrategicMerge),
            "application/merge-patch+json" => Ok(PatchKind::Merge),
            other => Err(ApiError::PatchUnsupportedContentType(other.to_string())),
        }
    }
}

/// RFC 7396 JSON Merge Patch: `null` deletes a key, any other scalar/array replaces,
/// objects recurse.
pub fn apply_merge_patch(target: &Value, patch: &Value) -> Value {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            let mut result = target_map.clone();
            for (k, v) in patch_map {
                if v.is_null() {
                    result.remove(k);
                } else {
                    let merged = apply_merge_patch(result.get(k).unwrap_or(&Value::Null), v);
                    result.insert(k.clone(), merged);
                }
            }
            Value::Object(result)
        }
        (_, patch) => patch.clone(),
    }
}

/// The field Kubernetes objects key `conditions` lists by (`Type`/`type`), used to
/// merge rather than replace condition arrays under a strategic-merge-patch.
const CONDITIONS_FIELD: &str = "conditions";
const CONDITIONS_MERGE_KEY: &str = "type";

/// Strategic-merge-patch: deep merge like [`apply_merge_patch`], except a `conditions`
/// array is merged entry-by-entry on its `type` field rather than replaced wholesale —
/// matching the one list field this object model actually carries in `status`
/// (`status.conditions` on both `Node` and `Pod`). Any other array still replaces.
pub fn apply_strategic_merge_patch(target: &Value, patch: &Value) -> Value {
    apply_strategic_merge_patch_inner(target, patch, None)
}

fn apply_strategic_merge_patch_inner(target: &Value, patch: &Value, field_name: Option<&str>) -> Value {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            let mut result = target_map.clone();
            for (k, v) in patch_map {
                if v.is_null() {
                    result.remove(k);
                } else {
                    let existing = result.get(k).cloned().unwrap_or(Value::Null);
                    let merged = apply_strategic_merge_patch_inner(&existing, v, Some(k));
                    result.insert(k.clone(), merged);
                }
            }
            Value::Object(result)
        }
        (Value::Array(target_items), Value::Array(patch_items)) if field_name == Some(CONDITIONS_FIELD) => {
            merge_list_by_key(target_items, patch_items, CONDITIONS_MERGE_KEY)
        }
        (_, patch) => patch.clone(),
    }
}

/// Merges `patch` entries into `target` by matching `merge_key`: an entry whose key
/// value already appears is deep-merged in place, otherwise it's appended.
fn merge_list_by_key(target: &[Value], patch: &[Value], merge_key: &str) -> Value {
    let mut result: Vec<Value> = target.to_vec();
    for patch_item in patch {
        let key_value = patch_item.get(merge_key);
        let existing = key_value.and_then(|kv| result.iter().position(|item| item.get(merge_key) == Some(kv)));
        match existing {
            Some(idx) => result[idx] = apply_strategic_merge_patch_inner(&result[idx], patch_item, None),
            None => result.push(patch_item.clone()),
        }
    }
    Value::Array(result)
}

pub fn apply(kind: PatchKind, target: &Value, patch: &Value) -> Value {
    match kind {
        PatchKind::StrategicMerge => apply_strategic_merge_patch(target, patch),
        PatchKind::Merge => apply_merge_patch(target, patch),
    }
}

/// Rejects a patch that attempts to change `metadata.name` or `metadata.namespace`
/// (spec.md §4.1, §8 boundary behavior).
pub fn reject_immutable_field_changes(original: &Value, patched: &Value) -> Result<(), ApiError> {
    let orig_meta = original.get("metadata");
    let patched_meta = patched.get("metadata");
    for field in ["name", "namespace"] {
        let orig_val = orig_meta.and_then(|m| m.get(field));
        let patched_val = patched_meta.and_then(|m| m.get(field));
        if orig_val.is_some() && orig_val != patched_val {
            return Err(ApiError::Store(crate::errors::StoreError::Invalid(format!(
                "metadata.{} is immutable",
                field
            ))));
        }
    }
    Ok(())
}

/// Extracts only the `status` subtree from a patch body, for the dedicated status
/// subresource path (spec.md §4.1): top-level mutations outside `status` are rejected.
pub fn extract_status_only_patch(patch: &Value) -> Result<Value, ApiError> {
    match patch {
        Value::Object(map) => {
            let mut disallowed: Vec<&String> = map.keys().filter(|k| k.as_str() != "status").collect();
            disallowed.sort();
            if !disallowed.is_empty() {
                return Err(ApiError::PatchApply(format!(
                    "status patch may only contain a top-level 'status' key, got extra keys: {:?}",
                    disallowed
                )));
            }
            let mut wrapper = Map::new();
            if let Some(status) = map.get("status") {
                wrapper.insert("status".to_string(), status.clone());
            }
            Ok(Value::Object(wrapper))
        }
        _ => Err(ApiError::PatchParse("status patch body must be a JSON object".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_patch_deletes_null_fields() {
        let target = json!({"a": 1, "b": 2});
        let patch = json!({"b": null});
        assert_eq!(apply_merge_patch(&target, &patch), json!({"a": 1}));
    }

    #[test]
    fn merge_patch_is_noop_on_empty_patch() {
        let target = json!({"a": 1, "nested": {"x": 1}});
        assert_eq!(apply_merge_patch(&target, &json!({})), target);
    }

    #[test]
    fn merge_patch_recurses_into_objects() {
        let target = json!({"spec": {"replicas": 1, "image": "a"}});
        let patch = json!({"spec": {"replicas": 2}});
        assert_eq!(apply_merge_patch(&target, &patch), json!({"spec": {"replicas": 2, "image": "a"}}));
    }

    #[test]
    fn rejects_name_change() {
        let original = json!({"metadata": {"name": "a", "namespace": "ns"}});
        let patched = json!({"metadata": {"name": "b", "namespace": "ns"}});
        assert!(reject_immutable_field_changes(&original, &patched).is_err());
    }

    #[test]
    fn status_patch_rejects_top_level_mutation() {
        let patch = json!({"status": {"phase": "Running"}, "spec": {"x": 1}});
        assert!(extract_status_only_patch(&patch).is_err());
    }

    #[test]
    fn status_patch_extracts_status_only() {
        let patch = json!({"status": {"phase": "Running"}});
        assert_eq!(extract_status_only_patch(&patch).unwrap(), json!({"status": {"phase": "Running"}}));
    }

    #[test]
    fn strategic_merge_merges_conditions_by_type() {
        let target = json!({"status": {"conditions": [
            {"type": "Ready", "status": "False"},
            {"type": "MemoryPressure", "status": "False"},
        ]}});
        let patch = json!({"status": {"conditions": [
            {"type": "Ready", "status": "True"},
        ]}});
        let merged = apply_strategic_merge_patch(&target, &patch);
        assert_eq!(
            merged,
            json!({"status": {"conditions": [
                {"type": "Ready", "status": "True"},
                {"type": "MemoryPressure", "status": "False"},
            ]}})
        );
    }

    #[test]
    fn strategic_merge_appends_new_condition_type() {
        let target = json!({"status": {"conditions": [{"type": "Ready", "status": "True"}]}});
        let patch = json!({"status": {"conditions": [{"type": "DiskPressure", "status": "True"}]}});
        let merged = apply_strategic_merge_patch(&target, &patch);
        assert_eq!(
            merged,
            json!({"status": {"conditions": [
                {"type": "Ready", "status": "True"},
                {"type": "DiskPressure", "status": "True"},
            ]}})
        );
    }

    #[test]
    fn strategic_merge_still_replaces_non_condition_arrays() {
        let target = json!({"spec": {"taints": [{"key": "a"}, {"key": "b"}]}});
        let patch = json!({"spec": {"taints": [{"key": "c"}]}});
        let merged = apply_strategic_merge_patch(&target, &patch);
        assert_eq!(merged, json!({"spec": {"taints": [{"key": "c"}]}}));
    }
}
