//! Type definition for the Pod kind stored in the resource store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::common::{Condition, ConditionStatus, Kind, KubeObject, ObjectMeta, Resources};
use crate::core::node::Taint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toleration {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub operator: String,
    pub effect: Option<String>,
}

impl Toleration {
    pub fn tolerates(&self, taint: &Taint) -> bool {
        if self.key != taint.key {
            return false;
        }
        match &self.effect {
            Some(effect) => effect.eq_ignore_ascii_case(&format!("{:?}", taint.effect)),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: Resources,
    #[serde(default)]
    pub limits: Resources,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PodSpec {
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
    /// Affinity/anti-affinity rules, opaque to the core per spec.md §3 — passed to
    /// the scheduler verbatim.
    #[serde(default)]
    pub affinity: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub const POD_CONDITION_SCHEDULED: &str = "PodScheduled";
pub const POD_UNSCHEDULABLE_REASON: &str = "Unschedulable";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, requests: Resources) -> Self {
        let mut metadata = ObjectMeta::default();
        metadata.name = name.into();
        metadata.namespace = namespace.into();
        Self {
            metadata,
            spec: PodSpec {
                resources: ResourceRequirements {
                    requests,
                    limits: Resources::default(),
                },
                ..Default::default()
            },
            status: PodStatus::default(),
        }
    }

    pub fn get_condition(&self, condition_type: &str) -> Option<&Condition> {
        self.status.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// A pod is *scheduled* when `spec.nodeName` is non-empty and `PodScheduled` is
    /// `True` (spec.md §4.7 step 4).
    pub fn is_scheduled(&self) -> bool {
        !self.spec.node_name.is_empty()
            && matches!(
                self.get_condition(POD_CONDITION_SCHEDULED),
                Some(c) if c.status == ConditionStatus::True
            )
    }

    /// A pod is *unschedulable* when `PodScheduled` is `False` with reason
    /// `Unschedulable` (spec.md §4.7 step 4).
    pub fn is_unschedulable(&self) -> bool {
        matches!(
            self.get_condition(POD_CONDITION_SCHEDULED),
            Some(c) if c.status == ConditionStatus::False && c.reason == POD_UNSCHEDULABLE_REASON
        )
    }

    pub fn is_pending_decision(&self) -> bool {
        !self.is_scheduled() && !self.is_unschedulable()
    }

    pub fn set_scheduled(&mut self, node_name: &str, at: chrono::DateTime<chrono::Utc>) {
        self.spec.node_name = node_name.to_string();
        self.upsert_condition(POD_CONDITION_SCHEDULED, ConditionStatus::True, "Scheduled", at);
    }

    pub fn set_unschedulable(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.upsert_condition(POD_CONDITION_SCHEDULED, ConditionStatus::False, POD_UNSCHEDULABLE_REASON, at);
    }

    fn upsert_condition(&mut self, r#type: &str, status: ConditionStatus, reason: &str, at: chrono::DateTime<chrono::Utc>) {
        if let Some(c) = self.status.conditions.iter_mut().find(|c| c.r#type == r#type) {
            c.status = status;
            c.reason = reason.to_string();
            c.last_transition_time = at;
        } else {
            self.status.conditions.push(Condition {
                r#type: r#type.to_string(),
                status,
                reason: reason.to_string(),
                last_transition_time: at,
            });
        }
    }
}

impl KubeObject for Pod {
    fn kind(&self) -> Kind {
        Kind::core("Pod")
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Posted to `/api/v1/namespaces/{ns}/pods/{name}/binding` (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub target: ObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Resources;

    #[test]
    fn fresh_pod_is_pending_decision() {
        let pod = Pod::new("p", "default", Resources::default());
        assert!(pod.is_pending_decision());
        assert!(!pod.is_scheduled());
        assert!(!pod.is_unschedulable());
    }

    #[test]
    fn set_scheduled_clears_pending_decision() {
        let mut pod = Pod::new("p", "default", Resources::default());
        pod.set_scheduled("n1", chrono::Utc::now());
        assert!(pod.is_scheduled());
        assert!(!pod.is_pending_decision());
    }

    #[test]
    fn set_unschedulable_clears_pending_decision() {
        let mut pod = Pod::new("p", "default", Resources::default());
        pod.set_unschedulable(chrono::Utc::now());
        assert!(pod.is_unschedulable());
        assert!(!pod.is_pending_decision());
    }

    #[test]
    fn toleration_without_effect_tolerates_any_effect() {
        let toleration = Toleration {
            key: "dedicated".to_string(),
            value: "gpu".to_string(),
            operator: "Equal".to_string(),
            effect: None,
        };
        let taint = Taint {
            key: "dedicated".to_string(),
            value: "gpu".to_string(),
            effect: crate::core::node::TaintEffect::NoSchedule,
        };
        assert!(toleration.tolerates(&taint));
    }
}
