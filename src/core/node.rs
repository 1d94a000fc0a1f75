//! Type definition for the Node kind stored in the resource store.

use serde::{Deserialize, Serialize};

use crate::core::common::{Condition, ConditionStatus, Kind, KubeObject, ObjectMeta, Resources};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    pub value: String,
    pub effect: TaintEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeSpec {
    #[serde(default)]
    pub unschedulable: bool,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeStatus {
    #[serde(default)]
    pub capacity: Resources,
    #[serde(default)]
    pub allocatable: Resources,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub const NODE_CONDITION_READY: &str = "Ready";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeSpec,
    #[serde(default)]
    pub status: NodeStatus,
}

impl Node {
    pub fn new(name: impl Into<String>, capacity: Resources) -> Self {
        let mut metadata = ObjectMeta::default();
        metadata.name = name.into();
        let creation_timestamp = metadata.creation_timestamp;
        Self {
            metadata,
            spec: NodeSpec::default(),
            status: NodeStatus {
                allocatable: capacity,
                capacity,
                conditions: vec![Condition {
                    r#type: NODE_CONDITION_READY.to_string(),
                    status: ConditionStatus::True,
                    reason: "NodeCreated".to_string(),
                    last_transition_time: creation_timestamp,
                }],
            },
        }
    }

    pub fn get_condition(&self, condition_type: &str) -> Option<&Condition> {
        self.status.conditions.iter().find(|c| c.r#type == condition_type)
    }
}

impl KubeObject for Node {
    fn kind(&self) -> Kind {
        Kind::core("Node")
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
