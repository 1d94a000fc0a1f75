//! Identity and resource primitives shared by every stored object kind.
//!
//! Mirrors the teacher's `core::common::Resources`/`SimComponentId` but expanded to
//! carry full Kubernetes-style object identity, since this system's store (C1) is a
//! general typed object store rather than a single-purpose resource counter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Group+version+kind identifier, e.g. `("", "v1", "Pod")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Kind {
    pub group: String,
    pub version: String,
    pub name: String,
}

impl Kind {
    pub fn new(group: &str, version: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            name: name.to_string(),
        }
    }

    pub fn core(name: &str) -> Self {
        Self::new("", "v1", name)
    }

    /// `/apis/{group}/{version}` or `/api/{version}` for the core group.
    pub fn api_path_prefix(&self) -> String {
        if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        }
    }
}

pub type ResourceVersion = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub generate_name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub resource_version: ResourceVersion,
    #[serde(default = "Utc::now")]
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            name: String::new(),
            generate_name: String::new(),
            uid: String::new(),
            resource_version: 0,
            creation_timestamp: Utc::now(),
            deletion_timestamp: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}

impl ObjectMeta {
    /// `"namespace/name"`, or `"name"` when cluster-scoped (empty namespace).
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    pub fn is_tombstoned(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Fills in server-assigned defaults, mirroring `BaseView::StoreObject` (spec.md
    /// §4.3): generates a name from `generate_name` if `name` is empty, stamps
    /// creation time and a UID when unset.
    pub fn apply_server_defaults(&mut self) {
        if self.name.is_empty() && !self.generate_name.is_empty() {
            self.name = format!("{}{}", self.generate_name, random_name_suffix(5));
        }
        if self.uid.is_empty() {
            self.uid = Uuid::new_v4().to_string();
        }
    }
}

/// A DNS-1123-compatible 5-character random suffix, as used by `generateName`.
pub fn random_name_suffix(len: usize) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// The capability interface referenced in spec.md §9 design notes: a small accessor
/// surface every stored kind exposes uniformly, so handler code in the API surface
/// and views can stay generic over a descriptor rather than on a concrete type.
pub trait KubeObject: Send + Sync {
    fn kind(&self) -> Kind;
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn namespace(&self) -> &str {
        &self.meta().namespace
    }
    fn name(&self) -> &str {
        &self.meta().name
    }
    fn key(&self) -> String {
        self.meta().key()
    }
    fn labels(&self) -> &BTreeMap<String, String> {
        &self.meta().labels
    }
    fn resource_version(&self) -> ResourceVersion {
        self.meta().resource_version
    }
    fn set_resource_version(&mut self, rv: ResourceVersion) {
        self.meta_mut().resource_version = rv;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// CPU, in millicores.
    pub cpu: u64,
    /// Memory, in bytes.
    pub memory: u64,
    /// Ephemeral storage, in bytes.
    #[serde(default)]
    pub ephemeral_storage: u64,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cpu: 0,
            memory: 0,
            ephemeral_storage: 0,
        }
    }
}

impl Resources {
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu.saturating_sub(other.cpu),
            memory: self.memory.saturating_sub(other.memory),
            ephemeral_storage: self.ephemeral_storage.saturating_sub(other.ephemeral_storage),
        }
    }

    pub fn saturating_add(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu.saturating_add(other.cpu),
            memory: self.memory.saturating_add(other.memory),
            ephemeral_storage: self.ephemeral_storage.saturating_add(other.ephemeral_storage),
        }
    }

    pub fn fits_within(&self, capacity: &Resources) -> bool {
        self.cpu <= capacity.cpu
            && self.memory <= capacity.memory
            && self.ephemeral_storage <= capacity.ephemeral_storage
    }

    /// Named resource accessor, used by the scoring weight maps (spec.md §4.8) which
    /// key on an open resource-name vocabulary (`cpu`, `memory`, ...).
    pub fn get(&self, name: &str) -> Option<u64> {
        match name {
            "cpu" => Some(self.cpu),
            "memory" => Some(self.memory),
            "ephemeral-storage" => Some(self.ephemeral_storage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default = "Utc::now")]
    pub last_transition_time: DateTime<Utc>,
}
