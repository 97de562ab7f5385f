use crate::ids::{PolicyId, ResourceId};
use crate::models::{Metadata, Params};
use serde::{Deserialize, Serialize};

/// Reusable cross-cutting behaviour. `class_name` is an opaque reference that
/// only the gateway publisher resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Policy {
    #[serde(default)]
    pub id: PolicyId,
    #[serde(alias = "className")]
    pub class_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub seq: u64,
}

impl Policy {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Join between a resource and a policy. `(resource_id, policy_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPolicy {
    pub resource_id: ResourceId,
    pub policy_id: PolicyId,
    pub order: i32,
    #[serde(default)]
    pub params: Params,
    /// Sequence of the first application of this pair; breaks order ties.
    #[serde(default)]
    pub seq: u64,
}

impl AppliedPolicy {
    pub(crate) fn key(resource_id: ResourceId, policy_id: PolicyId) -> String {
        format!("{}/{}", resource_id, policy_id)
    }
}

/// One step of a resource's policy chain, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub order: i32,
    pub params: Params,
    pub policy: Policy,
}
