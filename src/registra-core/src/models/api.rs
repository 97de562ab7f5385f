use crate::ids::{ApiId, ResourceId};
use crate::models::Metadata;
use serde::{Deserialize, Serialize};

/// A named, versioned grouping of resources under a base context path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Api {
    #[serde(default)]
    pub id: ApiId,
    pub name: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mocked: bool,
    #[serde(default)]
    pub metadata: Metadata,
    /// Opaque uploaded document (OpenAPI, WSDL, ...). Never parsed.
    #[serde(default)]
    pub definition: Option<Vec<u8>>,
    /// Owned resources in insertion order; filled in on read.
    #[serde(skip)]
    pub resources: Vec<ResourceId>,
    /// Insertion sequence assigned by the registry.
    #[serde(default)]
    pub seq: u64,
}

impl Api {
    pub fn new(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mocked(mut self, mocked: bool) -> Self {
        self.mocked = mocked;
        self
    }

    /// Copy the fields `update` is allowed to touch.
    pub(crate) fn apply_update(&mut self, from: &Api) {
        self.name = from.name.clone();
        self.context = from.context.clone();
        self.description = from.description.clone();
        self.version = from.version.clone();
        self.mocked = from.mocked;
    }
}
