use crate::ids::{ApiId, ResourceId};
use serde::{Deserialize, Serialize};

/// A single path + method binding owned by one API.
///
/// A present `response` puts the resource in mock mode; otherwise requests are
/// proxied to `endpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resource {
    #[serde(default)]
    pub id: ResourceId,
    #[serde(default)]
    pub api_id: ApiId,
    #[serde(default)]
    pub description: String,
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub accept: String,
    #[serde(default, alias = "mediaType")]
    pub media_type: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub seq: u64,
}

impl Resource {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_response(mut self, body: impl Into<String>) -> Self {
        self.response = Some(body.into());
        self
    }

    pub fn with_endpoint(mut self, uri: impl Into<String>) -> Self {
        self.endpoint = Some(uri.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn is_mock(&self) -> bool {
        self.response.is_some()
    }

    pub(crate) fn apply_update(&mut self, from: &Resource) {
        self.description = from.description.clone();
        self.path = from.path.clone();
        self.method = from.method.clone();
        self.version = from.version.clone();
        self.accept = from.accept.clone();
        self.media_type = from.media_type.clone();
        self.response = from.response.clone();
        self.endpoint = from.endpoint.clone();
    }
}
