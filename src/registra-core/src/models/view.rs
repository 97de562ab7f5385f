use crate::ids::{ApiId, ResourceId};
use crate::models::{Api, ChainLink, Resource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only aggregate of an API, its resources and their policy chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiView {
    pub api: Api,
    pub resources: Vec<ResourceView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceView {
    pub resource: Resource,
    pub chain: Vec<ChainLink>,
}

/// Gateway route key, `"{api_id}-{resource_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(String);

impl RouteKey {
    pub fn new(api_id: ApiId, resource_id: ResourceId) -> Self {
        Self(format!("{}-{}", api_id, resource_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RouteTarget {
    Mock { body: String, media_type: String },
    Proxy { endpoint: String },
}

/// Everything a publisher needs to run one resource as a live route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub key: RouteKey,
    pub api_id: ApiId,
    pub resource_id: ResourceId,
    pub context: String,
    pub path: String,
    pub method: String,
    pub target: RouteTarget,
    pub policies: Vec<ChainLink>,
}

impl RouteSpec {
    pub(crate) fn from_view(api: &Api, view: &ResourceView) -> Self {
        let resource = &view.resource;
        let target = match resource.endpoint.as_deref() {
            Some(endpoint) if !resource.is_mock() && !api.mocked && !endpoint.trim().is_empty() => {
                RouteTarget::Proxy {
                    endpoint: endpoint.to_string(),
                }
            }
            _ => RouteTarget::Mock {
                body: resource.response.clone().unwrap_or_default(),
                media_type: resource.media_type.clone(),
            },
        };
        Self {
            key: RouteKey::new(api.id, resource.id),
            api_id: api.id,
            resource_id: resource.id,
            context: api.context.clone(),
            path: resource.path.clone(),
            method: resource.method.to_ascii_uppercase(),
            target,
            policies: view.chain.clone(),
        }
    }

    /// HTTP verbs compare case-insensitively; an empty method accepts any verb.
    pub fn matches_method(&self, method: &str) -> bool {
        self.method.is_empty() || self.method.eq_ignore_ascii_case(method)
    }

    /// `context` and `path` joined with exactly one slash between them.
    pub fn full_path(&self) -> String {
        let context = self.context.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        let joined = if path.is_empty() {
            context.to_string()
        } else {
            format!("{}/{}", context, path)
        };
        if joined.starts_with('/') {
            joined
        } else {
            format!("/{}", joined)
        }
    }
}
