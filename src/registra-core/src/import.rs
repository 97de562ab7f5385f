use crate::core::Registry;
use crate::error::RegistryResult;
use crate::ids::PolicyId;
use crate::models::{Api, Params, Policy, Resource};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

// ---------- import document (yaml / json / toml) ----------
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportDocument {
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub apis: Vec<ImportApi>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportApi {
    #[serde(flatten)]
    pub api: Api,
    #[serde(default)]
    pub resources: Vec<ImportResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportResource {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default)]
    pub policies: Vec<ImportApplied>,
}

/// Application of a policy named by its class name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportApplied {
    pub policy: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub entity: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImportReport {
    pub policies: usize,
    pub apis: usize,
    pub resources: usize,
    pub applied: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    fn fail(&mut self, entity: &str, name: impl Into<String>, error: impl ToString) {
        let failure = ImportFailure {
            entity: entity.to_string(),
            name: name.into(),
            error: error.to_string(),
        };
        warn!(entity = %failure.entity, name = %failure.name, "import failed: {}", failure.error);
        self.failures.push(failure);
    }
}

/// Parse an import document, picking the format from the file extension.
pub fn parse_document(path: &str, content: &str) -> Result<ImportDocument> {
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        Ok(serde_yml::from_str(content)?)
    } else if path.ends_with(".json") {
        Ok(serde_json::from_str(content)?)
    } else if path.ends_with(".toml") {
        Ok(toml::from_str(content)?)
    } else {
        Err(anyhow!("Unknown import extension: {}", path))
    }
}

pub fn load_document<P: AsRef<Path>>(path: P) -> Result<ImportDocument> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("read import {}", path.display()))?;
    parse_document(&path.to_string_lossy(), &content)
        .with_context(|| format!("parse import {}", path.display()))
}

impl Registry {
    /// Whether the registry holds no API and no policy.
    pub fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.list_apis()?.is_empty() && self.list_policies()?.is_empty())
    }

    /// Import `doc` only into an empty registry, so a persistent store is
    /// seeded once. Returns `None` when the store already holds data.
    pub fn seed(&self, doc: ImportDocument) -> RegistryResult<Option<ImportReport>> {
        if !self.is_empty()? {
            info!("registry already populated, seed skipped");
            return Ok(None);
        }
        Ok(Some(self.import(doc)))
    }

    /// Load a document entity by entity. A failed insert is reported and
    /// does not undo the ones before it; children of a failed parent are
    /// skipped.
    pub fn import(&self, doc: ImportDocument) -> ImportReport {
        let mut report = ImportReport::default();
        let mut by_class: HashMap<String, PolicyId> = HashMap::new();

        for policy in doc.policies {
            let class_name = policy.class_name.clone();
            match self.add_policy(policy) {
                Ok(stored) => {
                    by_class.entry(class_name).or_insert(stored.id);
                    report.policies += 1;
                }
                Err(e) => report.fail("policy", class_name, e),
            }
        }

        for entry in doc.apis {
            let api_name = entry.api.name.clone();
            let api = match self.add_api(entry.api) {
                Ok(api) => api,
                Err(e) => {
                    report.fail("api", api_name, e);
                    continue;
                }
            };
            report.apis += 1;

            for item in entry.resources {
                let label = format!("{} {}{}", item.resource.method, api.context, item.resource.path);
                let resource = match self.add_resource(api.id, item.resource) {
                    Ok(resource) => resource,
                    Err(e) => {
                        report.fail("resource", label, e);
                        continue;
                    }
                };
                report.resources += 1;

                for applied in item.policies {
                    let policy_id = match by_class.get(&applied.policy) {
                        Some(id) => Some(*id),
                        None => match self.find_policy(&applied.policy) {
                            Ok(found) => found.map(|p| p.id),
                            Err(e) => {
                                report.fail("applied", applied.policy, e);
                                continue;
                            }
                        },
                    };
                    let Some(policy_id) = policy_id else {
                        report.fail("applied", applied.policy.clone(), format!("unknown policy `{}`", applied.policy));
                        continue;
                    };
                    match self.apply_policy(resource.id, policy_id, applied.order, applied.params) {
                        Ok(_) => report.applied += 1,
                        Err(e) => report.fail("applied", applied.policy, e),
                    }
                }
            }
        }

        info!(
            policies = report.policies,
            apis = report.apis,
            resources = report.resources,
            applied = report.applied,
            failures = report.failures.len(),
            "import finished"
        );
        report
    }
}
