use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCfg {
    #[serde(default = "def_host")]
    pub host: String,
    #[serde(default = "def_port")]
    pub port: u16,
    #[serde(default)]
    pub name: String,
}
fn def_host() -> String { "0.0.0.0".into() }
fn def_port() -> u16 { 8000 }

impl Default for GatewayCfg {
    fn default() -> Self {
        Self {
            host: def_host(),
            port: def_port(),
            name: String::new(),
        }
    }
}

impl GatewayCfg {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCfg {
    #[serde(default = "def_engine")]
    pub engine: String, // lmdb | memory
    #[serde(default)]
    pub path: String,
}
fn def_engine() -> String { "memory".into() }

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            engine: def_engine(),
            path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingCfg {
    #[serde(default)]
    pub otlp_endpoint: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default = "def_logging")]
    pub logging_mode: String,
}
fn def_logging() -> String { "info".into() }

impl Default for TracingCfg {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            service_name: String::new(),
            logging_mode: def_logging(),
        }
    }
}

impl TracingCfg {
    /// `None` when no collector is configured.
    pub fn endpoint(&self) -> Option<&str> {
        let endpoint = self.otlp_endpoint.trim();
        (!endpoint.is_empty()).then_some(endpoint)
    }
}

/// Seed document loaded into the registry at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportCfg {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub gateway: GatewayCfg,
    #[serde(default)]
    pub storage: StorageCfg,
    #[serde(default)]
    pub tracing: TracingCfg,
    #[serde(default)]
    pub import: ImportCfg,
}

impl FileConfig {
    /// Service name for telemetry: tracing setting, then gateway name, then the fallback.
    pub fn service_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        [self.tracing.service_name.as_str(), self.gateway.name.as_str()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(fallback)
    }
}

pub fn parse_config(path: &str, content: &str) -> Result<FileConfig> {
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        Ok(serde_yml::from_str(content)?)
    } else if path.ends_with(".json") {
        Ok(serde_json::from_str(content)?)
    } else if path.ends_with(".toml") {
        Ok(toml::from_str(content)?)
    } else {
        Err(anyhow!("Unknown config extension: {}", path))
    }
}

pub fn load_config(path: &str) -> Result<FileConfig> {
    let content = fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    let cfg = parse_config(path, &content).with_context(|| format!("parse config {}", path))?;
    debug!(path, engine = %cfg.storage.engine, addr = %cfg.gateway.addr(), "config loaded");
    Ok(cfg)
}
