use crate::error::{RegistryError, RegistryResult};
use crate::models::{RouteKey, RouteSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Coarse lifecycle state of a published route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RouteStatus {
    #[default]
    NotPublished,
    Starting,
    Started,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
}

impl RouteStatus {
    /// Whether the route still occupies its key.
    pub fn is_active(self) -> bool {
        !matches!(self, RouteStatus::NotPublished | RouteStatus::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RouteMetrics {
    pub uptime: Duration,
    pub properties: BTreeMap<String, String>,
}

/// Turns assembled routes into live endpoints.
///
/// Called by the registry only with committed views and never while a
/// registry lock is held.
pub trait GatewayPublisher: Send + Sync {
    /// Fails with `Conflict` when the key already has an active route.
    fn publish(&self, route: &RouteSpec) -> RegistryResult<()>;
    fn remove(&self, key: &RouteKey) -> RegistryResult<()>;
    fn suspend(&self, key: &RouteKey) -> RegistryResult<()>;
    fn resume(&self, key: &RouteKey) -> RegistryResult<()>;
    fn status(&self, key: &RouteKey) -> RouteStatus;
    fn metrics(&self, key: &RouteKey) -> Option<RouteMetrics>;
}

/// Publisher for registry-only deployments: accepts routes and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl GatewayPublisher for NullPublisher {
    fn publish(&self, _route: &RouteSpec) -> RegistryResult<()> {
        Ok(())
    }

    fn remove(&self, key: &RouteKey) -> RegistryResult<()> {
        Err(RegistryError::not_found("route", key))
    }

    fn suspend(&self, key: &RouteKey) -> RegistryResult<()> {
        Err(RegistryError::not_found("route", key))
    }

    fn resume(&self, key: &RouteKey) -> RegistryResult<()> {
        Err(RegistryError::not_found("route", key))
    }

    fn status(&self, _key: &RouteKey) -> RouteStatus {
        RouteStatus::NotPublished
    }

    fn metrics(&self, _key: &RouteKey) -> Option<RouteMetrics> {
        None
    }
}
