use dashmap::DashMap;
use matchit::Router;
use parking_lot::RwLock;
use registra_core::{
    GatewayPublisher, RegistryError, RegistryResult, RouteKey, RouteMetrics, RouteSpec, RouteStatus, RouteTarget,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A route the gateway currently holds.
#[derive(Debug)]
pub struct PublishedRoute {
    pub spec: RouteSpec,
    pub status: RouteStatus,
    started_at: Option<Instant>,
    exchanges: AtomicU64,
    failures: AtomicU64,
}

impl PublishedRoute {
    fn started(spec: RouteSpec) -> Self {
        Self {
            spec,
            status: RouteStatus::Started,
            started_at: Some(Instant::now()),
            exchanges: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn accepts(&self, method: &str) -> bool {
        self.spec.matches_method(method)
    }

    pub(crate) fn record_exchange(&self, failed: bool) {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn metrics(&self) -> RouteMetrics {
        let uptime = match (self.status, self.started_at) {
            (RouteStatus::Started, Some(at)) => at.elapsed(),
            _ => Duration::ZERO,
        };
        let target = match &self.spec.target {
            RouteTarget::Mock { .. } => "mock".to_string(),
            RouteTarget::Proxy { endpoint } => format!("proxy {}", endpoint),
        };
        let mut properties = BTreeMap::new();
        properties.insert("exchanges".into(), self.exchanges.load(Ordering::Relaxed).to_string());
        properties.insert("failures".into(), self.failures.load(Ordering::Relaxed).to_string());
        properties.insert("policies".into(), self.spec.policies.len().to_string());
        properties.insert("target".into(), target);
        RouteMetrics { uptime, properties }
    }
}

/// Outcome of looking a request up in the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Live(RouteKey),
    Unavailable(RouteKey),
    Missing,
}

/// Route table plus the path router built from it.
///
/// Several routes may share a path with different verbs, so each router
/// entry holds every key published on that path.
pub struct RouteTable {
    routes: DashMap<RouteKey, PublishedRoute>,
    router: RwLock<Router<Vec<RouteKey>>>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
            router: RwLock::new(Router::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, key: &RouteKey) -> Option<dashmap::mapref::one::Ref<'_, RouteKey, PublishedRoute>> {
        self.routes.get(key)
    }

    /// Find the route serving `method path`. A started route wins over a
    /// suspended one on the same path.
    pub fn lookup(&self, method: &str, path: &str) -> Lookup {
        let keys = {
            let router = self.router.read();
            match router.at(path) {
                Ok(matched) => matched.value.clone(),
                Err(_) => return Lookup::Missing,
            }
        };
        let mut unavailable = None;
        for key in keys {
            let Some(route) = self.routes.get(&key) else {
                continue;
            };
            if !route.accepts(method) {
                continue;
            }
            if route.status == RouteStatus::Started {
                return Lookup::Live(key);
            }
            unavailable.get_or_insert(key);
        }
        match unavailable {
            Some(key) => Lookup::Unavailable(key),
            None => Lookup::Missing,
        }
    }

    /// Take a route out of service without dropping it.
    pub fn stop(&self, key: &RouteKey) -> RegistryResult<()> {
        self.transition(key, |route| {
            route.status = RouteStatus::Stopped;
            route.started_at = None;
        })
    }

    fn transition<F>(&self, key: &RouteKey, f: F) -> RegistryResult<()>
    where
        F: FnOnce(&mut PublishedRoute),
    {
        let mut route = self
            .routes
            .get_mut(key)
            .ok_or_else(|| RegistryError::not_found("route", key))?;
        f(&mut route);
        debug!(route = %key, status = ?route.status, "route status changed");
        Ok(())
    }

    fn rebuild(routes: &DashMap<RouteKey, PublishedRoute>) -> Result<Router<Vec<RouteKey>>, String> {
        let mut by_path: HashMap<String, Vec<RouteKey>> = HashMap::new();
        for entry in routes.iter() {
            by_path
                .entry(entry.spec.full_path())
                .or_default()
                .push(entry.key().clone());
        }
        let mut router = Router::new();
        for (path, mut keys) in by_path {
            keys.sort();
            router
                .insert(path.clone(), keys)
                .map_err(|e| format!("path `{}`: {}", path, e))?;
        }
        Ok(router)
    }
}

impl GatewayPublisher for RouteTable {
    fn publish(&self, route: &RouteSpec) -> RegistryResult<()> {
        let mut router = self.router.write();
        let current = self.routes.get(&route.key).map(|r| r.status);
        if current.is_some_and(RouteStatus::is_active) {
            return Err(RegistryError::conflict(format!("route `{}` is already published", route.key)));
        }
        let previous = self.routes.remove(&route.key).map(|(_, r)| r);
        self.routes
            .insert(route.key.clone(), PublishedRoute::started(route.clone()));
        match Self::rebuild(&self.routes) {
            Ok(rebuilt) => *router = rebuilt,
            Err(e) => {
                self.routes.remove(&route.key);
                if let Some(prev) = previous {
                    self.routes.insert(route.key.clone(), prev);
                }
                return Err(RegistryError::conflict(e));
            }
        }
        info!(
            route = %route.key,
            method = %route.method,
            path = %route.full_path(),
            policies = route.policies.len(),
            "route published"
        );
        Ok(())
    }

    fn remove(&self, key: &RouteKey) -> RegistryResult<()> {
        let mut router = self.router.write();
        if self.routes.remove(key).is_none() {
            return Err(RegistryError::not_found("route", key));
        }
        // dropping a path never introduces a conflict
        if let Ok(rebuilt) = Self::rebuild(&self.routes) {
            *router = rebuilt;
        }
        info!(route = %key, "route removed");
        Ok(())
    }

    fn suspend(&self, key: &RouteKey) -> RegistryResult<()> {
        self.transition(key, |route| {
            route.status = RouteStatus::Suspended;
            route.started_at = None;
        })
    }

    fn resume(&self, key: &RouteKey) -> RegistryResult<()> {
        self.transition(key, |route| {
            if route.status != RouteStatus::Started {
                route.status = RouteStatus::Started;
                route.started_at = Some(Instant::now());
            }
        })
    }

    fn status(&self, key: &RouteKey) -> RouteStatus {
        self.routes
            .get(key)
            .map(|r| r.status)
            .unwrap_or(RouteStatus::NotPublished)
    }

    fn metrics(&self, key: &RouteKey) -> Option<RouteMetrics> {
        self.routes.get(key).map(|r| r.metrics())
    }
}
