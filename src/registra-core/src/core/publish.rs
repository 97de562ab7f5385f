use crate::core::Registry;
use crate::error::{RegistryError, RegistryResult};
use crate::ids::ApiId;
use crate::models::{ApiView, ResourceView, RouteKey, RouteSpec};
use tracing::{debug, info, warn};

impl Registry {
    /// The API with its resources and each resource's ordered policy chain.
    pub fn assemble(&self, api_id: ApiId) -> RegistryResult<Option<ApiView>> {
        let _guard = self.txn.read();
        let Some(api) = self.load_api(api_id)? else {
            return Ok(None);
        };
        let mut resources = Vec::new();
        for resource in self.load_resources(api_id)? {
            let chain = self.load_chain(resource.id)?;
            resources.push(ResourceView { resource, chain });
        }
        debug!(api_id = %api_id, resources = resources.len(), "api view assembled");
        Ok(Some(ApiView { api, resources }))
    }

    /// One route per resource, in resource insertion order.
    pub fn routes(&self, api_id: ApiId) -> RegistryResult<Vec<RouteSpec>> {
        let view = self
            .assemble(api_id)?
            .ok_or_else(|| RegistryError::not_found("api", api_id))?;
        Ok(view
            .resources
            .iter()
            .map(|rv| RouteSpec::from_view(&view.api, rv))
            .collect())
    }

    /// Push every route of the API to the publisher. Stops at the first
    /// publisher error; routes published before it stay live.
    pub fn publish_api(&self, api_id: ApiId) -> RegistryResult<Vec<RouteKey>> {
        let routes = self.routes(api_id)?;
        let mut keys = Vec::with_capacity(routes.len());
        for route in &routes {
            self.publisher.publish(route)?;
            keys.push(route.key.clone());
        }
        info!(api_id = %api_id, routes = keys.len(), "api published");
        Ok(keys)
    }

    /// Publish every registered API, skipping routes that are already live.
    pub fn publish_all(&self) -> RegistryResult<Vec<RouteKey>> {
        let mut keys = Vec::new();
        for api in self.list_apis()? {
            for route in self.routes(api.id)? {
                if self.publisher.status(&route.key).is_active() {
                    debug!(route = %route.key, "route already active");
                    continue;
                }
                match self.publisher.publish(&route) {
                    Ok(()) => keys.push(route.key),
                    Err(e) => warn!(route = %route.key, kind = e.kind(), "publish failed: {e}"),
                }
            }
        }
        Ok(keys)
    }

    /// Remove every live route of the API; returns how many were removed.
    pub fn unpublish_api(&self, api_id: ApiId) -> RegistryResult<usize> {
        let mut removed = 0;
        for route in self.routes(api_id)? {
            match self.publisher.remove(&route.key) {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        info!(api_id = %api_id, removed, "api unpublished");
        Ok(removed)
    }
}
