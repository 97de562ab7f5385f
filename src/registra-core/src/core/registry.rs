use crate::core::{Storage, WriteBatch};
use crate::error::{RegistryError, RegistryResult};
use crate::ids::{ApiId, IdGenerator, PolicyId, RandomIds, ResourceId};
use crate::models::{
    Api, AppliedPolicy, Metadata, Policy, Resource, RouteKey, merge_meta, remove_meta, replace_meta,
};
use crate::publisher::GatewayPublisher;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub const APIS: &str = "apis";
pub const RESOURCES: &str = "resources";
pub const POLICIES: &str = "policies";
pub const APPLIED: &str = "applied";

/// The registry service: APIs, their resources, the policy catalog and the
/// policy chains binding them.
///
/// Every mutator holds the writer side of `txn` and commits one
/// [`WriteBatch`], so readers see an operation either entirely or not at all.
/// The gateway publisher is only called after the lock is released.
pub struct Registry {
    pub(crate) store: Arc<dyn Storage>,
    pub(crate) publisher: Arc<dyn GatewayPublisher>,
    ids: Arc<dyn IdGenerator>,
    seq: AtomicU64,
    pub(crate) txn: RwLock<()>,
}

#[derive(Deserialize)]
struct SeqOnly {
    #[serde(default)]
    seq: u64,
}

impl Registry {
    /// Build a registry over an existing store; the insertion counter resumes
    /// after the highest persisted sequence.
    pub fn new(store: Arc<dyn Storage>, publisher: Arc<dyn GatewayPublisher>) -> RegistryResult<Self> {
        let mut last = 0;
        for table in [APIS, RESOURCES, POLICIES, APPLIED] {
            for row in store.all::<SeqOnly>(table)? {
                last = last.max(row.seq);
            }
        }
        debug!(last_seq = last, "registry opened");
        Ok(Self {
            store,
            publisher,
            ids: Arc::new(RandomIds),
            seq: AtomicU64::new(last),
            txn: RwLock::new(()),
        })
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn publisher(&self) -> &Arc<dyn GatewayPublisher> {
        &self.publisher
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_uuid(&self) -> uuid::Uuid {
        self.ids.next_id()
    }

    // ---------- APIs ----------

    pub fn add_api(&self, api: Api) -> RegistryResult<Api> {
        if api.name.trim().is_empty() {
            return Err(RegistryError::validation("api name must not be empty"));
        }
        let _guard = self.txn.write();
        let mut record = api;
        record.id = ApiId::from_uuid(self.next_uuid());
        record.resources.clear();
        record.seq = self.next_seq();

        let mut batch = WriteBatch::new();
        batch.put(APIS, record.id.to_string(), &record)?;
        self.store.commit(batch)?;
        info!(api_id = %record.id, name = %record.name, "api added");
        Ok(record)
    }

    /// Overwrite name, context, description, version and mocked. Returns
    /// `false` when the id is unknown; a blank name on a known API is a
    /// `Validation` error.
    pub fn update_api(&self, api: &Api) -> RegistryResult<bool> {
        self.mutate_api(api.id, |record| {
            if api.name.trim().is_empty() {
                return Err(RegistryError::validation("api name must not be empty"));
            }
            record.apply_update(api);
            Ok(true)
        })
    }

    /// Remove the API together with its resources and their policy joins.
    pub fn delete_api(&self, id: ApiId) -> RegistryResult<bool> {
        let removed = {
            let _guard = self.txn.write();
            if !self.store.exists(APIS, &id.to_string())? {
                debug!(api_id = %id, "delete of unknown api ignored");
                return Ok(false);
            }
            let resources = self.load_resources(id)?;
            let mut batch = WriteBatch::new();
            batch.delete(APIS, id.to_string());
            for resource in &resources {
                self.stage_resource_delete(&mut batch, resource.id)?;
            }
            self.store.commit(batch)?;
            info!(api_id = %id, resources = resources.len(), "api deleted");
            resources
        };
        for resource in removed {
            self.retire_route(&RouteKey::new(id, resource.id));
        }
        Ok(true)
    }

    pub fn get_api(&self, id: ApiId) -> RegistryResult<Option<Api>> {
        let _guard = self.txn.read();
        self.load_api(id)
    }

    pub fn list_apis(&self) -> RegistryResult<Vec<Api>> {
        let _guard = self.txn.read();
        let mut apis: Vec<Api> = self.store.all(APIS)?;
        apis.sort_by_key(|a| a.seq);
        let mut resources: Vec<Resource> = self.store.all(RESOURCES)?;
        resources.sort_by_key(|r| r.seq);
        for api in &mut apis {
            api.resources = resources
                .iter()
                .filter(|r| r.api_id == api.id)
                .map(|r| r.id)
                .collect();
        }
        Ok(apis)
    }

    pub fn set_definition(&self, id: ApiId, definition: Vec<u8>) -> RegistryResult<bool> {
        self.mutate_api(id, |record| {
            record.definition = Some(definition);
            Ok(true)
        })
    }

    pub fn definition(&self, id: ApiId) -> RegistryResult<Option<Vec<u8>>> {
        Ok(self.get_api(id)?.and_then(|api| api.definition))
    }

    // ---------- API metadata ----------

    pub fn add_api_meta(&self, id: ApiId, entries: Metadata) -> RegistryResult<bool> {
        self.mutate_api(id, |record| {
            merge_meta(&mut record.metadata, entries);
            Ok(true)
        })
    }

    pub fn update_api_meta(&self, id: ApiId, entries: Metadata) -> RegistryResult<bool> {
        self.mutate_api(id, |record| {
            replace_meta(&mut record.metadata, entries);
            Ok(true)
        })
    }

    pub fn delete_api_meta(&self, id: ApiId, key: &str) -> RegistryResult<bool> {
        self.mutate_api(id, |record| Ok(remove_meta(&mut record.metadata, key)))
    }

    pub fn api_meta(&self, id: ApiId) -> RegistryResult<Option<Metadata>> {
        Ok(self.get_api(id)?.map(|api| api.metadata))
    }

    // ---------- Resources ----------

    pub fn add_resource(&self, api_id: ApiId, resource: Resource) -> RegistryResult<Resource> {
        let _guard = self.txn.write();
        if !self.store.exists(APIS, &api_id.to_string())? {
            return Err(RegistryError::not_found("api", api_id));
        }
        let mut record = resource;
        record.id = ResourceId::from_uuid(self.next_uuid());
        record.api_id = api_id;
        record.seq = self.next_seq();

        let mut batch = WriteBatch::new();
        batch.put(RESOURCES, record.id.to_string(), &record)?;
        self.store.commit(batch)?;
        info!(
            api_id = %api_id,
            resource_id = %record.id,
            method = %record.method,
            path = %record.path,
            "resource added"
        );
        Ok(record)
    }

    /// Overwrite a resource's fields when it belongs to `api_id`.
    pub fn update_resource(&self, api_id: ApiId, resource: &Resource) -> RegistryResult<bool> {
        let _guard = self.txn.write();
        let Some(mut record) = self.load_resource(resource.id)? else {
            return Ok(false);
        };
        if record.api_id != api_id {
            return Ok(false);
        }
        record.apply_update(resource);
        let mut batch = WriteBatch::new();
        batch.put(RESOURCES, record.id.to_string(), &record)?;
        self.store.commit(batch)?;
        info!(resource_id = %record.id, "resource updated");
        Ok(true)
    }

    /// Remove a resource and its policy joins, only if `api_id` owns it.
    pub fn delete_resource(&self, api_id: ApiId, resource_id: ResourceId) -> RegistryResult<bool> {
        {
            let _guard = self.txn.write();
            match self.load_resource(resource_id)? {
                Some(record) if record.api_id == api_id => {}
                Some(_) => {
                    warn!(api_id = %api_id, resource_id = %resource_id, "resource owned by another api, not deleted");
                    return Ok(false);
                }
                None => return Ok(false),
            }
            let mut batch = WriteBatch::new();
            self.stage_resource_delete(&mut batch, resource_id)?;
            self.store.commit(batch)?;
            info!(api_id = %api_id, resource_id = %resource_id, "resource deleted");
        }
        self.retire_route(&RouteKey::new(api_id, resource_id));
        Ok(true)
    }

    pub fn get_resource(&self, id: ResourceId) -> RegistryResult<Option<Resource>> {
        let _guard = self.txn.read();
        self.load_resource(id)
    }

    pub fn list_resources(&self, api_id: ApiId) -> RegistryResult<Vec<Resource>> {
        let _guard = self.txn.read();
        self.load_resources(api_id)
    }

    // ---------- lock-free helpers; callers hold `txn` ----------

    pub(crate) fn load_api(&self, id: ApiId) -> RegistryResult<Option<Api>> {
        let Some(mut api) = self.store.get::<Api>(APIS, &id.to_string())? else {
            return Ok(None);
        };
        api.resources = self.load_resources(id)?.into_iter().map(|r| r.id).collect();
        Ok(Some(api))
    }

    pub(crate) fn load_resource(&self, id: ResourceId) -> RegistryResult<Option<Resource>> {
        Ok(self.store.get(RESOURCES, &id.to_string())?)
    }

    pub(crate) fn load_resources(&self, api_id: ApiId) -> RegistryResult<Vec<Resource>> {
        let mut resources = self
            .store
            .filter(RESOURCES, |r: &Resource| r.api_id == api_id)?;
        resources.sort_by_key(|r| r.seq);
        Ok(resources)
    }

    pub(crate) fn load_policy(&self, id: PolicyId) -> RegistryResult<Option<Policy>> {
        Ok(self.store.get(POLICIES, &id.to_string())?)
    }

    fn stage_resource_delete(&self, batch: &mut WriteBatch, resource_id: ResourceId) -> RegistryResult<()> {
        batch.delete(RESOURCES, resource_id.to_string());
        let joins = self
            .store
            .filter(APPLIED, |j: &AppliedPolicy| j.resource_id == resource_id)?;
        for join in joins {
            batch.delete(APPLIED, AppliedPolicy::key(join.resource_id, join.policy_id));
        }
        Ok(())
    }

    /// Load, modify and write back one API record. `f` reports whether it
    /// changed anything; nothing is written when it did not.
    fn mutate_api<F>(&self, id: ApiId, f: F) -> RegistryResult<bool>
    where
        F: FnOnce(&mut Api) -> RegistryResult<bool>,
    {
        let _guard = self.txn.write();
        let Some(mut record) = self.store.get::<Api>(APIS, &id.to_string())? else {
            debug!(api_id = %id, "api not found, nothing changed");
            return Ok(false);
        };
        if !f(&mut record)? {
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        batch.put(APIS, id.to_string(), &record)?;
        self.store.commit(batch)?;
        info!(api_id = %id, "api updated");
        Ok(true)
    }

    /// Drop a route from the gateway after its resource is gone.
    fn retire_route(&self, key: &RouteKey) {
        match self.publisher.remove(key) {
            Ok(()) => info!(route = %key, "route removed"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(route = %key, "route removal failed: {e}"),
        }
    }
}
