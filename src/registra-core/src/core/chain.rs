use crate::core::registry::{APPLIED, POLICIES};
use crate::core::{Registry, WriteBatch};
use crate::error::{RegistryError, RegistryResult};
use crate::ids::{PolicyId, ResourceId};
use crate::models::{
    AppliedPolicy, ChainLink, Metadata, Params, Policy, merge_meta, remove_meta, replace_meta,
};
use tracing::{debug, info, warn};

/// Execution order of a chain: ascending `order`, ties by first application.
pub(crate) fn sort_chain(joins: &mut [AppliedPolicy]) {
    joins.sort_by(|a, b| a.order.cmp(&b.order).then(a.seq.cmp(&b.seq)));
}

impl Registry {
    // ---------- policy catalog ----------

    pub fn add_policy(&self, policy: Policy) -> RegistryResult<Policy> {
        if policy.class_name.trim().is_empty() {
            return Err(RegistryError::validation("policy class name must not be empty"));
        }
        let _guard = self.txn.write();
        let mut record = policy;
        record.id = PolicyId::from_uuid(self.next_uuid());
        record.seq = self.next_seq();

        let mut batch = WriteBatch::new();
        batch.put(POLICIES, record.id.to_string(), &record)?;
        self.store.commit(batch)?;
        info!(policy_id = %record.id, class_name = %record.class_name, "policy added");
        Ok(record)
    }

    /// Overwrite class name and description of an existing policy.
    pub fn update_policy(&self, policy: &Policy) -> RegistryResult<bool> {
        self.mutate_policy(policy.id, |record| {
            if policy.class_name.trim().is_empty() {
                return Err(RegistryError::validation("policy class name must not be empty"));
            }
            record.class_name = policy.class_name.clone();
            record.description = policy.description.clone();
            Ok(true)
        })
    }

    /// Remove a catalog entry and retract every application of it in the
    /// same commit.
    pub fn delete_policy(&self, id: PolicyId) -> RegistryResult<bool> {
        let _guard = self.txn.write();
        if self.load_policy(id)?.is_none() {
            return Ok(false);
        }
        let joins = self
            .store
            .filter(APPLIED, |j: &AppliedPolicy| j.policy_id == id)?;
        let mut batch = WriteBatch::new();
        batch.delete(POLICIES, id.to_string());
        for join in &joins {
            batch.delete(APPLIED, AppliedPolicy::key(join.resource_id, join.policy_id));
        }
        self.store.commit(batch)?;
        info!(policy_id = %id, retracted = joins.len(), "policy deleted");
        Ok(true)
    }

    pub fn get_policy(&self, id: PolicyId) -> RegistryResult<Option<Policy>> {
        let _guard = self.txn.read();
        self.load_policy(id)
    }

    pub fn list_policies(&self) -> RegistryResult<Vec<Policy>> {
        let _guard = self.txn.read();
        let mut policies: Vec<Policy> = self.store.all(POLICIES)?;
        policies.sort_by_key(|p| p.seq);
        Ok(policies)
    }

    /// Look a policy up by its behaviour reference; the oldest entry wins.
    pub fn find_policy(&self, class_name: &str) -> RegistryResult<Option<Policy>> {
        Ok(self
            .list_policies()?
            .into_iter()
            .find(|p| p.class_name == class_name))
    }

    // ---------- policy metadata ----------

    pub fn add_policy_meta(&self, id: PolicyId, entries: Metadata) -> RegistryResult<bool> {
        self.mutate_policy(id, |record| {
            merge_meta(&mut record.metadata, entries);
            Ok(true)
        })
    }

    pub fn update_policy_meta(&self, id: PolicyId, entries: Metadata) -> RegistryResult<bool> {
        self.mutate_policy(id, |record| {
            replace_meta(&mut record.metadata, entries);
            Ok(true)
        })
    }

    pub fn delete_policy_meta(&self, id: PolicyId, key: &str) -> RegistryResult<bool> {
        self.mutate_policy(id, |record| Ok(remove_meta(&mut record.metadata, key)))
    }

    pub fn policy_meta(&self, id: PolicyId) -> RegistryResult<Option<Metadata>> {
        Ok(self.get_policy(id)?.map(|p| p.metadata))
    }

    // ---------- policy chain ----------

    /// Create or update the `(resource, policy)` join. Re-applying a pair
    /// replaces its order and params and keeps its original tie-break position.
    pub fn apply_policy(
        &self,
        resource_id: ResourceId,
        policy_id: PolicyId,
        order: i32,
        params: Params,
    ) -> RegistryResult<AppliedPolicy> {
        let _guard = self.txn.write();
        if self.load_resource(resource_id)?.is_none() {
            return Err(RegistryError::not_found("resource", resource_id));
        }
        if self.load_policy(policy_id)?.is_none() {
            return Err(RegistryError::not_found("policy", policy_id));
        }
        let key = AppliedPolicy::key(resource_id, policy_id);
        let previous = self.store.get::<AppliedPolicy>(APPLIED, &key)?;
        let seq = match &previous {
            Some(join) => join.seq,
            None => self.next_seq(),
        };
        let join = AppliedPolicy {
            resource_id,
            policy_id,
            order,
            params,
            seq,
        };
        let mut batch = WriteBatch::new();
        batch.put(APPLIED, key, &join)?;
        self.store.commit(batch)?;
        info!(
            resource_id = %resource_id,
            policy_id = %policy_id,
            order,
            replaced = previous.is_some(),
            "policy applied"
        );
        Ok(join)
    }

    pub fn unapply_policy(&self, resource_id: ResourceId, policy_id: PolicyId) -> RegistryResult<bool> {
        let _guard = self.txn.write();
        let key = AppliedPolicy::key(resource_id, policy_id);
        if !self.store.exists(APPLIED, &key)? {
            debug!(resource_id = %resource_id, policy_id = %policy_id, "policy not applied, nothing to retract");
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        batch.delete(APPLIED, key);
        self.store.commit(batch)?;
        info!(resource_id = %resource_id, policy_id = %policy_id, "policy unapplied");
        Ok(true)
    }

    /// Policies applied to a resource, in execution order.
    pub fn list_applied_policies(&self, resource_id: ResourceId) -> RegistryResult<Vec<Policy>> {
        Ok(self
            .policy_chain(resource_id)?
            .into_iter()
            .map(|link| link.policy)
            .collect())
    }

    pub fn policy_chain(&self, resource_id: ResourceId) -> RegistryResult<Vec<ChainLink>> {
        let _guard = self.txn.read();
        self.load_chain(resource_id)
    }

    pub(crate) fn load_chain(&self, resource_id: ResourceId) -> RegistryResult<Vec<ChainLink>> {
        let mut joins = self
            .store
            .filter(APPLIED, |j: &AppliedPolicy| j.resource_id == resource_id)?;
        sort_chain(&mut joins);
        let mut chain = Vec::with_capacity(joins.len());
        for join in joins {
            match self.load_policy(join.policy_id)? {
                Some(policy) => chain.push(ChainLink {
                    order: join.order,
                    params: join.params,
                    policy,
                }),
                None => warn!(policy_id = %join.policy_id, "applied policy missing from catalog, skipped"),
            }
        }
        Ok(chain)
    }

    fn mutate_policy<F>(&self, id: PolicyId, f: F) -> RegistryResult<bool>
    where
        F: FnOnce(&mut Policy) -> RegistryResult<bool>,
    {
        let _guard = self.txn.write();
        let Some(mut record) = self.load_policy(id)? else {
            return Ok(false);
        };
        if !f(&mut record)? {
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        batch.put(POLICIES, id.to_string(), &record)?;
        self.store.commit(batch)?;
        info!(policy_id = %id, "policy updated");
        Ok(true)
    }
}
