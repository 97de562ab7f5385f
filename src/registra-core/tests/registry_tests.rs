use parking_lot::Mutex;
use registra_core::{
    Api, ApiId, GatewayPublisher, Memory, Metadata, NullPublisher, Params, Policy, PolicyId, Registry,
    RegistryError, RegistryResult, Resource, ResourceId, RouteKey, RouteMetrics, RouteSpec, RouteStatus,
    RouteTarget,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<RouteSpec>>,
    removed: Mutex<Vec<RouteKey>>,
}

impl GatewayPublisher for RecordingPublisher {
    fn publish(&self, route: &RouteSpec) -> RegistryResult<()> {
        let mut published = self.published.lock();
        if published.iter().any(|r| r.key == route.key) {
            return Err(RegistryError::conflict(route.key.to_string()));
        }
        published.push(route.clone());
        Ok(())
    }

    fn remove(&self, key: &RouteKey) -> RegistryResult<()> {
        let mut published = self.published.lock();
        let before = published.len();
        published.retain(|r| &r.key != key);
        if published.len() == before {
            return Err(RegistryError::not_found("route", key));
        }
        self.removed.lock().push(key.clone());
        Ok(())
    }

    fn suspend(&self, _key: &RouteKey) -> RegistryResult<()> {
        Ok(())
    }

    fn resume(&self, _key: &RouteKey) -> RegistryResult<()> {
        Ok(())
    }

    fn status(&self, key: &RouteKey) -> RouteStatus {
        if self.published.lock().iter().any(|r| &r.key == key) {
            RouteStatus::Started
        } else {
            RouteStatus::NotPublished
        }
    }

    fn metrics(&self, _key: &RouteKey) -> Option<RouteMetrics> {
        None
    }
}

fn registry() -> Registry {
    Registry::new(Arc::new(Memory::memory()), Arc::new(NullPublisher)).unwrap()
}

fn registry_with(publisher: Arc<RecordingPublisher>) -> Registry {
    Registry::new(Arc::new(Memory::memory()), publisher).unwrap()
}

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn add_assigns_id_and_get_returns_same_record() {
    let reg = registry();
    let mut input = Api::new("orders", "/orders").with_version("1.0");
    input.id = ApiId::from_uuid(uuid::Uuid::new_v4());
    input.metadata = meta(&[("owner", "sales")]);

    let added = reg.add_api(input.clone()).unwrap();
    assert_ne!(added.id, input.id);
    assert_ne!(added.id, ApiId::nil());

    let fetched = reg.get_api(added.id).unwrap().expect("api present");
    assert_eq!(fetched, added);
    assert_eq!(fetched.name, "orders");
    assert_eq!(fetched.metadata, meta(&[("owner", "sales")]));
}

#[test]
fn blank_names_are_rejected_without_persisting() {
    let reg = registry();
    let err = reg.add_api(Api::new("  ", "/x")).unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(reg.list_apis().unwrap().is_empty());

    let err = reg.add_policy(Policy::new("")).unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert!(reg.list_policies().unwrap().is_empty());
}

#[test]
fn delete_is_idempotent() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();

    assert!(reg.delete_api(api.id).unwrap());
    assert!(reg.get_api(api.id).unwrap().is_none());
    assert!(!reg.delete_api(api.id).unwrap());

    let never = ApiId::from_uuid(uuid::Uuid::new_v4());
    assert!(!reg.delete_api(never).unwrap());
    assert!(reg.get_api(never).unwrap().is_none());
}

#[test]
fn list_follows_insertion_order() {
    let reg = registry();
    let names = ["zeta", "alpha", "mid", "beta"];
    for name in names {
        reg.add_api(Api::new(name, format!("/{}", name))).unwrap();
    }
    let listed: Vec<String> = reg.list_apis().unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(listed, names);
}

#[test]
fn update_touches_scalar_fields_only() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    reg.add_api_meta(api.id, meta(&[("owner", "sales")])).unwrap();
    reg.set_definition(api.id, b"openapi: 3.0.0".to_vec()).unwrap();
    let resource = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();

    let mut change = Api::new("orders-v2", "/v2/orders")
        .with_version("2.0")
        .with_description("second cut")
        .mocked(true);
    change.id = api.id;
    change.metadata = meta(&[("ignored", "yes")]);
    assert!(reg.update_api(&change).unwrap());

    let fetched = reg.get_api(api.id).unwrap().unwrap();
    assert_eq!(fetched.name, "orders-v2");
    assert_eq!(fetched.context, "/v2/orders");
    assert_eq!(fetched.version, "2.0");
    assert_eq!(fetched.description, "second cut");
    assert!(fetched.mocked);
    assert_eq!(fetched.metadata, meta(&[("owner", "sales")]));
    assert_eq!(fetched.definition.as_deref(), Some(&b"openapi: 3.0.0"[..]));
    assert_eq!(fetched.resources, vec![resource.id]);
}

#[test]
fn update_and_definition_on_unknown_api_are_noops() {
    let reg = registry();
    let mut ghost = Api::new("ghost", "/ghost");
    ghost.id = ApiId::from_uuid(uuid::Uuid::new_v4());
    assert!(!reg.update_api(&ghost).unwrap());
    assert!(!reg.set_definition(ghost.id, vec![1, 2, 3]).unwrap());
    assert!(reg.definition(ghost.id).unwrap().is_none());
    assert!(reg.list_apis().unwrap().is_empty());
}

#[test]
fn blank_name_update_of_unknown_entity_is_noop() {
    let reg = registry();
    let mut ghost = Api::new("", "/ghost");
    ghost.id = ApiId::from_uuid(uuid::Uuid::new_v4());
    assert!(!reg.update_api(&ghost).unwrap());

    let mut ghost_policy = Policy::new("  ");
    ghost_policy.id = PolicyId::from_uuid(uuid::Uuid::new_v4());
    assert!(!reg.update_policy(&ghost_policy).unwrap());
    assert!(reg.list_policies().unwrap().is_empty());
}

#[test]
fn blank_name_update_of_known_entity_is_rejected() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let mut change = api.clone();
    change.name = " ".into();
    assert_eq!(reg.update_api(&change).unwrap_err().kind(), "validation");
    assert_eq!(reg.get_api(api.id).unwrap().unwrap().name, "orders");

    let mut policy = reg.add_policy(Policy::new("RateLimit")).unwrap();
    policy.class_name = String::new();
    assert_eq!(reg.update_policy(&policy).unwrap_err().kind(), "validation");
    assert_eq!(reg.get_policy(policy.id).unwrap().unwrap().class_name, "RateLimit");
}

#[test]
fn definition_is_replaced_opaquely() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    assert!(reg.definition(api.id).unwrap().is_none());
    assert!(reg.set_definition(api.id, vec![0, 159, 146, 150]).unwrap());
    assert!(reg.set_definition(api.id, b"<wsdl/>".to_vec()).unwrap());
    assert_eq!(reg.definition(api.id).unwrap(), Some(b"<wsdl/>".to_vec()));
}

#[test]
fn add_meta_merges_and_keeps_untouched_keys() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    reg.add_api_meta(api.id, meta(&[("owner", "sales"), ("tier", "gold")])).unwrap();
    reg.add_api_meta(api.id, meta(&[("tier", "silver"), ("region", "eu")])).unwrap();

    let got = reg.api_meta(api.id).unwrap().unwrap();
    assert_eq!(got, meta(&[("owner", "sales"), ("tier", "silver"), ("region", "eu")]));
}

#[test]
fn update_meta_replaces_whole_map() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    reg.add_api_meta(api.id, meta(&[("owner", "sales"), ("tier", "gold")])).unwrap();
    let replacement = meta(&[("region", "us")]);
    assert!(reg.update_api_meta(api.id, replacement.clone()).unwrap());
    assert_eq!(reg.api_meta(api.id).unwrap(), Some(replacement));
}

#[test]
fn delete_meta_on_missing_owner_or_key_is_noop() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    reg.add_api_meta(api.id, meta(&[("owner", "sales")])).unwrap();

    assert!(!reg.delete_api_meta(api.id, "absent").unwrap());
    assert!(reg.delete_api_meta(api.id, "owner").unwrap());
    assert_eq!(reg.api_meta(api.id).unwrap(), Some(Metadata::new()));

    let ghost = ApiId::from_uuid(uuid::Uuid::new_v4());
    assert!(!reg.delete_api_meta(ghost, "owner").unwrap());
    assert!(!reg.add_api_meta(ghost, meta(&[("a", "b")])).unwrap());
    assert!(reg.api_meta(ghost).unwrap().is_none());
}

#[test]
fn policy_meta_mirrors_api_meta() {
    let reg = registry();
    let policy = reg.add_policy(Policy::new("RateLimit")).unwrap();
    reg.add_policy_meta(policy.id, meta(&[("scope", "global")])).unwrap();
    reg.add_policy_meta(policy.id, meta(&[("unit", "minute")])).unwrap();
    assert_eq!(
        reg.policy_meta(policy.id).unwrap().unwrap(),
        meta(&[("scope", "global"), ("unit", "minute")])
    );
    reg.update_policy_meta(policy.id, meta(&[("unit", "second")])).unwrap();
    assert!(reg.delete_policy_meta(policy.id, "unit").unwrap());
    assert_eq!(reg.policy_meta(policy.id).unwrap(), Some(Metadata::new()));
    assert!(!reg.add_policy_meta(PolicyId::nil(), meta(&[("a", "b")])).unwrap());
}

#[test]
fn add_resource_requires_existing_api() {
    let reg = registry();
    let ghost = ApiId::from_uuid(uuid::Uuid::new_v4());
    let err = reg.add_resource(ghost, Resource::new("/list", "GET")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn resources_list_in_insertion_order() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let a = reg.add_resource(api.id, Resource::new("/b", "GET")).unwrap();
    let b = reg.add_resource(api.id, Resource::new("/a", "POST")).unwrap();
    let c = reg.add_resource(api.id, Resource::new("/c", "DELETE")).unwrap();
    let ids: Vec<ResourceId> = reg.list_resources(api.id).unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);
    assert_eq!(reg.get_resource(b.id).unwrap().unwrap().api_id, api.id);
}

#[test]
fn delete_resource_from_other_api_is_noop() {
    let reg = registry();
    let owner = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let other = reg.add_api(Api::new("billing", "/billing")).unwrap();
    let resource = reg.add_resource(owner.id, Resource::new("/list", "GET")).unwrap();

    assert!(!reg.delete_resource(other.id, resource.id).unwrap());
    let still: Vec<ResourceId> = reg.list_resources(owner.id).unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(still, vec![resource.id]);

    assert!(reg.delete_resource(owner.id, resource.id).unwrap());
    assert!(reg.list_resources(owner.id).unwrap().is_empty());
    assert!(!reg.delete_resource(owner.id, resource.id).unwrap());
}

#[test]
fn update_resource_checks_ownership() {
    let reg = registry();
    let owner = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let other = reg.add_api(Api::new("billing", "/billing")).unwrap();
    let mut resource = reg.add_resource(owner.id, Resource::new("/list", "GET")).unwrap();

    resource.path = "/all".into();
    resource.api_id = other.id;
    assert!(!reg.update_resource(other.id, &resource).unwrap());
    assert!(reg.update_resource(owner.id, &resource).unwrap());

    let stored = reg.get_resource(resource.id).unwrap().unwrap();
    assert_eq!(stored.path, "/all");
    assert_eq!(stored.api_id, owner.id);
}

#[test]
fn chain_lists_by_ascending_order() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let p1 = reg.add_policy(Policy::new("P1")).unwrap();
    let p2 = reg.add_policy(Policy::new("P2")).unwrap();
    let p3 = reg.add_policy(Policy::new("P3")).unwrap();

    reg.apply_policy(r.id, p3.id, 3, Params::new()).unwrap();
    reg.apply_policy(r.id, p1.id, 1, Params::new()).unwrap();
    reg.apply_policy(r.id, p2.id, 2, Params::new()).unwrap();

    let ids: Vec<PolicyId> = reg.list_applied_policies(r.id).unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![p1.id, p2.id, p3.id]);
}

#[test]
fn reapplying_a_pair_updates_instead_of_duplicating() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let p = reg.add_policy(Policy::new("RateLimit")).unwrap();
    let other = reg.add_policy(Policy::new("Cors")).unwrap();

    reg.apply_policy(r.id, p.id, 1, meta(&[("limit", "10")])).unwrap();
    reg.apply_policy(r.id, other.id, 5, Params::new()).unwrap();
    reg.apply_policy(r.id, p.id, 9, meta(&[("limit", "100")])).unwrap();

    let chain = reg.policy_chain(r.id).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].policy.id, other.id);
    assert_eq!(chain[1].policy.id, p.id);
    assert_eq!(chain[1].order, 9);
    assert_eq!(chain[1].params, meta(&[("limit", "100")]));
}

#[test]
fn equal_orders_keep_both_policies_in_application_order() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let first = reg.add_policy(Policy::new("Auth")).unwrap();
    let second = reg.add_policy(Policy::new("Audit")).unwrap();

    reg.apply_policy(r.id, second.id, 1, Params::new()).unwrap();
    reg.apply_policy(r.id, first.id, 1, Params::new()).unwrap();
    // re-applying keeps the pair's original position among equal orders
    reg.apply_policy(r.id, second.id, 1, meta(&[("v", "2")])).unwrap();

    let ids: Vec<PolicyId> = reg.list_applied_policies(r.id).unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[test]
fn apply_with_missing_side_fails_and_writes_nothing() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let p = reg.add_policy(Policy::new("RateLimit")).unwrap();

    let ghost_resource = ResourceId::from_uuid(uuid::Uuid::new_v4());
    let ghost_policy = PolicyId::from_uuid(uuid::Uuid::new_v4());

    let err = reg.apply_policy(ghost_resource, p.id, 1, Params::new()).unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { entity: "resource", .. }));
    let err = reg.apply_policy(r.id, ghost_policy, 1, Params::new()).unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { entity: "policy", .. }));

    assert!(reg.policy_chain(r.id).unwrap().is_empty());
    assert!(reg.policy_chain(ghost_resource).unwrap().is_empty());
}

#[test]
fn unapply_removes_only_the_pair() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let p = reg.add_policy(Policy::new("RateLimit")).unwrap();
    let q = reg.add_policy(Policy::new("Cors")).unwrap();
    reg.apply_policy(r.id, p.id, 1, Params::new()).unwrap();
    reg.apply_policy(r.id, q.id, 2, Params::new()).unwrap();

    assert!(reg.unapply_policy(r.id, p.id).unwrap());
    assert!(!reg.unapply_policy(r.id, p.id).unwrap());
    let ids: Vec<PolicyId> = reg.list_applied_policies(r.id).unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![q.id]);
    // the catalog entry itself stays
    assert!(reg.get_policy(p.id).unwrap().is_some());
}

#[test]
fn deleting_a_policy_retracts_its_applications() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r1 = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let r2 = reg.add_resource(api.id, Resource::new("/get", "GET")).unwrap();
    let p = reg.add_policy(Policy::new("RateLimit")).unwrap();
    let q = reg.add_policy(Policy::new("Cors")).unwrap();
    reg.apply_policy(r1.id, p.id, 1, Params::new()).unwrap();
    reg.apply_policy(r2.id, p.id, 1, Params::new()).unwrap();
    reg.apply_policy(r2.id, q.id, 2, Params::new()).unwrap();

    assert!(reg.delete_policy(p.id).unwrap());
    assert!(!reg.delete_policy(p.id).unwrap());
    assert!(reg.policy_chain(r1.id).unwrap().is_empty());
    let ids: Vec<PolicyId> = reg.list_applied_policies(r2.id).unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![q.id]);
}

#[test]
fn delete_api_cascades_to_resources_and_joins() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let p = reg.add_policy(Policy::new("RateLimit")).unwrap();
    reg.apply_policy(r.id, p.id, 1, Params::new()).unwrap();

    assert!(reg.delete_api(api.id).unwrap());
    assert!(reg.get_resource(r.id).unwrap().is_none());
    assert!(reg.policy_chain(r.id).unwrap().is_empty());
    assert!(reg.get_policy(p.id).unwrap().is_some());
    // the join is gone, so the policy can be applied to a fresh resource only
    let err = reg.apply_policy(r.id, p.id, 1, Params::new()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn orders_scenario() {
    let reg = registry();
    let a1 = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r1 = reg.add_resource(a1.id, Resource::new("/list", "GET")).unwrap();
    let p1 = reg.add_policy(Policy::new("RateLimit")).unwrap();
    let applied = reg.apply_policy(r1.id, p1.id, 1, meta(&[("limit", "100")])).unwrap();
    assert_eq!(applied.order, 1);

    let policies = reg.list_applied_policies(r1.id).unwrap();
    assert_eq!(policies.iter().map(|p| p.id).collect::<Vec<_>>(), vec![p1.id]);
    let resources = reg.list_resources(a1.id).unwrap();
    assert_eq!(resources.iter().map(|r| r.id).collect::<Vec<_>>(), vec![r1.id]);
}

#[test]
fn concurrent_add_resource_never_collides() {
    let reg = Arc::new(registry());
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let reg = reg.clone();
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        reg.add_resource(api.id, Resource::new(format!("/t{}/r{}", t, i), "GET"))
                            .unwrap()
                            .id
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut created: Vec<ResourceId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    created.sort();
    created.dedup();
    assert_eq!(created.len(), 200);

    let mut listed: Vec<ResourceId> = reg.list_resources(api.id).unwrap().into_iter().map(|r| r.id).collect();
    listed.sort();
    assert_eq!(listed, created);
}

#[test]
fn readers_never_see_half_applied_joins() {
    let reg = Arc::new(registry());
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let policies: Vec<Policy> = (0..20)
        .map(|i| reg.add_policy(Policy::new(format!("P{}", i))).unwrap())
        .collect();

    let writer = {
        let reg = reg.clone();
        let policies = policies.clone();
        thread::spawn(move || {
            for (i, p) in policies.iter().enumerate() {
                reg.apply_policy(r.id, p.id, i as i32, Params::new()).unwrap();
            }
            for p in &policies {
                reg.unapply_policy(r.id, p.id).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let chain = reg.policy_chain(r.id).unwrap();
        let orders: Vec<i32> = chain.iter().map(|l| l.order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);
    }
    writer.join().unwrap();
    assert!(reg.policy_chain(r.id).unwrap().is_empty());
}

#[test]
fn assembled_view_carries_ordered_chains() {
    let reg = registry();
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let list = reg
        .add_resource(api.id, Resource::new("/list", "get").with_response("[]").with_media_type("application/json"))
        .unwrap();
    let create = reg
        .add_resource(api.id, Resource::new("/create", "POST").with_endpoint("http://orders.internal:8080/create"))
        .unwrap();
    let auth = reg.add_policy(Policy::new("ApiKey")).unwrap();
    let limit = reg.add_policy(Policy::new("RateLimit")).unwrap();
    reg.apply_policy(list.id, limit.id, 20, meta(&[("limit", "5")])).unwrap();
    reg.apply_policy(list.id, auth.id, 10, Params::new()).unwrap();

    let view = reg.assemble(api.id).unwrap().unwrap();
    assert_eq!(view.api.id, api.id);
    assert_eq!(view.resources.len(), 2);
    let chain: Vec<&str> = view.resources[0].chain.iter().map(|l| l.policy.class_name.as_str()).collect();
    assert_eq!(chain, vec!["ApiKey", "RateLimit"]);
    assert!(view.resources[1].chain.is_empty());

    let routes = reg.routes(api.id).unwrap();
    assert_eq!(routes[0].key, RouteKey::new(api.id, list.id));
    assert_eq!(routes[0].method, "GET");
    assert_eq!(routes[0].full_path(), "/orders/list");
    assert_eq!(
        routes[0].target,
        RouteTarget::Mock {
            body: "[]".into(),
            media_type: "application/json".into()
        }
    );
    assert_eq!(
        routes[1].target,
        RouteTarget::Proxy {
            endpoint: "http://orders.internal:8080/create".into()
        }
    );
    assert_eq!(routes[0].policies.len(), 2);

    assert!(reg.assemble(ApiId::nil()).unwrap().is_none());
    assert!(reg.routes(ApiId::nil()).unwrap_err().is_not_found());
}

#[test]
fn publish_pushes_routes_and_deletes_retire_them() {
    let publisher = Arc::new(RecordingPublisher::default());
    let reg = registry_with(publisher.clone());
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let r1 = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    let r2 = reg.add_resource(api.id, Resource::new("/get", "GET")).unwrap();

    let keys = reg.publish_api(api.id).unwrap();
    assert_eq!(keys, vec![RouteKey::new(api.id, r1.id), RouteKey::new(api.id, r2.id)]);

    let err = reg.publish_api(api.id).unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert!(reg.publish_all().unwrap().is_empty());

    assert!(reg.delete_resource(api.id, r1.id).unwrap());
    assert_eq!(publisher.removed.lock().clone(), vec![RouteKey::new(api.id, r1.id)]);

    assert!(reg.delete_api(api.id).unwrap());
    assert!(publisher.published.lock().is_empty());
    assert!(reg.publish_api(api.id).unwrap_err().is_not_found());
}

#[test]
fn unpublish_ignores_routes_never_published() {
    let publisher = Arc::new(RecordingPublisher::default());
    let reg = registry_with(publisher.clone());
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    assert_eq!(reg.unpublish_api(api.id).unwrap(), 0);

    reg.publish_api(api.id).unwrap();
    reg.add_resource(api.id, Resource::new("/late", "GET")).unwrap();
    assert_eq!(reg.unpublish_api(api.id).unwrap(), 1);
    assert!(publisher.published.lock().is_empty());
}

#[test]
fn update_policy_keeps_metadata() {
    let reg = registry();
    let mut policy = reg.add_policy(Policy::new("RateLimit").with_description("v1")).unwrap();
    reg.add_policy_meta(policy.id, meta(&[("scope", "global")])).unwrap();
    policy.class_name = "RateLimitV2".into();
    policy.description = "v2".into();
    policy.metadata = BTreeMap::new();
    assert!(reg.update_policy(&policy).unwrap());

    let stored = reg.get_policy(policy.id).unwrap().unwrap();
    assert_eq!(stored.class_name, "RateLimitV2");
    assert_eq!(stored.description, "v2");
    assert_eq!(stored.metadata, meta(&[("scope", "global")]));
    assert_eq!(reg.find_policy("RateLimitV2").unwrap().map(|p| p.id), Some(policy.id));
    assert!(reg.find_policy("RateLimit").unwrap().is_none());
}

struct CountingIds(std::sync::atomic::AtomicU64);

impl registra_core::IdGenerator for CountingIds {
    fn next_id(&self) -> uuid::Uuid {
        let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        uuid::Uuid::from_u128(n as u128)
    }
}

#[test]
fn injected_id_generator_assigns_ids() {
    let reg = registry().with_id_generator(Arc::new(CountingIds(Default::default())));
    let api = reg.add_api(Api::new("orders", "/orders")).unwrap();
    let resource = reg.add_resource(api.id, Resource::new("/list", "GET")).unwrap();
    assert_eq!(api.id.as_uuid(), uuid::Uuid::from_u128(1));
    assert_eq!(resource.id.as_uuid(), uuid::Uuid::from_u128(2));
    assert_eq!(reg.publisher().status(&RouteKey::new(api.id, resource.id)), RouteStatus::NotPublished);
}
