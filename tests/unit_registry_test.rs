use hivelink::core::host::HostInfo;
use hivelink::core::ids;
use hivelink::core::registry::{MinionRegistry, TagSelector};
use hivelink::core::store::CommandStore;
use indexmap::IndexMap;
use std::sync::Arc;

async fn registry() -> MinionRegistry {
    let store = CommandStore::open_in_memory().await.unwrap();
    MinionRegistry::new(Arc::new(store), 100)
}

fn host(id: &str, tag_pairs: &[(&str, &str)]) -> HostInfo {
    HostInfo {
        id: id.to_string(),
        hostname: format!("host-{id}"),
        ip: "127.0.0.1".to_string(),
        os: "linux".to_string(),
        last_seen: 0,
        tags: tag_pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[tokio::test]
async fn test_register_assigns_fresh_id_when_empty() {
    let registry = registry().await;
    let outcome = registry.register(host("", &[])).await.unwrap();

    assert!(ids::is_well_formed(&outcome.assigned_id));
    let conn = registry.get(&outcome.assigned_id).unwrap();
    assert_eq!(conn.info.id, outcome.assigned_id);
    assert!(conn.info.tags.is_empty());
}

#[tokio::test]
async fn test_register_keeps_provided_id() {
    let registry = registry().await;
    let outcome = registry.register(host("m1", &[])).await.unwrap();
    assert_eq!(outcome.assigned_id, "m1");
    assert!(registry.contains("m1"));
}

#[tokio::test]
async fn test_reregistration_preserves_command_channel() {
    let registry = registry().await;
    registry.register(host("m1", &[])).await.unwrap();

    // Queue a command, then re-register the same minion.
    let sender = registry.command_sender("m1").unwrap();
    sender
        .send(hivelink::core::commands::CommandSpec {
            id: "c1".to_string(),
            kind: Default::default(),
            payload: "echo hi".to_string(),
        })
        .await
        .unwrap();

    registry
        .register(host("m1", &[("env", "prod")]))
        .await
        .unwrap();

    // The queued command survived and the info was updated in place.
    let channel = registry.command_channel("m1").unwrap();
    let mut rx = channel.try_lock_owned().unwrap();
    let queued = rx.try_recv().unwrap();
    assert_eq!(queued.id, "c1");
    assert_eq!(
        registry.get("m1").unwrap().info.tags.get("env"),
        Some(&"prod".to_string())
    );
}

#[tokio::test]
async fn test_register_persists_host_row() {
    let store = Arc::new(CommandStore::open_in_memory().await.unwrap());
    let registry = MinionRegistry::new(store.clone(), 100);

    registry
        .register(host("m1", &[("env", "prod")]))
        .await
        .unwrap();

    let persisted = store.get_host("m1").await.unwrap().unwrap();
    assert_eq!(persisted.hostname, "host-m1");
    assert_eq!(persisted.tags.get("env"), Some(&"prod".to_string()));
}

#[tokio::test]
async fn test_list_returns_defensive_copies() {
    let registry = registry().await;
    registry.register(host("m1", &[])).await.unwrap();
    registry.register(host("m2", &[])).await.unwrap();

    let mut listed = registry.list();
    listed.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, "m1");
    assert_eq!(listed[1].id, "m2");
}

#[tokio::test]
async fn test_find_targets_by_explicit_ids() {
    let registry = registry().await;
    registry.register(host("m1", &[])).await.unwrap();
    registry.register(host("m2", &[])).await.unwrap();

    // Input order kept, duplicates dropped, unknown ids filtered out.
    let targets = registry.find_targets(
        &[
            "m2".to_string(),
            "ghost".to_string(),
            "m1".to_string(),
            "m2".to_string(),
        ],
        &TagSelector::all(),
    );
    assert_eq!(targets, vec!["m2".to_string(), "m1".to_string()]);
}

#[tokio::test]
async fn test_find_targets_by_selector() {
    let registry = registry().await;
    registry.register(host("a", &[("env", "prod")])).await.unwrap();
    registry
        .register(host("b", &[("env", "staging")]))
        .await
        .unwrap();
    registry
        .register(host("c", &[("env", "prod"), ("role", "db")]))
        .await
        .unwrap();

    let selector = TagSelector::all().equals("env", "prod").exists("role");
    let targets = registry.find_targets(&[], &selector);
    assert_eq!(targets, vec!["c".to_string()]);

    // The empty selector targets every minion.
    let mut all = registry.find_targets(&[], &TagSelector::all());
    all.sort();
    assert_eq!(all, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_set_tags_overrides_provided_keys_and_keeps_others() {
    let registry = registry().await;
    registry
        .register(host("m1", &[("env", "prod"), ("role", "db")]))
        .await
        .unwrap();

    let mut new_tags = IndexMap::new();
    new_tags.insert("env".to_string(), "staging".to_string());
    new_tags.insert("zone".to_string(), "eu-1".to_string());
    let updated = registry.set_tags("m1", new_tags).await.unwrap();

    assert_eq!(updated.tags.get("env"), Some(&"staging".to_string()));
    assert_eq!(updated.tags.get("zone"), Some(&"eu-1".to_string()));
    // Unmentioned keys survive.
    assert_eq!(updated.tags.get("role"), Some(&"db".to_string()));
}

#[tokio::test]
async fn test_set_tags_unknown_minion_is_not_found() {
    let registry = registry().await;
    let err = registry.set_tags("ghost", IndexMap::new()).await.unwrap_err();
    assert!(matches!(err, hivelink::core::HiveLinkError::NotFound(_)));
}

#[tokio::test]
async fn test_update_tags_adds_and_removes() {
    let registry = registry().await;
    registry
        .register(host("m1", &[("env", "prod"), ("role", "db")]))
        .await
        .unwrap();

    let mut add = IndexMap::new();
    add.insert("zone".to_string(), "eu-1".to_string());
    // Removing a missing key is a no-op.
    let updated = registry
        .update_tags("m1", add, &["role".to_string(), "missing".to_string()])
        .await
        .unwrap();

    assert_eq!(updated.tags.get("zone"), Some(&"eu-1".to_string()));
    assert_eq!(updated.tags.get("env"), Some(&"prod".to_string()));
    assert!(updated.tags.get("role").is_none());
}

#[tokio::test]
async fn test_update_tags_unknown_minion_is_not_found() {
    let registry = registry().await;
    let err = registry
        .update_tags("ghost", IndexMap::new(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, hivelink::core::HiveLinkError::NotFound(_)));
}

#[tokio::test]
async fn test_list_tags_flattens_pairs() {
    let registry = registry().await;
    registry.register(host("a", &[("env", "prod")])).await.unwrap();
    registry
        .register(host("b", &[("env", "prod"), ("role", "db")]))
        .await
        .unwrap();

    let tags = registry.list_tags();
    assert_eq!(tags, vec!["env:prod".to_string(), "role:db".to_string()]);
}
