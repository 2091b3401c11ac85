use hivelink::core::HiveLinkError;
use hivelink::core::commands::{CommandResult, CommandStatus};
use hivelink::core::host::HostInfo;
use hivelink::core::store::{CommandDirection, CommandStore};
use indexmap::IndexMap;
use tokio_test::assert_ok;

fn host(id: &str) -> HostInfo {
    HostInfo {
        id: id.to_string(),
        hostname: "worker-1".to_string(),
        ip: "10.0.0.7".to_string(),
        os: "linux".to_string(),
        last_seen: 0,
        tags: IndexMap::new(),
    }
}

fn result(command_id: &str, minion_id: &str, timestamp: i64) -> CommandResult {
    CommandResult {
        command_id: command_id.to_string(),
        minion_id: minion_id.to_string(),
        exit_code: 0,
        stdout: "hi\n".to_string(),
        stderr: String::new(),
        timestamp,
    }
}

#[tokio::test]
async fn test_upsert_host_roundtrip() {
    let store = CommandStore::open_in_memory().await.unwrap();

    let mut info = host("m1");
    info.tags
        .insert("env".to_string(), "prod".to_string());
    assert_ok!(store.upsert_host(&info).await);

    let loaded = store.get_host("m1").await.unwrap().unwrap();
    assert_eq!(loaded.hostname, "worker-1");
    assert_eq!(loaded.tags.get("env"), Some(&"prod".to_string()));
}

#[tokio::test]
async fn test_upsert_host_updates_in_place() {
    let store = CommandStore::open_in_memory().await.unwrap();
    store.upsert_host(&host("m1")).await.unwrap();

    let mut updated = host("m1");
    updated.hostname = "worker-renamed".to_string();
    store.upsert_host(&updated).await.unwrap();

    let loaded = store.get_host("m1").await.unwrap().unwrap();
    assert_eq!(loaded.hostname, "worker-renamed");
}

#[tokio::test]
async fn test_get_host_missing_is_none() {
    let store = CommandStore::open_in_memory().await.unwrap();
    assert!(store.get_host("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_command_and_status_flow() {
    let store = CommandStore::open_in_memory().await.unwrap();
    store
        .insert_command("c1", "m1", "echo hi", CommandDirection::Outbound)
        .await
        .unwrap();

    let record = store.get_command("c1", "m1").await.unwrap().unwrap();
    assert_eq!(record.status, CommandStatus::Pending);
    assert_eq!(record.direction, CommandDirection::Outbound);
    assert_eq!(record.command, "echo hi");

    store
        .update_command_status("c1", "m1", CommandStatus::Executing)
        .await
        .unwrap();
    let record = store.get_command("c1", "m1").await.unwrap().unwrap();
    assert_eq!(record.status, CommandStatus::Executing);
}

#[tokio::test]
async fn test_insert_command_is_idempotent() {
    let store = CommandStore::open_in_memory().await.unwrap();
    store
        .insert_command("c1", "m1", "echo hi", CommandDirection::Outbound)
        .await
        .unwrap();
    store
        .insert_command("c1", "m1", "echo hi", CommandDirection::Outbound)
        .await
        .unwrap();

    assert!(store.get_command("c1", "m1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_status_unknown_command_is_not_found() {
    let store = CommandStore::open_in_memory().await.unwrap();
    let err = store
        .update_command_status("ghost", "m1", CommandStatus::Received)
        .await
        .unwrap_err();
    assert!(matches!(err, HiveLinkError::NotFound(_)));
}

#[tokio::test]
async fn test_store_result_completes_command() {
    let store = CommandStore::open_in_memory().await.unwrap();
    store
        .insert_command("c1", "m1", "echo hi", CommandDirection::Outbound)
        .await
        .unwrap();

    store.store_result(&result("c1", "m1", 100)).await.unwrap();

    let results = store.get_results("c1").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].stdout, "hi\n");

    let record = store.get_command("c1", "m1").await.unwrap().unwrap();
    assert_eq!(record.status, CommandStatus::Completed);
}

#[tokio::test]
async fn test_store_result_is_idempotent() {
    let store = CommandStore::open_in_memory().await.unwrap();
    store
        .insert_command("c1", "m1", "echo hi", CommandDirection::Outbound)
        .await
        .unwrap();

    // Replaying the same result must commit without a second row.
    store.store_result(&result("c1", "m1", 100)).await.unwrap();
    store.store_result(&result("c1", "m1", 100)).await.unwrap();

    let results = store.get_results("c1").await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_store_result_without_command_row_still_persists() {
    let store = CommandStore::open_in_memory().await.unwrap();

    // The result may precede the command insert; it is kept regardless.
    store
        .store_result(&result("orphan", "m1", 100))
        .await
        .unwrap();

    let results = store.get_results("orphan").await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_get_results_ordered_by_timestamp() {
    let store = CommandStore::open_in_memory().await.unwrap();

    store.store_result(&result("c1", "m2", 200)).await.unwrap();
    store.store_result(&result("c1", "m1", 100)).await.unwrap();
    store.store_result(&result("c1", "m3", 300)).await.unwrap();

    let results = store.get_results("c1").await.unwrap();
    let order: Vec<i64> = results.iter().map(|r| r.timestamp).collect();
    assert_eq!(order, vec![100, 200, 300]);
}

#[tokio::test]
async fn test_get_results_empty_is_not_an_error() {
    let store = CommandStore::open_in_memory().await.unwrap();
    assert!(store.get_results("nothing").await.unwrap().is_empty());
}
