use hivelink::core::HiveLinkError;
use hivelink::core::commands::{CommandKind, CommandRegistry, CommandSpec};
use std::io::Write;
use std::time::Duration;

fn spec(payload: &str) -> CommandSpec {
    CommandSpec {
        id: "c1".to_string(),
        kind: CommandKind::System,
        payload: payload.to_string(),
    }
}

const SHELL_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn test_shell_command_captures_stdout() {
    let registry = CommandRegistry::with_defaults();
    let result = registry.execute("m1", &spec("echo hi"), SHELL_TIMEOUT).await;

    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains("hi"));
    assert_eq!(result.minion_id, "m1");
    assert_eq!(result.command_id, "c1");
}

#[tokio::test]
async fn test_shell_command_captures_stderr_and_exit_code() {
    let registry = CommandRegistry::with_defaults();
    let result = registry
        .execute("m1", &spec("echo oops >&2; exit 3"), SHELL_TIMEOUT)
        .await;

    assert_eq!(result.exit_code, 3);
    assert!(result.stderr.contains("oops"));
}

#[tokio::test]
async fn test_empty_payload_fails_in_shell_handler() {
    let registry = CommandRegistry::with_defaults();
    let result = registry.execute("m1", &spec("   "), SHELL_TIMEOUT).await;

    assert_ne!(result.exit_code, 0);
    assert!(!result.stderr.is_empty());
}

#[tokio::test]
async fn test_shell_timeout_produces_failure() {
    let registry = CommandRegistry::with_defaults();
    let result = registry
        .execute("m1", &spec("sleep 5"), Duration::from_millis(100))
        .await;

    assert_ne!(result.exit_code, 0);
    assert!(result.stderr.contains("timed out"));
}

#[tokio::test]
async fn test_validate_rejects_empty_payload() {
    let registry = CommandRegistry::with_defaults();
    let err = registry.validate_payload("  ").unwrap_err();
    assert!(matches!(err, HiveLinkError::Validation(_)));
}

#[tokio::test]
async fn test_validate_rejects_unknown_structured_command() {
    let registry = CommandRegistry::with_defaults();
    let err = registry.validate_payload("system:nope").unwrap_err();
    match err {
        HiveLinkError::Validation(message) => {
            assert!(message.contains("unknown command"), "message: {message}")
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_validate_accepts_registered_and_shell_payloads() {
    let registry = CommandRegistry::with_defaults();
    registry.validate_payload("system:info").unwrap();
    registry.validate_payload("file:get /etc/hostname").unwrap();
    registry.validate_payload("uname -a").unwrap();
    // A colon in a non-reserved prefix is still a shell payload.
    registry.validate_payload("echo a:b").unwrap();
}

#[tokio::test]
async fn test_system_info_handler() {
    let registry = CommandRegistry::with_defaults();
    let result = registry
        .execute("m1", &spec("system:info"), SHELL_TIMEOUT)
        .await;

    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains("hostname:"));
    assert!(result.stdout.contains("os:"));
}

#[tokio::test]
async fn test_file_get_reads_file() {
    let registry = CommandRegistry::with_defaults();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "payload contents").unwrap();
    let payload = format!("file:get {}", file.path().display());

    let result = registry.execute("m1", &spec(&payload), SHELL_TIMEOUT).await;
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains("payload contents"));
}

#[tokio::test]
async fn test_file_get_missing_file_fails() {
    let registry = CommandRegistry::with_defaults();
    let result = registry
        .execute("m1", &spec("file:get /no/such/file/anywhere"), SHELL_TIMEOUT)
        .await;

    assert_ne!(result.exit_code, 0);
    assert!(!result.stderr.is_empty());
}

#[tokio::test]
async fn test_file_get_without_path_fails() {
    let registry = CommandRegistry::with_defaults();
    let result = registry.execute("m1", &spec("file:get"), SHELL_TIMEOUT).await;

    assert_ne!(result.exit_code, 0);
    assert!(result.stderr.contains("usage"));
}

#[tokio::test]
async fn test_categorize_groups_handlers() {
    let registry = CommandRegistry::with_defaults();
    let categories = registry.categorize();

    let system = categories.get("system").unwrap();
    assert!(system.iter().any(|m| m.name == "system:info"));
    assert!(system.iter().any(|m| m.name == "system:os"));
    assert!(categories.get("file").unwrap().iter().any(|m| m.name == "file:get"));
    assert!(categories.get("shell").is_some());
}

#[tokio::test]
async fn test_lookup_and_is_registered() {
    let registry = CommandRegistry::with_defaults();
    assert!(registry.is_registered("system:info"));
    assert!(!registry.is_registered("system:nope"));
    assert!(registry.lookup("file:get").is_some());
    assert!(registry.lookup("file:put").is_none());
}
