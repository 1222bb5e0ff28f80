use std::path::PathBuf;

use reladen_core::config::ReladenConfig;
use reladen_core::models::{OutboxEntry, OutboxStatus, SyncConflict, Table};
use reladen_core::EntityId;

use crate::commands::common::{
    default_db_path, format_outbox_lines, format_sync_conflict_lines, format_sync_report,
    format_timestamp, load_config, outbox_to_item, resolve_db_path, sync_conflict_to_item,
};
use crate::commands::outbox::{run_conflicts, run_outbox};
use crate::commands::sync::run_sync;
use crate::commands::tick::run_tick;
use crate::error::CliError;

fn sample_conflict() -> SyncConflict {
    SyncConflict {
        id: 7,
        table: "residents".to_string(),
        record_id: "r-1".to_string(),
        local_updated_at: 1_700_000_000_500,
        incoming_updated_at: 1_700_000_000_000,
        resolved_at: 1_700_000_000_000,
        strategy: "lww".to_string(),
    }
}

#[test]
fn resolve_db_path_prefers_cli_argument() {
    let config = ReladenConfig {
        database_path: Some("/from/config.db".to_string()),
        ..ReladenConfig::default()
    };

    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/from/cli.db")), &config),
        PathBuf::from("/from/cli.db")
    );
    assert_eq!(
        resolve_db_path(None, &config),
        PathBuf::from("/from/config.db")
    );
    assert_eq!(
        resolve_db_path(None, &ReladenConfig::default()),
        default_db_path()
    );
}

#[test]
fn default_db_path_lives_under_reladen_directory() {
    let path = default_db_path();
    assert!(path.ends_with("reladen/reladen.db"));
}

#[test]
fn load_config_reads_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reladen.json");
    std::fs::write(
        &path,
        r#"{ "databasePath": "/tmp/sim.db", "scheduler": { "enabled": false } }"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.database_path.as_deref(), Some("/tmp/sim.db"));
    assert!(!config.scheduler.enabled);
}

#[test]
fn load_config_reports_file_path_on_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{ "scheduler": { "cadence": 1 } }"#).unwrap();

    let error = load_config(Some(&path)).unwrap_err();
    match error {
        CliError::Config(message) => assert!(message.contains("broken.json")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn load_config_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let error = load_config(Some(&dir.path().join("missing.json"))).unwrap_err();
    assert!(matches!(error, CliError::Io(_)));
}

#[test]
fn format_timestamp_uses_utc() {
    assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
    assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
}

#[test]
fn sync_conflict_lines_include_table_and_record() {
    let lines = format_sync_conflict_lines(&[sample_conflict()]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("2023-11-14 22:13:20 UTC"));
    assert!(lines[0].contains("residents:r-1"));
    assert!(lines[0].contains("local=1700000000500"));

    let item = sync_conflict_to_item(&sample_conflict());
    assert_eq!(item.resolved_at_iso, "2023-11-14 22:13:20 UTC");
    assert_eq!(item.strategy, "lww");
}

#[test]
fn outbox_lines_show_status_and_attempts() {
    let entry = OutboxEntry {
        key: OutboxEntry::key_for(Table::Events, &EntityId::from("e-1")),
        table: Table::Events,
        record_id: EntityId::from("e-1"),
        data: serde_json::json!({ "id": "e-1" }),
        updated_at: 1_700_000_000_000,
        deleted: false,
        status: OutboxStatus::Failed,
        attempts: 3,
        last_error: Some("timeout".to_string()),
        enqueued_at: 1_700_000_000_000,
    };

    let lines = format_outbox_lines(std::slice::from_ref(&entry));
    assert!(lines[0].contains("failed"));
    assert!(lines[0].contains("events:e-1"));
    assert!(lines[0].ends_with("attempts=3"));

    let item = outbox_to_item(&entry);
    assert_eq!(item.table, "events");
    assert_eq!(item.last_error.as_deref(), Some("timeout"));
}

#[test]
fn sync_report_line_mentions_failures_only_when_present() {
    let report = reladen_core::sync::SyncReport {
        pushed: 3,
        pulled: 2,
        ..Default::default()
    };
    assert_eq!(format_sync_report(&report), "pushed 3, pulled 2");

    let report = reladen_core::sync::SyncReport {
        push_failed: 1,
        stale: 2,
        ..report
    };
    assert_eq!(
        format_sync_report(&report),
        "pushed 3, pulled 2, 1 failed, 2 stale"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn tick_without_generator_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reladen.db");

    let error = run_tick(&ReladenConfig::default(), &db_path)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::GeneratorNotConfigured));
}

#[tokio::test(flavor = "current_thread")]
async fn sync_without_cloud_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reladen.db");

    let error = run_sync(&ReladenConfig::default(), &db_path)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[tokio::test(flavor = "current_thread")]
async fn outbox_and_conflicts_work_on_fresh_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reladen.db");

    run_outbox(true, false, &db_path).await.unwrap();
    run_outbox(false, true, &db_path).await.unwrap();
    run_conflicts(10, true, &db_path).await.unwrap();
    run_conflicts(10, false, &db_path).await.unwrap();
    assert!(db_path.exists());
}
