//! Integration tests for the SQLite audit store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tempfile::TempDir;

use git_control_tower::audit::{
    self, AuditEntry, AuditLogger, AuditOperation, AuditQuery, NoopAuditLogger,
    SqliteAuditLogger, MAX_QUERY_LIMIT,
};

fn entry(op: AuditOperation, branch: &str) -> AuditEntry {
    AuditEntry::new(op, "/repo").branch(branch)
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/audit.db");

    {
        let logger = SqliteAuditLogger::open(&path).unwrap();
        assert!(logger.is_configured());
        logger
            .log(
                entry(AuditOperation::Commit, "main")
                    .commit("abc1234", "feat: add endpoint")
                    .paths(vec!["src/api.rs".into()])
                    .metadata(json!({"validate_conventional": true})),
            )
            .await
            .unwrap();
    }

    let logger = SqliteAuditLogger::open(&path).unwrap();
    let page = logger.query(&AuditQuery::default()).await.unwrap();
    assert_eq!(page.total, 1);
    let stored = &page.entries[0];
    assert_eq!(stored.id, Some(1));
    assert_eq!(stored.operation, AuditOperation::Commit);
    assert_eq!(stored.branch.as_deref(), Some("main"));
    assert_eq!(stored.paths, vec!["src/api.rs".to_string()]);
    assert_eq!(stored.commit_hash.as_deref(), Some("abc1234"));
    assert_eq!(stored.commit_message.as_deref(), Some("feat: add endpoint"));
    assert_eq!(stored.metadata, Some(json!({"validate_conventional": true})));
    assert!(stored.success);
}

#[tokio::test]
async fn ids_increase_and_timestamps_default_to_now() {
    let logger = SqliteAuditLogger::open_in_memory().unwrap();
    let before = Utc::now();
    for op in [AuditOperation::Stage, AuditOperation::Commit, AuditOperation::Push] {
        logger.log(entry(op, "main")).await.unwrap();
    }
    let after = Utc::now();

    let page = logger.query(&AuditQuery::default()).await.unwrap();
    let ids: Vec<i64> = page.entries.iter().filter_map(|e| e.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    for stored in &page.entries {
        let at = stored.timestamp.unwrap();
        assert!(at >= before - ChronoDuration::milliseconds(1) && at <= after);
    }
}

#[tokio::test]
async fn filters_and_pagination() {
    let logger = SqliteAuditLogger::open_in_memory().unwrap();
    let base = Utc::now() - ChronoDuration::hours(3);
    for (i, (op, branch)) in [
        (AuditOperation::Stage, "main"),
        (AuditOperation::Commit, "main"),
        (AuditOperation::Commit, "topic"),
        (AuditOperation::Push, "topic"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut e = entry(op, branch);
        e.timestamp = Some(base + ChronoDuration::hours(i as i64));
        logger.log(e).await.unwrap();
    }

    let commits = logger
        .query(&AuditQuery {
            operation: Some(AuditOperation::Commit),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(commits.total, 2);
    assert_eq!(commits.entries[0].branch.as_deref(), Some("topic"));

    let topic = logger
        .query(&AuditQuery {
            branch: Some("topic".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(topic.total, 2);

    let recent = logger
        .query(&AuditQuery {
            since: Some(base + ChronoDuration::minutes(90)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(recent.total, 2);

    let window = logger
        .query(&AuditQuery {
            since: Some(base),
            until: Some(base + ChronoDuration::hours(1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(window.total, 2);

    let page = logger
        .query(&AuditQuery {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].operation, AuditOperation::Commit);
    assert_eq!(page.entries[0].branch.as_deref(), Some("topic"));
}

#[test]
fn limit_is_capped() {
    let query = AuditQuery {
        limit: Some(10_000),
        ..Default::default()
    };
    assert_eq!(query.effective_limit(), MAX_QUERY_LIMIT);
}

#[tokio::test]
async fn failures_are_recorded_with_message() {
    let logger = SqliteAuditLogger::open_in_memory().unwrap();
    logger
        .log(entry(AuditOperation::Push, "main").outcome(false, None))
        .await
        .unwrap();
    logger
        .log(
            entry(AuditOperation::Pull, "main")
                .outcome(false, Some("CONFLICT (content): Merge conflict in a.rs".into())),
        )
        .await
        .unwrap();

    let page = logger.query(&AuditQuery::default()).await.unwrap();
    assert!(page.entries.iter().all(|e| !e.success));
    assert_eq!(page.entries[1].error.as_deref(), Some("failed"));
    assert!(page.entries[0].error.as_deref().unwrap().contains("CONFLICT"));
}

#[tokio::test]
async fn record_is_detached_and_skips_noop() {
    let logger = Arc::new(SqliteAuditLogger::open_in_memory().unwrap());
    let handle = audit::record(logger.clone(), entry(AuditOperation::Ignore, "main"))
        .expect("configured logger spawns a task");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logger.query(&AuditQuery::default()).await.unwrap().total, 1);

    assert!(audit::record(Arc::new(NoopAuditLogger), entry(AuditOperation::Stage, "main")).is_none());
}
