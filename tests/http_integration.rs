//! HTTP-level tests driving the router with `tower::ServiceExt::oneshot`.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use git_control_tower::audit::{
    AuditLogger, AuditOperation, AuditQuery, MemoryAuditLogger, SqliteAuditLogger,
};
use git_control_tower::core::config::Timeouts;
use git_control_tower::git::fake::{FakeChange, FakeGitRunner, FakeOp};
use git_control_tower::git::{CliGitRunner, GitRunner};
use git_control_tower::sandbox::WorkspaceSandboxClient;
use git_control_tower::server::{router, AppState};

fn state(runner: Arc<dyn GitRunner>, audit: Arc<dyn AuditLogger>) -> AppState {
    AppState::new(
        runner,
        audit,
        WorkspaceSandboxClient::new(None).unwrap(),
        Timeouts::default(),
    )
}

fn fake_app(git: &FakeGitRunner, audit: &MemoryAuditLogger) -> Router {
    router(state(Arc::new(git.clone()), Arc::new(audit.clone())))
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Poll until the detached audit task has written `count` entries.
async fn wait_for_audit(audit: &dyn AuditLogger, count: u64) -> Vec<git_control_tower::audit::AuditEntry> {
    for _ in 0..100 {
        let page = audit.query(&AuditQuery::default()).await.unwrap();
        if page.total >= count {
            return page.entries;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("audit log never reached {count} entries");
}

#[tokio::test]
async fn switch_on_dirty_tree_returns_warning_with_200() {
    let git = FakeGitRunner::new("/repo");
    git.add_branch("topic");
    git.add_file("dirty.txt", FakeChange::Unstaged);
    let audit = MemoryAuditLogger::new();

    let (status, body) = call(
        fake_app(&git, &audit),
        post("/api/v1/branches/switch", json!({"name": "topic"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["warning"]["requires_confirmation"], true);
    assert_eq!(body["warning"]["dirty_summary"]["unstaged"], 1);

    let (_, body) = call(
        fake_app(&git, &audit),
        post(
            "/api/v1/branches/switch",
            json!({"name": "topic", "allow_dirty": true}),
        ),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["branch"]["name"], "topic");
    assert_eq!(body["branch"]["is_current"], true);

    let entries = wait_for_audit(&audit, 2).await;
    assert!(entries
        .iter()
        .all(|e| e.operation == AuditOperation::BranchSwitch));
}

#[tokio::test]
async fn branches_lists_locals_and_remotes() {
    let git = FakeGitRunner::new("/repo");
    git.set_upstream("main", "origin/main");
    git.add_remote_branch("origin", "feature/remote");
    let audit = MemoryAuditLogger::new();

    let (status, body) = call(fake_app(&git, &audit), get("/api/v1/branches")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"], "main");
    assert_eq!(body["locals"][0]["name"], "main");
    let remotes: Vec<&str> = body["remotes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["name"].as_str())
        .collect();
    assert!(remotes.contains(&"origin/feature/remote"));
    assert!(!remotes.iter().any(|r| r.ends_with("/HEAD")));
}

#[tokio::test]
async fn sync_reports_policy() {
    let git = FakeGitRunner::new("/repo");
    git.set_upstream("main", "origin/main");
    git.set_divergence("main", 2, 1);
    let audit = MemoryAuditLogger::new();

    let (status, body) = call(fake_app(&git, &audit), get("/api/v1/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ahead"], 2);
    assert_eq!(body["behind"], 1);
    assert_eq!(body["can_push"], false);
    assert_eq!(body["can_pull"], true);
    assert!(!body["safety_warnings"].as_array().unwrap().is_empty());
    assert!(!git.was_called(FakeOp::Fetch));

    let (_, body) = call(fake_app(&git, &audit), get("/api/v1/sync?fetch=true")).await;
    assert_eq!(body["fetched"], true);
    assert!(git.was_called(FakeOp::Fetch));
}

#[tokio::test]
async fn push_verification_failure_is_in_band() {
    let git = FakeGitRunner::new("/repo");
    git.set_upstream("main", "origin/main");
    git.advance("main", 1);
    git.ignore_pushes(true);
    let audit = MemoryAuditLogger::new();

    let (status, body) = call(fake_app(&git, &audit), post("/api/v1/push", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["verified"], true);
    assert_eq!(body["error"], "push completed but remote ref did not update");

    let entries = wait_for_audit(&audit, 1).await;
    assert_eq!(entries[0].operation, AuditOperation::Push);
    assert!(!entries[0].success);
    assert_eq!(entries[0].branch.as_deref(), Some("main"));
}

#[tokio::test]
async fn pull_conflicts_are_listed() {
    let git = FakeGitRunner::new("/repo");
    git.set_upstream("main", "origin/main");
    git.set_pull_conflicts(&["src/a.rs"]);
    let audit = MemoryAuditLogger::new();

    let (status, body) = call(fake_app(&git, &audit), post("/api/v1/pull", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["has_conflicts"], true);
    assert_eq!(body["conflicts"], json!(["src/a.rs"]));
}

#[tokio::test]
async fn stage_scope_and_rejected_paths() {
    let git = FakeGitRunner::new("/repo");
    git.add_file("scenarios/tower/main.go", FakeChange::Unstaged);
    let audit = MemoryAuditLogger::new();

    let (_, body) = call(
        fake_app(&git, &audit),
        post("/api/v1/stage", json!({"scope": "scenario:tower"})),
    )
    .await;
    assert_eq!(body["success"], true);
    assert!(git.file("scenarios/tower/main.go").unwrap().staged);

    let (status, body) = call(
        fake_app(&git, &audit),
        post("/api/v1/stage", json!({"paths": ["../outside.txt"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(!body["validation_errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn diff_endpoint_parses_runner_output() {
    let git = FakeGitRunner::new("/repo");
    git.set_diff_output(
        false,
        "diff --git a/a.txt b/a.txt\n\
         index 1111111..2222222 100644\n\
         --- a/a.txt\n\
         +++ b/a.txt\n\
         @@ -1,2 +1,2 @@\n\
         \x20keep\n\
         -old\n\
         +new\n",
    );
    let audit = MemoryAuditLogger::new();

    let (status, body) = call(
        fake_app(&git, &audit),
        get("/api/v1/diff?annotate=true"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_diff"], true);
    assert_eq!(body["stats"]["files"], 1);
    assert_eq!(body["stats"]["additions"], 1);
    assert_eq!(body["stats"]["deletions"], 1);
    assert!(body["annotated"].is_array());
}

fn run_git(dir: &std::path::Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

#[tokio::test]
async fn real_repository_with_sqlite_audit() {
    let repo = TempDir::new().unwrap();
    run_git(repo.path(), &["init", "-q"]);
    run_git(repo.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    run_git(repo.path(), &["config", "user.email", "test@example.com"]);
    run_git(repo.path(), &["config", "user.name", "Test User"]);
    run_git(repo.path(), &["config", "commit.gpgsign", "false"]);
    std::fs::write(repo.path().join("notes.md"), "hello\n").unwrap();

    let db = TempDir::new().unwrap();
    let audit = Arc::new(SqliteAuditLogger::open(db.path().join("audit.db")).unwrap());
    let runner = Arc::new(CliGitRunner::new("git", Some(repo.path().to_path_buf())));
    let app = router(state(runner, audit.clone()));

    let (_, body) = call(app.clone(), post("/api/v1/stage", json!({"paths": ["notes.md"]}))).await;
    assert_eq!(body["success"], true, "{body}");

    let (_, body) = call(
        app.clone(),
        post(
            "/api/v1/commit",
            json!({"message": "docs: add notes", "validate_conventional": true}),
        ),
    )
    .await;
    assert_eq!(body["success"], true, "{body}");

    let (_, body) = call(app.clone(), get("/api/v1/status")).await;
    assert_eq!(body["summary"]["staged"], 0);
    assert_eq!(body["summary"]["untracked"], 0);

    wait_for_audit(audit.as_ref(), 2).await;
    let (status, body) = call(app, get("/api/v1/audit?operation=commit")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["commit_message"], "docs: add notes");
    assert_eq!(body["entries"][0]["success"], true);
}
