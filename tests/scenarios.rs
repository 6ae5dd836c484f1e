//! End-to-end scenarios against the in-memory runner.
//!
//! Each test drives `GitService` the way the HTTP layer does and checks the
//! literal values a caller would see.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use git_control_tower::git::fake::{FakeChange, FakeGitRunner, FakeOp};
use git_control_tower::git::RunContext;
use git_control_tower::service::{
    CommitRequest, GitService, PublishBranchRequest, PushRequest, SwitchBranchRequest,
};

fn ctx() -> RunContext {
    RunContext::with_timeout(Duration::from_secs(5))
}

fn repo() -> &'static Path {
    Path::new("/repo")
}

fn setup() -> (FakeGitRunner, GitService) {
    let git = FakeGitRunner::new("/repo");
    let service = GitService::new(Arc::new(git.clone()));
    (git, service)
}

#[tokio::test]
async fn s1_status_with_mixed_changes() {
    let (git, service) = setup();
    git.set_status_output(
        [
            "# branch.oid 0123456789abcdef0123456789abcdef01234567",
            "# branch.head main",
            "# branch.upstream origin/main",
            "# branch.ab +2 -1",
            "1 M. N... 100644 100644 100644 1111111 2222222 file1.txt",
            "1 .M N... 100644 100644 100644 3333333 3333333 file2.txt",
            "? untracked.txt",
            "! ignored.log",
            "u UU N... 100644 100644 100644 100644 aaaaaaa bbbbbbb ccccccc conflict.txt",
            "",
        ]
        .join("\0"),
    );

    let status = service.status(&ctx(), repo()).await.unwrap();
    assert_eq!(status.branch.head, "main");
    assert_eq!(status.branch.upstream.as_deref(), Some("origin/main"));
    assert_eq!(status.branch.ahead, 2);
    assert_eq!(status.branch.behind, 1);
    assert_eq!(status.files.staged, vec!["file1.txt"]);
    assert_eq!(status.files.unstaged, vec!["conflict.txt", "file2.txt"]);
    assert_eq!(status.files.untracked, vec!["untracked.txt"]);
    assert_eq!(status.files.conflicts, vec!["conflict.txt"]);
    assert_eq!(status.files.ignored, vec!["ignored.log"]);
    assert_eq!(status.summary.conflicts, 1);
}

#[tokio::test]
async fn s2_conventional_commit_accepted_and_rejected() {
    let (git, service) = setup();
    git.add_file("src/api.rs", FakeChange::Staged);

    let res = service
        .commit(
            &ctx(),
            repo(),
            &CommitRequest {
                message: "feat(api): add endpoint".into(),
                validate_conventional: true,
                ..Default::default()
            },
        )
        .await;
    assert!(res.success, "{res:?}");
    assert!(res.hash.len() >= 7);

    git.add_file("src/other.rs", FakeChange::Staged);
    git.clear_calls();
    let res = service
        .commit(
            &ctx(),
            repo(),
            &CommitRequest {
                message: "add feature".into(),
                validate_conventional: true,
                ..Default::default()
            },
        )
        .await;
    assert!(!res.success);
    assert!(!res.validation_errors.is_empty());
    assert!(!git.was_called(FakeOp::Commit));
}

#[tokio::test]
async fn s3_switch_with_dirty_tree_is_blocked() {
    let (git, service) = setup();
    git.add_branch("topic");
    git.set_head("topic");
    git.add_file("dirty.txt", FakeChange::Unstaged);

    let res = service
        .switch_branch(
            &ctx(),
            repo(),
            &SwitchBranchRequest {
                name: "main".into(),
                ..Default::default()
            },
        )
        .await;
    assert!(!res.success);
    let warning = res.warning.unwrap();
    assert!(warning.requires_confirmation);
    assert_eq!(warning.dirty_summary.unwrap().unstaged, 1);
    assert!(!git.was_called(FakeOp::CheckoutBranch));
    assert_eq!(git.current_branch().as_deref(), Some("topic"));
}

#[tokio::test]
async fn s4_remote_only_branch_requires_tracking() {
    let (git, service) = setup();
    git.add_remote_branch("origin", "feature/remote");

    let res = service
        .switch_branch(
            &ctx(),
            repo(),
            &SwitchBranchRequest {
                name: "origin/feature/remote".into(),
                ..Default::default()
            },
        )
        .await;
    assert!(!res.success);
    assert!(res.warning.unwrap().requires_tracking);

    let res = service
        .switch_branch(
            &ctx(),
            repo(),
            &SwitchBranchRequest {
                name: "origin/feature/remote".into(),
                track_remote: true,
                ..Default::default()
            },
        )
        .await;
    assert!(res.success, "{res:?}");
    assert_eq!(res.branch.unwrap().name, "feature/remote");
    assert_eq!(git.current_branch().as_deref(), Some("feature/remote"));
}

#[tokio::test]
async fn s5_publish_sets_upstream_when_missing() {
    let (git, service) = setup();
    git.add_remote("origin", "https://example.com/repo.git");
    git.set_head("feature/test");
    git.advance("feature/test", 1);

    let res = service
        .publish_branch(&ctx(), repo(), &PublishBranchRequest::default())
        .await;
    assert!(res.success, "{res:?}");
    assert!(res.set_upstream);
    let push = &git.calls_to(FakeOp::Push)[0];
    assert!(push.args.iter().any(|a| a == "--set-upstream"));
    assert_eq!(
        git.branch_upstream("feature/test").as_deref(),
        Some("origin/feature/test")
    );
}

#[tokio::test]
async fn s6_push_verification_detects_noop_remote() {
    let (git, service) = setup();
    git.set_upstream("main", "origin/main");
    git.advance("main", 1);
    git.ignore_pushes(true);

    let res = service.push(&ctx(), repo(), &PushRequest::default()).await;
    assert!(!res.success);
    assert!(res.verified);
    assert_eq!(
        res.error.as_deref(),
        Some("push completed but remote ref did not update")
    );
    assert_eq!(res.head_oid, git.head_oid());
    assert_ne!(res.remote_oid, res.head_oid);
}

#[tokio::test]
async fn staged_then_committed_then_pushed() {
    let (git, service) = setup();
    git.set_upstream("main", "origin/main");
    git.add_file("src/lib.rs", FakeChange::Unstaged);

    let staged = service
        .stage(
            &ctx(),
            repo(),
            &git_control_tower::service::StageRequest {
                paths: vec!["src/lib.rs".into()],
                scope: None,
            },
        )
        .await;
    assert!(staged.success, "{staged:?}");

    let committed = service
        .commit(
            &ctx(),
            repo(),
            &CommitRequest {
                message: "fix: handle empty input".into(),
                validate_conventional: true,
                ..Default::default()
            },
        )
        .await;
    assert!(committed.success, "{committed:?}");

    let sync = service
        .sync_status(&ctx(), repo(), &Default::default())
        .await
        .unwrap();
    assert_eq!(sync.ahead, 1);
    assert!(sync.can_push);
    assert!(!sync.has_uncommitted_changes);

    let pushed = service.push(&ctx(), repo(), &PushRequest::default()).await;
    assert!(pushed.success, "{pushed:?}");
    assert!(pushed.verified);
    assert_eq!(git.remote_branch_oid("origin", "main"), Some(git.head_oid()));
}
