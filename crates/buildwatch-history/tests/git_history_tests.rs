//! GitVersionHistory tests against real git repositories.
//!
//! Each test builds an "origin" manifest repository in a temp dir and points
//! the history at it by path.

use buildwatch_core::ports::{Checkpoint, VersionHistory};
use buildwatch_core::{BranchBuilds, BranchKey, Error, ManifestVersion};
use buildwatch_history::{GitVersionHistory, HistoryConfig};
use buildwatch_scheduler::Event;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

struct Origin {
    dir: TempDir,
}

impl Origin {
    fn new() -> Self {
        let origin = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        origin.git(&["init", "--quiet"]);
        origin.commit_file("README", "manifest-versions fixture", "init");
        origin
    }

    fn url(&self) -> String {
        self.dir.path().to_str().expect("utf-8 path").to_string()
    }

    fn git(&self, args: &[&str]) {
        run_git(self.dir.path(), args, &[]);
    }

    fn commit_file(&self, path: &str, contents: &str, message: &str) {
        self.commit_file_dated(path, contents, message, None);
    }

    fn commit_file_dated(&self, path: &str, contents: &str, message: &str, date: Option<&str>) {
        let full = self.dir.path().join(path);
        std::fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
        std::fs::write(&full, contents).expect("write");
        self.git(&["add", path]);
        let env: Vec<(&str, &str)> = date
            .map(|d| vec![("GIT_AUTHOR_DATE", d), ("GIT_COMMITTER_DATE", d)])
            .unwrap_or_default();
        run_git(
            self.dir.path(),
            &[
                "-c",
                "user.name=buildwatch",
                "-c",
                "user.email=buildwatch@example.com",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                message,
            ],
            &env,
        );
    }

    fn add_manifest(&self, dir: &str, milestone: &str, manifest: &str) {
        let path = format!("build-name/{dir}/pass/{milestone}/{manifest}.xml");
        self.commit_file(&path, "<manifest/>", &format!("{dir} {manifest}"));
    }

    fn add_manifest_days_ago(&self, dir: &str, milestone: &str, manifest: &str, days: u32) {
        let path = format!("build-name/{dir}/pass/{milestone}/{manifest}.xml");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs();
        let date = format!("@{} +0000", now - u64::from(days) * 24 * 60 * 60);
        self.commit_file_dated(&path, "<manifest/>", &format!("{dir} {manifest}"), Some(&date));
    }
}

fn run_git(dir: &Path, args: &[&str], env: &[(&str, &str)]) {
    let out = Command::new("git")
        .args(args)
        .envs(env.iter().copied())
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
}

async fn cloned(origin: &Origin) -> GitVersionHistory {
    let history = GitVersionHistory::new(
        HistoryConfig::new(origin.url())
            .with_clone_retries(1, Duration::ZERO)
            .with_command_timeout(Duration::from_secs(60)),
    )
    .expect("history");
    history.initialize().await.expect("initialize");
    history
}

fn versions(list: &[&str]) -> Vec<ManifestVersion> {
    list.iter().copied().map(ManifestVersion::new).collect()
}

#[tokio::test]
async fn test_manifests_sorted_version_aware() {
    let origin = Origin::new();
    let history = cloned(&origin).await;
    let checkpoint = history.current_checkpoint().await.unwrap();

    for manifest in ["2057.0.9", "2057.0.10", "2054.0.0", "2051.0.0", "2050.0.0", "2048.0.0"] {
        origin.add_manifest("lumpy-release", "20", manifest);
    }
    history.update().await.unwrap();

    let branches = history.manifests_since_rev(&checkpoint, "lumpy").await.unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(
        branches[&BranchKey::new("release", "20")],
        versions(&["2048.0.0", "2050.0.0", "2051.0.0", "2054.0.0", "2057.0.9", "2057.0.10"])
    );
}

#[tokio::test]
async fn test_empty_discovery() {
    let origin = Origin::new();
    let history = cloned(&origin).await;
    let checkpoint = history.current_checkpoint().await.unwrap();

    assert!(!history.any_new_since(&checkpoint).await.unwrap());
    assert!(history.manifests_since_rev(&checkpoint, "lumpy").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_is_incremental() {
    let origin = Origin::new();
    let history = cloned(&origin).await;
    let before = history.current_checkpoint().await.unwrap();

    origin.add_manifest("lumpy-release", "20", "2057.0.0");

    // Nothing is visible until the clone is refreshed.
    assert!(!history.any_new_since(&before).await.unwrap());

    history.update().await.unwrap();
    assert!(history.any_new_since(&before).await.unwrap());

    let after = history.current_checkpoint().await.unwrap();
    assert_ne!(before, after);
    assert!(!history.any_new_since(&after).await.unwrap());
    assert!(history.manifests_since_rev(&after, "lumpy").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_only_added_manifests_count() {
    let origin = Origin::new();
    origin.add_manifest("lumpy-release", "20", "2057.0.0");
    let history = cloned(&origin).await;
    let checkpoint = history.current_checkpoint().await.unwrap();

    origin.commit_file(
        "build-name/lumpy-release/pass/20/2057.0.0.xml",
        "<manifest rewritten/>",
        "rewrite",
    );
    history.update().await.unwrap();

    assert!(history.manifests_since_rev(&checkpoint, "lumpy").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_board_namespaces() {
    let origin = Origin::new();
    let history = cloned(&origin).await;
    let checkpoint = history.current_checkpoint().await.unwrap();

    origin.add_manifest("x86-release-group", "20", "2057.0.1");
    origin.add_manifest("x86-alex-release", "20", "2057.0.2");
    origin.add_manifest("x86-factory", "17", "1412.52.0");
    history.update().await.unwrap();

    let branches = history.manifests_since_rev(&checkpoint, "x86").await.unwrap();
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[&BranchKey::new("release", "20")], versions(&["2057.0.1"]));
    assert_eq!(branches[&BranchKey::new("factory", "17")], versions(&["1412.52.0"]));

    let alex = history.manifests_since_rev(&checkpoint, "x86-alex").await.unwrap();
    assert_eq!(alex[&BranchKey::new("release", "20")], versions(&["2057.0.2"]));
}

#[tokio::test]
async fn test_manifests_since_days() {
    let origin = Origin::new();
    origin.add_manifest("lumpy-release", "20", "2057.0.0");
    let history = cloned(&origin).await;

    let branches = history.manifests_since_days(1, "lumpy").await.unwrap();
    assert_eq!(branches[&BranchKey::new("release", "20")], versions(&["2057.0.0"]));
}

#[tokio::test]
async fn test_timed_events_see_builds_within_their_period() {
    let origin = Origin::new();
    origin.add_manifest_days_ago("lumpy-release", "20", "2057.0.0", 3);
    let history = cloned(&origin).await;

    assert!(history.manifests_since_days(1, "lumpy").await.unwrap().is_empty());

    let weekly = Event::weekly(5, 23, []).unwrap();
    let builds = weekly.get_branch_builds_for_board("lumpy", &history).await.unwrap();
    assert_eq!(
        builds,
        BranchBuilds::from([(
            "20".to_string(),
            vec!["lumpy-release/R20-2057.0.0".to_string()]
        )])
    );

    let nightly = Event::nightly(21, []).unwrap();
    let builds = nightly.get_branch_builds_for_board("lumpy", &history).await.unwrap();
    assert!(builds.is_empty());

    let widened = Event::nightly(21, []).unwrap().with_lookback_days(4);
    let builds = widened.get_branch_builds_for_board("lumpy", &history).await.unwrap();
    assert_eq!(builds.len(), 1);
}

#[tokio::test]
async fn test_unknown_checkpoint_is_query_error() {
    let origin = Origin::new();
    let history = cloned(&origin).await;

    let err = history
        .any_new_since(&Checkpoint::new("0000000000000000000000000000000000000bad"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HistoryQuery { .. }));
}

#[tokio::test]
async fn test_clone_failure_after_retries() {
    let missing = tempfile::tempdir().unwrap();
    let url = missing.path().join("does-not-exist");
    let history = GitVersionHistory::new(
        HistoryConfig::new(url.to_str().unwrap()).with_clone_retries(2, Duration::ZERO),
    )
    .unwrap();

    match history.initialize().await {
        Err(Error::Clone { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected clone failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_initialize_reuses_existing_clone() {
    let origin = Origin::new();
    let workdir = tempfile::tempdir().unwrap();
    let clone_path = workdir.path().join("manifests");

    let config = HistoryConfig::new(origin.url())
        .with_workdir(&clone_path)
        .with_clone_retries(1, Duration::ZERO);

    let first = GitVersionHistory::new(config.clone()).unwrap();
    first.initialize().await.unwrap();
    let checkpoint = first.current_checkpoint().await.unwrap();

    origin.add_manifest("lumpy-release", "20", "2057.0.0");

    let second = GitVersionHistory::new(config).unwrap();
    second.initialize().await.unwrap();
    assert_eq!(second.workdir(), clone_path.as_path());
    assert!(second.any_new_since(&checkpoint).await.unwrap());
}
