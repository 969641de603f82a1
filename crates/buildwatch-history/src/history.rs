//! Manifest discovery over a git clone of the manifest-versions repository.

use crate::config::HistoryConfig;
use crate::git::GitCli;
use async_trait::async_trait;
use buildwatch_core::ports::{Checkpoint, HistoryWindow, VersionHistory};
use buildwatch_core::{BranchKey, BranchManifests, Error, ManifestVersion, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Pathspec covering every passed-build manifest of every board.
const ANY_MANIFEST_PATHSPEC: &str = ":(glob)build-name/*/pass/**";

/// Version history backed by a local clone of the manifest repository.
pub struct GitVersionHistory {
    config: HistoryConfig,
    git: GitCli,
    workdir: PathBuf,
    // Held so the scratch clone lives exactly as long as this instance.
    _scratch: Option<TempDir>,
}

impl GitVersionHistory {
    pub fn new(config: HistoryConfig) -> Result<Self> {
        let (workdir, scratch) = match &config.workdir {
            Some(dir) => (dir.clone(), None),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("buildwatch-manifests-")
                    .tempdir()?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };
        let git = GitCli::new(config.git_binary.clone(), config.command_timeout());

        Ok(Self {
            config,
            git,
            workdir,
            _scratch: scratch,
        })
    }

    /// Directory holding the clone.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn is_cloned(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    async fn clone_repo(&self) -> Result<()> {
        let dest = self
            .workdir
            .to_str()
            .ok_or_else(|| Error::Internal(format!("non-UTF-8 path: {}", self.workdir.display())))?;
        self.git
            .run(&["clone", "--quiet", &self.config.url, dest])
            .await
            .map(|_| ())
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        self.git.run_in(&self.workdir, args).await
    }

    /// Added manifest paths for `board` within `window`.
    async fn query_manifest_paths(&self, window: &HistoryWindow, board: &str) -> Result<Vec<String>> {
        let range = match window {
            HistoryWindow::SinceCheckpoint(checkpoint) => format!("{}..HEAD", checkpoint),
            HistoryWindow::SinceDays(days) => format!("--since={} days ago", days),
        };
        let pathspec = board_pathspec(board);

        let out = self
            .run_git(&[
                "log",
                &range,
                "--diff-filter=A",
                "--name-only",
                "--pretty=format:",
                "--",
                &pathspec,
            ])
            .await?;

        Ok(out
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }
}

fn board_pathspec(board: &str) -> String {
    format!(":(glob)build-name/{}-*/pass/**", board)
}

fn board_path_regex(board: &str) -> Result<Regex> {
    let pattern = format!(
        r"^build-name/{}-([^-/]+)(?:-group)?/pass/(\d+)/([A-Za-z0-9.\-]+)\.xml$",
        regex::escape(board)
    );
    Regex::new(&pattern).map_err(|e| Error::Internal(format!("bad manifest path pattern: {}", e)))
}

/// Group manifest paths into branches, each sorted oldest to newest.
///
/// Paths that do not belong to `board` (e.g. a longer board name sharing the
/// prefix) are skipped.
pub fn group_manifest_paths<'a>(
    board: &str,
    paths: impl IntoIterator<Item = &'a str>,
) -> Result<BranchManifests> {
    let matcher = board_path_regex(board)?;
    let mut branches = BranchManifests::new();

    for path in paths {
        let Some(caps) = matcher.captures(path) else {
            debug!(path, board, "Skipping path that is not a manifest for board");
            continue;
        };
        branches
            .entry(BranchKey::new(&caps[1], &caps[2]))
            .or_default()
            .push(ManifestVersion::new(&caps[3]));
    }

    for manifests in branches.values_mut() {
        manifests.sort();
        manifests.dedup();
    }

    Ok(branches)
}

#[async_trait]
impl VersionHistory for GitVersionHistory {
    async fn initialize(&self) -> Result<()> {
        if self.is_cloned() {
            info!(workdir = %self.workdir.display(), "Reusing existing manifest clone");
            return self.update().await;
        }

        let attempts = self.config.clone_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.clone_retry_delay()).await;
            }

            debug!(url = %self.config.url, attempt, "Cloning manifest repository");
            match self.clone_repo().await {
                Ok(()) => {
                    info!(url = %self.config.url, workdir = %self.workdir.display(), "Manifest repository cloned");
                    return Ok(());
                }
                Err(e) => {
                    warn!(url = %self.config.url, attempt, error = %e, "Clone failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::Clone {
            url: self.config.url.clone(),
            attempts,
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn update(&self) -> Result<()> {
        self.run_git(&["pull", "--ff-only", "--quiet"]).await?;
        debug!(workdir = %self.workdir.display(), "Manifest clone updated");
        Ok(())
    }

    async fn current_checkpoint(&self) -> Result<Checkpoint> {
        let rev = self.run_git(&["rev-parse", "HEAD"]).await?;
        Ok(Checkpoint::new(rev))
    }

    async fn any_new_since(&self, checkpoint: &Checkpoint) -> Result<bool> {
        info!(checkpoint = %checkpoint, "Checking if any manifests landed");
        let range = format!("{}..HEAD", checkpoint);
        let out = self
            .run_git(&["log", &range, "--pretty=format:%H", "--", ANY_MANIFEST_PATHSPEC])
            .await?;
        Ok(!out.is_empty())
    }

    async fn manifests_since(
        &self,
        window: &HistoryWindow,
        board: &str,
    ) -> Result<BranchManifests> {
        let paths = self.query_manifest_paths(window, board).await?;
        if paths.is_empty() {
            return Ok(BranchManifests::new());
        }

        let branches = group_manifest_paths(board, paths.iter().map(String::as_str))?;
        debug!(
            board,
            window = %window,
            branches = branches.len(),
            "Found manifests"
        );
        Ok(branches)
    }
}
