//! Bounded git command execution.

use buildwatch_core::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

/// Runs git subcommands, each one killed if it outlives the timeout.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Run `git <args>` inside `repo` and return trimmed stdout.
    pub async fn run_in(&self, repo: &Path, args: &[&str]) -> Result<String> {
        let mut full = vec!["-C", path_arg(repo)?];
        full.extend_from_slice(args);
        self.run(&full).await
    }

    /// Run `git <args>` and return trimmed stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        debug!(command = %command, "Running git");

        let child = Command::new(&self.binary)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::history_query(&command, e))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| Error::history_query(&command, e))?,
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "git timed out, killing process");
                return Err(Error::history_query(
                    &command,
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("timed out after {}s", self.timeout.as_secs()),
                    ),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::history_query(
                &command,
                io::Error::other(format!("{}: {}", output.status, stderr.trim())),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Internal(format!("non-UTF-8 path: {}", path.display())))
}
