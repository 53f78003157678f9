//! Git and filesystem operations on plugin checkouts.
//!
//! Both are capability traits so the plugin manager can be driven against
//! recording fakes; [`GitCli`] and [`LocalFilesystem`] are the real thing.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

use crate::plugins::PluginError;

/// Marker directory of a managed checkout
pub const METADATA_DIR: &str = ".git";

/// Version control operations, each returning the tool's output lines
pub trait VersionControl: Send + Sync {
    /// Clone `url` into `dest`
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<Vec<String>, PluginError>;

    /// Pull the latest changes in `dir`
    fn pull(&self, dir: &Path) -> Result<Vec<String>, PluginError>;

    /// Configured remotes of `dir`, one `<name> <url> (<direction>)` line each
    fn remotes(&self, dir: &Path) -> Result<Vec<String>, PluginError>;

    /// Whether `dir` is a managed checkout rather than a plain directory
    fn is_managed(&self, dir: &Path) -> bool {
        dir.join(METADATA_DIR).exists()
    }
}

/// Removes plugin directories
pub trait Filesystem: Send + Sync {
    fn remove_tree(&self, dir: &Path) -> Result<(), PluginError>;
}

/// [`VersionControl`] that shells out to the `git` binary
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    fn run(&self, mut cmd: Command, action: &str) -> Result<Vec<String>, PluginError> {
        let output = cmd
            .output()
            .map_err(|e| PluginError::Transport(format!("Failed to run git {}: {}", action, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::Transport(format!(
                "git {} failed: {}",
                action,
                stderr.trim()
            )));
        }
        let lines = output_lines(&output);
        debug!(action = %action, lines = lines.len(), "git finished");
        Ok(lines)
    }
}

impl VersionControl for GitCli {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<Vec<String>, PluginError> {
        let mut cmd = Command::new("git");
        cmd.arg("clone").arg(url).arg(dest);
        self.run(cmd, "clone")
    }

    fn pull(&self, dir: &Path) -> Result<Vec<String>, PluginError> {
        let mut cmd = Command::new("git");
        cmd.arg("pull").current_dir(dir);
        self.run(cmd, "pull")
    }

    fn remotes(&self, dir: &Path) -> Result<Vec<String>, PluginError> {
        let mut cmd = Command::new("git");
        cmd.arg("remote").arg("-v").current_dir(dir);
        self.run(cmd, "remote")
    }
}

/// Non-empty stdout lines followed by non-empty stderr lines
fn output_lines(output: &Output) -> Vec<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Remote URLs from `git remote -v` lines, first occurrence order, deduplicated
pub fn parse_remote_urls<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for line in lines {
        if let Some(url) = line.as_ref().split_whitespace().nth(1) {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
    }
    urls
}

/// [`Filesystem`] over the local disk
#[derive(Debug, Clone, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn remove_tree(&self, dir: &Path) -> Result<(), PluginError> {
        fs::remove_dir_all(dir)
            .map_err(|e| PluginError::Io(format!("Failed to remove {}: {}", dir.display(), e)))
    }
}
