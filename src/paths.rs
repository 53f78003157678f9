//! Plugin root resolution.
//!
//! The root is `TERMINUS_PLUGINS_DIR` when set, otherwise
//! `<home>/terminus/plugins/` (`<home>\terminus\plugins\` on Windows).
//! Every plugin lives in one subdirectory named after its package.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{PathConfig, PlatformKind};
use crate::plugins::{is_plugin_name, PluginError};

/// Computes and materializes the plugin root directory
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Root with exactly one trailing separator
    root: String,
}

impl PathResolver {
    /// Build a resolver from an explicit path configuration.
    ///
    /// Does not touch the filesystem; the directory is created lazily by
    /// [`PathResolver::resolve`].
    pub fn new(config: &PathConfig) -> Result<Self, PluginError> {
        let root = match &config.plugins_root_override {
            Some(dir) => normalize_root(dir, config.platform),
            None => {
                let home = config.home_dir.as_ref().ok_or_else(|| {
                    PluginError::Config(
                        "Unable to determine the home directory for the plugin root".to_string(),
                    )
                })?;
                default_root(home, config.platform)
            }
        };
        debug!(platform = %config.platform, root = %root, "Resolved plugin root");
        Ok(Self { root })
    }

    /// Root directory as rendered for the platform, trailing separator included
    pub fn root_display(&self) -> &str {
        &self.root
    }

    /// Ensure the root exists and return it, with `plugin` appended when given
    pub fn resolve(&self, plugin: Option<&str>) -> Result<PathBuf, PluginError> {
        let root = PathBuf::from(&self.root);
        ensure_dir(&root).map_err(|e| {
            PluginError::Io(format!(
                "Failed to create plugin directory {}: {}",
                self.root, e
            ))
        })?;
        Ok(match plugin {
            Some(name) => root.join(name),
            None => root,
        })
    }

    /// Names of every plugin directory under the root, sorted.
    ///
    /// Plain files (such as `repositories.yml`) and hidden entries are skipped.
    pub fn plugin_names(&self) -> Result<Vec<String>, PluginError> {
        let root = self.resolve(None)?;
        let entries = fs::read_dir(&root).map_err(|e| {
            PluginError::Io(format!("Failed to read {}: {}", root.display(), e))
        })?;

        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        debug!(root = %self.root, count = names.len(), "Enumerated plugin directories");
        Ok(names)
    }

    /// Whether a plugin directory with this name exists under the root.
    ///
    /// Names that would escape the root (absolute, `..`, separators) are
    /// never installed.
    pub fn is_installed(&self, plugin: &str) -> Result<bool, PluginError> {
        if !is_plugin_name(plugin) || Path::new(plugin).is_absolute() {
            return Ok(false);
        }
        Ok(self.resolve(Some(plugin))?.is_dir())
    }
}

/// Normalize an override to exactly one trailing platform separator
pub fn normalize_root(dir: &str, platform: PlatformKind) -> String {
    let sep = platform.separator();
    let trimmed = dir.trim_end_matches(|c: char| c == sep || c == '/');
    format!("{}{}", trimmed, sep)
}

fn default_root(home: &Path, platform: PlatformKind) -> String {
    let sep = platform.separator();
    let home = home.to_string_lossy();
    let home = home.trim_end_matches(|c: char| c == sep || c == '/');
    format!("{home}{sep}terminus{sep}plugins{sep}")
}

fn ensure_dir(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    match builder.create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}
