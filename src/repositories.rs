//! Known plugin repository sources, persisted in `<plugin-root>/repositories.yml`.
//!
//! The file maps each Git host to the organizations or groups under it that
//! publish Terminus plugins:
//!
//! ```yaml
//! # Terminus plugin repositories
//! #
//! # List of well-known or custom plugin Git repositories
//! ---
//! https://github.com:
//!   - pantheon-systems
//!   - terminus-plugin-project
//! ```

use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::plugins::PluginError;

/// File name of the repository list inside the plugin root
pub const REPOSITORIES_FILE: &str = "repositories.yml";

/// Header written when the repository list is first created
pub const REPOSITORIES_HEADER: &str = "# Terminus plugin repositories
#
# List of well-known or custom plugin Git repositories
---";

/// One host and the paths under it that host plugins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySource {
    pub host: String,
    pub paths: Vec<String>,
}

impl RepositorySource {
    pub fn new(host: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            host: host.into(),
            paths,
        }
    }

    /// Fully qualified `host/path` URLs, one per path
    pub fn urls(&self) -> impl Iterator<Item = String> + '_ {
        let host = self.host.trim_end_matches('/');
        self.paths
            .iter()
            .map(move |path| format!("{}/{}", host, path.trim_start_matches('/')))
    }
}

/// Reads and writes the repository list file
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    path: PathBuf,
}

impl RepositoryStore {
    /// Store backed by `repositories.yml` inside `plugin_root`
    pub fn new(plugin_root: &Path) -> Self {
        Self {
            path: plugin_root.join(REPOSITORIES_FILE),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all sources, creating the file with its header on first use
    pub fn load(&self) -> Result<Vec<RepositorySource>, PluginError> {
        if !self.path.exists() {
            fs::write(&self.path, REPOSITORIES_HEADER).map_err(|e| {
                PluginError::Io(format!("Failed to create {}: {}", self.path.display(), e))
            })?;
            debug!(path = ?self.path, "Initialized repository list");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            PluginError::Config(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        if content.trim() == REPOSITORIES_HEADER {
            return Ok(Vec::new());
        }

        let sources = parse_sources(&content).map_err(|e| {
            PluginError::Config(format!("Invalid {}: {}", self.path.display(), e))
        })?;
        debug!(path = ?self.path, hosts = sources.len(), "Loaded repository list");
        Ok(sources)
    }

    /// Every known repository as a fully qualified URL
    pub fn list(&self) -> Result<Vec<String>, PluginError> {
        Ok(self.load()?.iter().flat_map(|s| s.urls()).collect())
    }

    /// Replace the stored list
    pub fn save(&self, sources: &[RepositorySource]) -> Result<(), PluginError> {
        let mut content = REPOSITORIES_HEADER.to_string();
        if sources.iter().any(|s| !s.paths.is_empty()) {
            let mut mapping = Mapping::new();
            for source in sources.iter().filter(|s| !s.paths.is_empty()) {
                let paths = source.paths.iter().cloned().map(Value::String).collect();
                mapping.insert(Value::String(source.host.clone()), Value::Sequence(paths));
            }
            let body = serde_yaml::to_string(&mapping)
                .map_err(|e| PluginError::Config(format!("Failed to serialize sources: {}", e)))?;
            content.push('\n');
            content.push_str(&body);
        }
        fs::write(&self.path, content).map_err(|e| {
            PluginError::Io(format!("Failed to write {}: {}", self.path.display(), e))
        })?;
        debug!(path = ?self.path, hosts = sources.len(), "Saved repository list");
        Ok(())
    }

    /// Register `path` under `host`
    pub fn add(&self, host: &str, path: &str) -> Result<(), PluginError> {
        let host = host.trim_end_matches('/');
        let path = path.trim_matches('/');
        if host.is_empty() || path.is_empty() {
            return Err(PluginError::Validation(
                "A repository needs both a host and a path".to_string(),
            ));
        }

        let mut sources = self.load()?;
        match sources.iter_mut().find(|s| s.host == host) {
            Some(source) if source.paths.iter().any(|p| p == path) => {
                return Err(PluginError::Validation(format!(
                    "{}/{} is already a known repository.",
                    host, path
                )));
            }
            Some(source) => source.paths.push(path.to_string()),
            None => sources.push(RepositorySource::new(host, vec![path.to_string()])),
        }
        self.save(&sources)?;
        info!("{}/{} repository added.", host, path);
        Ok(())
    }

    /// Forget the repository whose `host/path` URL equals `url`
    pub fn remove(&self, url: &str) -> Result<(), PluginError> {
        let url = url.trim_end_matches('/');
        let mut sources = self.load()?;
        let mut found = false;
        for source in sources.iter_mut() {
            let host = source.host.trim_end_matches('/').to_string();
            let before = source.paths.len();
            source
                .paths
                .retain(|p| format!("{}/{}", host, p.trim_start_matches('/')) != url);
            found |= source.paths.len() != before;
        }
        if !found {
            return Err(PluginError::NotFound(format!(
                "Unable to remove {}.  Repository does not exist.",
                url
            )));
        }
        sources.retain(|s| !s.paths.is_empty());
        self.save(&sources)?;
        info!("{} repository removed.", url);
        Ok(())
    }
}

fn parse_sources(content: &str) -> Result<Vec<RepositorySource>, String> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let mapping = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(mapping) => mapping,
        _ => return Err("expected a mapping of host to repository paths".to_string()),
    };

    let mut sources = Vec::with_capacity(mapping.len());
    for (host, paths) in mapping {
        let host = match host {
            Value::String(host) => host,
            other => return Err(format!("host must be a string, got {:?}", other)),
        };
        let paths = match paths {
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(path) => Ok(path),
                    other => Err(format!("path under {} must be a string, got {:?}", host, other)),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::String(path) => vec![path],
            Value::Null => Vec::new(),
            other => {
                return Err(format!(
                    "paths under {} must be a list, got {:?}",
                    host, other
                ))
            }
        };
        sources.push(RepositorySource { host, paths });
    }
    Ok(sources)
}
