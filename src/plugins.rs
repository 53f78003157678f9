//! Plugin management - install, update, remove and list Terminus plugins.
//!
//! Plugins are Git checkouts living one per directory under the plugin root
//! (see [`PathResolver`]). There is no manifest or lockfile: what is
//! installed is read back from the directory tree on every call.
//!
//! Identifiers passed to [`PluginManager::install`] are either:
//! - a repository URL (`https://github.com/acme/my-plugin`), validated by
//!   fetching its page and checking the title, or
//! - a bare name, resolved through the plugin registry.
//!
//! Every batch operation handles each argument independently and returns one
//! outcome per item; a failing item never stops the rest of the batch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{AppConfig, PolicyConfig};
use crate::paths::PathResolver;
use crate::registry::{PluginRecord, RegistrySearch};
use crate::repositories::RepositoryStore;
use crate::validator::{title_description, PluginValidator};
use crate::vcs::{parse_remote_urls, Filesystem, GitCli, LocalFilesystem, VersionControl};
use crate::web::{DocumentFetcher, HttpFetcher};

/// Where users are pointed when a plugin cannot be updated in place
const PLUGINS_WIKI_URL: &str = "https://github.com/pantheon-systems/terminus/wiki/Plugins";

// ---------------------------------------------------------------------------
// Plugin errors
// ---------------------------------------------------------------------------

/// Errors that can occur during plugin operations
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Invalid plugin: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// What the user asked to install
#[derive(Debug, Clone, PartialEq)]
pub enum PluginIdentifier {
    /// A registry package name or name fragment
    Name(String),
    /// A plugin Git repository URL
    Url(Url),
}

impl PluginIdentifier {
    /// Absolute URLs with a host are repository URLs; anything else is a name
    pub fn classify(arg: &str) -> Self {
        match Url::parse(arg) {
            Ok(url) if url.host_str().is_some() => Self::Url(url),
            _ => Self::Name(arg.to_string()),
        }
    }
}

/// Split a plugin repository URL into its repository base and plugin name.
///
/// `https://github.com/acme/seo-plugin.git` becomes
/// (`https://github.com/acme`, `seo-plugin`).
pub fn split_repository_url(url: &Url) -> Option<(String, String)> {
    let path = url.path().trim_end_matches('/');
    let (parent, last) = path.rsplit_once('/')?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if !is_plugin_name(name) {
        return None;
    }

    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.set_path(parent);
    Some((base.as_str().trim_end_matches('/').to_string(), name.to_string()))
}

/// Rewrite Git transport remotes as https URLs.
///
/// scp-style (`git@host:org/repo.git`), `ssh://[user@]host[:port]/path` and
/// `git://host/path` remotes all point at `https://host/path`; anything else
/// is returned unchanged.
pub fn normalize_remote(remote: &str) -> String {
    if let Some((scheme, _)) = remote.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if matches!(scheme.as_str(), "ssh" | "git" | "git+ssh" | "ssh+git") {
            let https = Url::parse(remote).ok().and_then(|url| {
                url.host_str()
                    .map(|host| format!("https://{}{}", host, url.path()))
            });
            if let Some(https) = https {
                return https;
            }
        }
        return remote.to_string();
    }
    match remote.split_once(':') {
        Some((user_host, path)) if !path.starts_with('/') => {
            let host = user_host.rsplit('@').next().unwrap_or(user_host);
            format!("https://{}/{}", host, path)
        }
        _ => remote.to_string(),
    }
}

/// A single directory name: no separators, not `.` or `..`
pub fn is_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of installing one identifier (or one registry match)
#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    Installed { name: String, output: Vec<String> },
    AlreadyInstalled { name: String },
    Invalid { identifier: String },
    NoMatches { query: String },
    Failed { name: String, error: String },
}

/// Result of updating one plugin
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated { name: String, output: Vec<String> },
    NotInstalled { name: String },
    /// Present on disk but not a Git checkout
    Unmanaged { name: String },
    Invalid { name: String },
    Failed { name: String, error: String },
}

/// Result of removing one plugin
#[derive(Debug, Clone, PartialEq)]
pub enum UninstallOutcome {
    Removed { name: String },
    NotInstalled { name: String },
    Invalid { name: String },
    Failed { name: String, error: String },
}

/// How an installed plugin is tracked
#[derive(Debug, Clone, PartialEq)]
pub enum PluginStatus {
    /// Git checkout whose remote validated as a plugin repository
    Managed { remote: String },
    /// Git checkout, but no remote validated
    Unverified,
    /// Plain directory; cannot be updated without reinstalling
    Unmanaged,
}

/// An entry of the installed plugin listing
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledPlugin {
    pub name: String,
    pub location: PathBuf,
    pub description: Option<String>,
    pub status: PluginStatus,
}

// ---------------------------------------------------------------------------
// Plugin manager
// ---------------------------------------------------------------------------

/// Resolves, installs and maintains plugins under the plugin root
pub struct PluginManager {
    paths: PathResolver,
    validator: PluginValidator,
    registry: RegistrySearch,
    vcs: Arc<dyn VersionControl>,
    fs: Arc<dyn Filesystem>,
    policy: PolicyConfig,
}

impl PluginManager {
    /// Create a manager using git, the local disk and the configured registry
    pub fn new(config: &AppConfig) -> Result<Self, PluginError> {
        let paths = PathResolver::new(&config.path_config())?;
        let fetcher: Arc<dyn DocumentFetcher> = Arc::new(HttpFetcher::new(Duration::from_secs(
            config.registry.timeout_secs,
        ))?);
        Ok(Self::with_parts(
            paths,
            fetcher,
            Arc::new(GitCli),
            Arc::new(LocalFilesystem),
            &config.registry.url,
            config.policy.clone(),
        ))
    }

    /// Create a manager from explicit collaborators
    pub fn with_parts(
        paths: PathResolver,
        fetcher: Arc<dyn DocumentFetcher>,
        vcs: Arc<dyn VersionControl>,
        fs: Arc<dyn Filesystem>,
        registry_url: &str,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            validator: PluginValidator::new(fetcher.clone(), policy.require_title_keywords),
            registry: RegistrySearch::new(fetcher, registry_url, paths.clone()),
            paths,
            vcs,
            fs,
            policy,
        }
    }

    /// The plugin root resolver
    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Store for `repositories.yml` in the plugin root
    pub fn repositories(&self) -> Result<RepositoryStore, PluginError> {
        Ok(RepositoryStore::new(&self.paths.resolve(None)?))
    }

    /// Search the registry for plugins whose package matches `query`
    pub async fn search(&self, query: &str) -> Result<Vec<PluginRecord>, PluginError> {
        self.registry.search(query).await
    }

    /// Install plugins by repository URL or registry name
    pub async fn install(&self, identifiers: &[String]) -> Result<Vec<InstallOutcome>, PluginError> {
        self.paths.resolve(None)?;
        let mut outcomes = Vec::new();
        for arg in identifiers {
            match PluginIdentifier::classify(arg) {
                PluginIdentifier::Url(url) => {
                    outcomes.push(self.install_url(arg, &url).await?);
                }
                PluginIdentifier::Name(name) => {
                    outcomes.extend(self.install_name(&name).await?);
                }
            }
        }
        Ok(outcomes)
    }

    async fn install_url(&self, arg: &str, url: &Url) -> Result<InstallOutcome, PluginError> {
        let valid = match split_repository_url(url) {
            Some((repository, plugin)) => self
                .validator
                .is_valid_plugin(&repository, &plugin)
                .await
                .map(|title| (plugin, title)),
            None => None,
        };
        let Some((plugin, title)) = valid else {
            error!("{} is not a valid plugin Git repository.", arg);
            return Ok(InstallOutcome::Invalid {
                identifier: arg.to_string(),
            });
        };
        debug!(plugin = %plugin, title = %title, "Validated plugin repository");
        self.clone_plugin(&plugin, arg)
    }

    async fn install_name(&self, name: &str) -> Result<Vec<InstallOutcome>, PluginError> {
        if !self.policy.allow_registry_name_install {
            error!(
                "{} is not a valid plugin Git repository. Install plugins by URL.",
                name
            );
            return Ok(vec![InstallOutcome::Invalid {
                identifier: name.to_string(),
            }]);
        }

        let matches = self.registry.search(name).await?;
        if matches.is_empty() {
            error!("No plugins found matching {}.", name);
            return Ok(vec![InstallOutcome::NoMatches {
                query: name.to_string(),
            }]);
        }

        let mut outcomes = Vec::with_capacity(matches.len());
        for record in matches {
            if !is_plugin_name(&record.package) {
                error!("{} is not a valid plugin name.", record.package);
                outcomes.push(InstallOutcome::Invalid {
                    identifier: record.package,
                });
                continue;
            }
            outcomes.push(self.clone_plugin(&record.package, &record.repo)?);
        }
        Ok(outcomes)
    }

    /// Clone `url` as `plugin` unless a directory of that name already exists
    fn clone_plugin(&self, plugin: &str, url: &str) -> Result<InstallOutcome, PluginError> {
        let dest = self.paths.resolve(Some(plugin))?;
        if dest.is_dir() {
            info!("{} plugin already installed.", plugin);
            return Ok(InstallOutcome::AlreadyInstalled {
                name: plugin.to_string(),
            });
        }

        match self.vcs.clone_repo(url, &dest) {
            Ok(output) => {
                for line in &output {
                    info!("{}", line);
                }
                info!(plugin = %plugin, url = %url, "Installed plugin");
                Ok(InstallOutcome::Installed {
                    name: plugin.to_string(),
                    output,
                })
            }
            Err(e) => {
                error!("{}", e);
                Ok(InstallOutcome::Failed {
                    name: plugin.to_string(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Pull the named plugins, or every installed plugin for `all`
    pub async fn update(&self, targets: &[String]) -> Result<Vec<UpdateOutcome>, PluginError> {
        let names = if targets.len() == 1 && targets[0] == "all" {
            let names = self.paths.plugin_names()?;
            if names.is_empty() {
                info!("No plugins installed.");
                return Ok(Vec::new());
            }
            names
        } else {
            targets.to_vec()
        };

        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            outcomes.push(self.update_plugin(name)?);
        }
        Ok(outcomes)
    }

    fn update_plugin(&self, name: String) -> Result<UpdateOutcome, PluginError> {
        if !is_plugin_name(&name) {
            error!("{} is not a valid plugin name.", name);
            return Ok(UpdateOutcome::Invalid { name });
        }
        let dir = self.paths.resolve(Some(&name))?;
        if !dir.is_dir() {
            error!("{} plugin is not installed.", name);
            return Ok(UpdateOutcome::NotInstalled { name });
        }

        info!("Updating {} plugin...", name);
        if !self.vcs.is_managed(&dir) {
            error!("Unable to update {} plugin.  Git repository does not exist.", name);
            error!("The recommended way to install plugins is git clone <URL to plugin Git repository>.");
            error!("See {}.", PLUGINS_WIKI_URL);
            return Ok(UpdateOutcome::Unmanaged { name });
        }

        match self.vcs.pull(&dir) {
            Ok(output) => {
                for line in &output {
                    info!("{}", line);
                }
                Ok(UpdateOutcome::Updated { name, output })
            }
            Err(e) => {
                error!("{}", e);
                Ok(UpdateOutcome::Failed {
                    name,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Remove the named plugins from disk
    pub async fn uninstall(&self, targets: &[String]) -> Result<Vec<UninstallOutcome>, PluginError> {
        let mut outcomes = Vec::with_capacity(targets.len());
        for name in targets {
            let name = name.clone();
            if !is_plugin_name(&name) {
                error!("{} is not a valid plugin name.", name);
                outcomes.push(UninstallOutcome::Invalid { name });
                continue;
            }
            let dir = self.paths.resolve(Some(&name))?;
            if !dir.is_dir() {
                error!("{} plugin is not installed.", name);
                outcomes.push(UninstallOutcome::NotInstalled { name });
                continue;
            }

            match self.fs.remove_tree(&dir) {
                Ok(()) => {
                    info!("{} plugin was removed successfully.", name);
                    outcomes.push(UninstallOutcome::Removed { name });
                }
                Err(e) => {
                    error!("{}", e);
                    outcomes.push(UninstallOutcome::Failed {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    /// Installed plugins with their descriptions and tracking status
    pub async fn list(&self) -> Result<Vec<InstalledPlugin>, PluginError> {
        let names = self.paths.plugin_names()?;
        if names.is_empty() {
            info!("No plugins installed.");
            return Ok(Vec::new());
        }
        let sources = self.repositories()?.list()?;

        let mut plugins = Vec::with_capacity(names.len());
        for name in names {
            let location = self.paths.resolve(Some(&name))?;
            let plugin = if self.vcs.is_managed(&location) {
                self.describe_managed(name, location).await
            } else {
                self.describe_unmanaged(name, location, &sources).await
            };
            plugins.push(plugin);
        }
        Ok(plugins)
    }

    async fn describe_managed(&self, name: String, location: PathBuf) -> InstalledPlugin {
        let remotes = match self.vcs.remotes(&location) {
            Ok(lines) => parse_remote_urls(&lines),
            Err(e) => {
                warn!(plugin = %name, error = %e, "Unable to read plugin remotes");
                Vec::new()
            }
        };

        for remote in remotes {
            let Ok(url) = Url::parse(&normalize_remote(&remote)) else {
                debug!(plugin = %name, remote = %remote, "Remote is not a URL");
                continue;
            };
            let Some((repository, plugin)) = split_repository_url(&url) else {
                continue;
            };
            if let Some(title) = self.validator.is_valid_plugin(&repository, &plugin).await {
                return InstalledPlugin {
                    name,
                    location,
                    description: Some(title_description(&title)),
                    status: PluginStatus::Managed { remote },
                };
            }
        }

        warn!("{} plugin remote is not a known plugin repository.", name);
        InstalledPlugin {
            name,
            location,
            description: None,
            status: PluginStatus::Unverified,
        }
    }

    async fn describe_unmanaged(
        &self,
        name: String,
        location: PathBuf,
        sources: &[String],
    ) -> InstalledPlugin {
        warn!("{} plugin is not a Git repository and cannot be updated.", name);

        let mut description = None;
        for source in sources {
            let url = format!("{}/{}", source, name);
            if self.validator.probe(&url).await {
                description = self
                    .validator
                    .is_valid_plugin(source, &name)
                    .await
                    .map(|title| title_description(&title));
                break;
            }
        }

        InstalledPlugin {
            name,
            location,
            description,
            status: PluginStatus::Unmanaged,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
