//! Configuration loader for tpm.
//!
//! Loads configuration from:
//! 1. Default values
//! 2. `~/.terminus/tpm.yaml` in the home directory
//! 3. Environment variables with the `TPM__` prefix (`TPM__REGISTRY__URL`, ...)
//! 4. `TERMINUS_PLUGINS_DIR`, the plugin root override Terminus itself honors
//!
//! Platform and home directory are resolved once here and handed to the
//! [`PathResolver`](crate::paths::PathResolver) as a [`PathConfig`].

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Registry queried by `search` and by name installs
pub const DEFAULT_REGISTRY_URL: &str = "http://dev-terminus-plugins.pantheonsite.io/plugins.json";

/// Environment variable overriding the plugin root
pub const PLUGINS_DIR_ENV: &str = "TERMINUS_PLUGINS_DIR";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Plugin root override (normally from `TERMINUS_PLUGINS_DIR`)
    #[serde(default)]
    pub plugins_dir: Option<String>,
}

/// Remote registry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Timeout for every HTTP request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Behaviors that differed between historical releases of the plugin command.
///
/// Both default to the newer, more complete behavior.
#[derive(Debug, Deserialize, Clone)]
pub struct PolicyConfig {
    /// Require "terminus" and "plugin" in a plugin page title
    #[serde(default = "default_true")]
    pub require_title_keywords: bool,
    /// Allow `install <name>` to resolve names through the registry
    #[serde(default = "default_true")]
    pub allow_registry_name_install: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_title_keywords: true,
            allow_registry_name_install: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Host platform flavor, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Posix,
    /// Windows with a native shell; home comes from `HOMEPATH`
    WindowsNative,
    /// Windows under an MSYS/MinGW shell; home comes from `HOME`
    WindowsPosixEmu,
}

impl PlatformKind {
    /// Detect the platform of the running process
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::from_msystem(std::env::var("MSYSTEM").ok().as_deref())
        } else {
            Self::Posix
        }
    }

    /// Classify a Windows host by its `MSYSTEM` value
    pub fn from_msystem(msystem: Option<&str>) -> Self {
        match msystem {
            Some(system) if system.to_uppercase().starts_with("MING") => Self::WindowsPosixEmu,
            _ => Self::WindowsNative,
        }
    }

    /// Path separator used when rendering the plugin root
    pub fn separator(&self) -> char {
        match self {
            Self::Posix => '/',
            Self::WindowsNative | Self::WindowsPosixEmu => '\\',
        }
    }

    /// Environment variable holding the user's home directory
    pub fn home_var(&self) -> &'static str {
        match self {
            Self::Posix | Self::WindowsPosixEmu => "HOME",
            Self::WindowsNative => "HOMEPATH",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::Posix => write!(f, "posix"),
            PlatformKind::WindowsNative => write!(f, "windows"),
            PlatformKind::WindowsPosixEmu => write!(f, "windows-msys"),
        }
    }
}

/// Everything the path resolver needs, gathered once
#[derive(Debug, Clone)]
pub struct PathConfig {
    pub plugins_root_override: Option<String>,
    pub home_dir: Option<PathBuf>,
    pub platform: PlatformKind,
}

impl AppConfig {
    /// Build the path configuration from this config and the process environment
    pub fn path_config(&self) -> PathConfig {
        let platform = PlatformKind::detect();
        let home_dir = std::env::var_os(platform.home_var())
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::home_dir);
        PathConfig {
            plugins_root_override: self.plugins_dir.clone().filter(|d| !d.is_empty()),
            home_dir,
            platform,
        }
    }
}

fn builder_with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("registry.url", DEFAULT_REGISTRY_URL)?
        .set_default("registry.timeout_secs", 30)?
        .set_default("policy.require_title_keywords", true)?
        .set_default("policy.allow_registry_name_install", true)
}

/// Load configuration from defaults, the home config file and the environment
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut builder = builder_with_defaults()?;

    // Load from home directory config file
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".terminus").join("tpm.yaml");
        if home_config.exists() {
            builder = builder.add_source(File::from(home_config).required(false));
        }
    }

    // e.g., TPM__REGISTRY__URL=http://localhost:8080/plugins.json
    builder = builder.add_source(
        Environment::with_prefix("TPM")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    if let Ok(dir) = std::env::var(PLUGINS_DIR_ENV) {
        if !dir.is_empty() {
            builder = builder.set_override("plugins_dir", dir)?;
        }
    }

    builder.build()?.try_deserialize()
}

/// Load configuration from defaults and a single file, ignoring the environment
pub fn load_config_from_file(path: &Path) -> Result<AppConfig, ConfigError> {
    builder_with_defaults()?
        .add_source(File::from(path.to_path_buf()))
        .build()?
        .try_deserialize()
}
