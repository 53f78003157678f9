//! Remote plugin registry search.
//!
//! The registry answers `GET <endpoint>?package=<fragment>` with either a JSON
//! array of plugin records or an object mapping arbitrary ids to records. The
//! server-side filter is advisory: results are filtered again here by
//! matching the fragment against each record's `package`.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::paths::PathResolver;
use crate::plugins::PluginError;
use crate::web::DocumentFetcher;

/// A plugin as published in the registry
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct PluginRecord {
    /// Package name, also the install directory name
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub creator_email: Option<String>,
    /// Git repository URL to clone from
    #[serde(default)]
    pub repo: String,
    /// Whether the package is present under the plugin root
    #[serde(skip)]
    pub installed: bool,
}

impl PluginRecord {
    /// `creator <email>`, or just the creator when no email is published
    pub fn author(&self) -> String {
        match self.creator_email.as_deref().filter(|e| !e.trim().is_empty()) {
            Some(email) => format!("{} <{}>", self.creator, email),
            None => self.creator.clone(),
        }
    }
}

/// Searches the registry and marks installed packages
#[derive(Clone)]
pub struct RegistrySearch {
    fetcher: Arc<dyn DocumentFetcher>,
    endpoint: String,
    paths: PathResolver,
}

impl RegistrySearch {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, endpoint: &str, paths: PathResolver) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.to_string(),
            paths,
        }
    }

    /// Records whose package matches `query`, in registry order.
    ///
    /// Transport failures and unparseable responses yield an empty list;
    /// only an unusable endpoint or plugin root is an error.
    pub async fn search(&self, query: &str) -> Result<Vec<PluginRecord>, PluginError> {
        let url = Url::parse_with_params(&self.endpoint, &[("package", query)]).map_err(|e| {
            PluginError::Config(format!("Invalid registry URL {}: {}", self.endpoint, e))
        })?;

        let body = match self.fetcher.get(url.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Registry request failed");
                return Ok(Vec::new());
            }
        };

        let matcher = PackageMatcher::new(query);
        let mut results = Vec::new();
        for (id, mut record) in parse_records(&body) {
            if !matcher.is_match(&record.package) {
                debug!(id = %id, package = %record.package, "Registry result does not match query");
                continue;
            }
            record.installed = self.paths.is_installed(&record.package)?;
            results.push(record);
        }
        debug!(query = %query, count = results.len(), "Registry search complete");
        Ok(results)
    }
}

/// Query matcher; queries that are not valid patterns match literally
enum PackageMatcher {
    Pattern(Regex),
    Literal(String),
}

impl PackageMatcher {
    fn new(query: &str) -> Self {
        match Regex::new(query) {
            Ok(re) => Self::Pattern(re),
            Err(_) => Self::Literal(query.to_string()),
        }
    }

    fn is_match(&self, package: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(package),
            Self::Literal(text) => package.contains(text.as_str()),
        }
    }
}

/// Registry records paired with their ids, in response order
pub fn parse_records(body: &str) -> Vec<(String, PluginRecord)> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Unparseable registry response");
            return Vec::new();
        }
    };

    let entries: Vec<(String, Value)> = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (i.to_string(), item))
            .collect(),
        Value::Object(map) => map.into_iter().collect(),
        _ => {
            warn!("Registry response is neither a list nor an object");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(id, item)| match serde_json::from_value::<PluginRecord>(item) {
            Ok(record) if !record.package.is_empty() => Some((id, record)),
            Ok(_) => {
                debug!(id = %id, "Registry record without package");
                None
            }
            Err(e) => {
                debug!(id = %id, error = %e, "Skipping malformed registry record");
                None
            }
        })
        .collect()
}
