//! Plugin validity checks against a repository's web page.
//!
//! A plugin is valid when `<repository>/<plugin>` serves a page whose
//! `<title>` identifies it as a Terminus plugin.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;
use url::Url;

use crate::web::DocumentFetcher;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

/// Decides whether a repository path hosts an installable plugin
#[derive(Clone)]
pub struct PluginValidator {
    fetcher: Arc<dyn DocumentFetcher>,
    require_title_keywords: bool,
}

impl PluginValidator {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, require_title_keywords: bool) -> Self {
        Self {
            fetcher,
            require_title_keywords,
        }
    }

    /// Return the plugin page title when `repository/plugin` is a valid plugin.
    ///
    /// `repository` must be an absolute URL with a sub-path (an organization
    /// or group); a bare host never qualifies. Any fetch failure is `None`.
    pub async fn is_valid_plugin(&self, repository: &str, plugin: &str) -> Option<String> {
        let base = Url::parse(repository).ok()?;
        if base.cannot_be_a_base() || base.host_str().is_none() {
            return None;
        }
        let path = base.path();
        if path.is_empty() || path == "/" {
            debug!(repository = %repository, "Repository has no sub-path");
            return None;
        }

        let url = format!("{}/{}", repository.trim_end_matches('/'), plugin);
        let body = match self.fetcher.get(&url).await {
            Ok(body) if !body.trim().is_empty() => body,
            Ok(_) => {
                debug!(url = %url, "Empty plugin page");
                return None;
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Plugin page unavailable");
                return None;
            }
        };

        let title = extract_title(&body)?;
        if self.require_title_keywords && !has_plugin_keywords(&title) {
            debug!(url = %url, title = %title, "Title does not name a Terminus plugin");
            return None;
        }
        Some(title)
    }

    /// Whether `url` answers with HTTP 200
    pub async fn probe(&self, url: &str) -> bool {
        matches!(self.fetcher.status(url).await, Ok(200))
    }
}

/// Raw content of the first `<title>` element
pub fn extract_title(document: &str) -> Option<String> {
    TITLE_RE
        .captures(document)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// "terminus" and "plugin" appear anywhere in `title`, ignoring case
pub fn has_plugin_keywords(title: &str) -> bool {
    let title = title.to_lowercase();
    title.contains("terminus") && title.contains("plugin")
}

/// Description part of a plugin title: the text after the first `:`,
/// trimmed and with common HTML entities decoded
pub fn title_description(title: &str) -> String {
    let description = match title.split_once(':') {
        Some((_, description)) => description,
        None => title,
    };
    decode_entities(description.trim())
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
