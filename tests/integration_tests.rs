//! End-to-end tests for the plugin manager
//!
//! These drive `PluginManager` over real HTTP (a wiremock server standing in
//! for both the registry and the Git host's plugin pages) and a real plugin
//! root on disk. Clones go through a recording Git fake, except in the
//! `git_cli` module, which uses the `git` binary when it is available.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tpm::config::{PathConfig, PlatformKind, PolicyConfig};
use tpm::paths::PathResolver;
use tpm::plugins::{
    InstallOutcome, PluginError, PluginManager, PluginStatus, UninstallOutcome, UpdateOutcome,
};
use tpm::repositories::{RepositorySource, RepositoryStore, REPOSITORIES_HEADER};
use tpm::vcs::{GitCli, LocalFilesystem, VersionControl};
use tpm::web::HttpFetcher;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Git fake that records clones and materializes a checkout
#[derive(Default)]
struct RecordingGit {
    clones: Mutex<Vec<String>>,
    pulls: Mutex<Vec<PathBuf>>,
    remotes: Mutex<Vec<String>>,
}

impl VersionControl for RecordingGit {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<Vec<String>, PluginError> {
        fs::create_dir_all(dest.join(".git")).map_err(|e| PluginError::Io(e.to_string()))?;
        self.clones.lock().unwrap().push(url.to_string());
        Ok(vec![format!("Cloning into '{}'...", dest.display())])
    }

    fn pull(&self, dir: &Path) -> Result<Vec<String>, PluginError> {
        self.pulls.lock().unwrap().push(dir.to_path_buf());
        Ok(vec!["Already up to date.".to_string()])
    }

    fn remotes(&self, _dir: &Path) -> Result<Vec<String>, PluginError> {
        Ok(self.remotes.lock().unwrap().clone())
    }
}

struct Env {
    server: MockServer,
    root: TempDir,
    git: Arc<RecordingGit>,
    manager: PluginManager,
}

impl Env {
    async fn new() -> Self {
        Self::with_policy(PolicyConfig::default()).await
    }

    async fn with_policy(policy: PolicyConfig) -> Self {
        let server = MockServer::start().await;
        let root = TempDir::new().expect("Failed to create temp dir");
        let paths = PathResolver::new(&PathConfig {
            plugins_root_override: Some(root.path().to_string_lossy().to_string()),
            home_dir: None,
            platform: PlatformKind::Posix,
        })
        .unwrap();
        let git = Arc::new(RecordingGit::default());
        let manager = PluginManager::with_parts(
            paths,
            Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap()),
            git.clone(),
            Arc::new(LocalFilesystem),
            &format!("{}/plugins.json", server.uri()),
            policy,
        );
        Self {
            server,
            root,
            git,
            manager,
        }
    }

    /// Serve a plugin page at `/<org>/<name>` with the given title
    async fn plugin_page(&self, org: &str, name: &str, title: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/{}/{}", org, name)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<!DOCTYPE html><html><head><title>{}</title></head><body></body></html>",
                title
            )))
            .mount(&self.server)
            .await;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.server.uri(), path)
    }

    fn plugin_dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

fn args<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().map(|s| s.as_ref().to_string()).collect()
}

// ============================================================================
// INSTALL
// ============================================================================

mod install {
    use super::*;

    #[tokio::test]
    async fn test_install_from_repository_url() {
        let env = Env::new().await;
        env.plugin_page("acme", "seo-plugin", "acme/seo-plugin: Terminus plugin for SEO")
            .await;

        let url = env.url("acme/seo-plugin");
        let outcomes = env.manager.install(&args(&[&url])).await.unwrap();

        assert!(
            matches!(&outcomes[..], [InstallOutcome::Installed { name, output }]
                if name == "seo-plugin" && output.len() == 1),
            "unexpected outcomes: {:?}",
            outcomes
        );
        assert_eq!(env.git.clones.lock().unwrap().as_slice(), [url]);
        assert!(env.plugin_dir("seo-plugin").join(".git").is_dir());
    }

    #[tokio::test]
    async fn test_install_rejects_unrelated_repository() {
        let env = Env::new().await;
        env.plugin_page("acme", "website", "acme/website: the company site")
            .await;

        let outcomes = env
            .manager
            .install(&args(&[&env.url("acme/website")]))
            .await
            .unwrap();
        assert!(matches!(&outcomes[..], [InstallOutcome::Invalid { .. }]));
        assert!(env.git.clones.lock().unwrap().is_empty());
        assert!(!env.plugin_dir("website").exists());
    }

    #[tokio::test]
    async fn test_keyword_gate_can_be_relaxed() {
        let env = Env::with_policy(PolicyConfig {
            require_title_keywords: false,
            ..Default::default()
        })
        .await;
        env.plugin_page("acme", "website", "acme/website: the company site")
            .await;

        let outcomes = env
            .manager
            .install(&args(&[&env.url("acme/website")]))
            .await
            .unwrap();
        assert!(matches!(&outcomes[..], [InstallOutcome::Installed { .. }]));
    }

    #[tokio::test]
    async fn test_install_missing_repository_page() {
        let env = Env::new().await;
        Mock::given(method("GET"))
            .and(path("/acme/not-a-real-thing"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&env.server)
            .await;

        let outcomes = env
            .manager
            .install(&args(&[&env.url("acme/not-a-real-thing")]))
            .await
            .unwrap();
        assert!(matches!(&outcomes[..], [InstallOutcome::Invalid { .. }]));
        assert!(env.git.clones.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_by_registry_name() {
        let env = Env::new().await;
        Mock::given(method("GET"))
            .and(path("/plugins.json"))
            .and(query_param("package", "seo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "12": {"package": "seo-plugin", "title": "SEO", "description": "Audits",
                           "creator": "Ann", "repo": "https://github.com/acme/seo-plugin"},
                    "7": {"package": "seo-helper", "title": "SEO helper", "description": "Helps",
                          "creator": "Bo", "creator_email": "bo@example.com",
                          "repo": "https://github.com/acme/seo-helper"}
                }"#,
            ))
            .mount(&env.server)
            .await;
        fs::create_dir(env.plugin_dir("seo-plugin")).unwrap();

        let outcomes = env.manager.install(&args(&["seo"])).await.unwrap();

        assert_eq!(
            outcomes[0],
            InstallOutcome::AlreadyInstalled {
                name: "seo-plugin".to_string()
            }
        );
        assert!(matches!(&outcomes[1], InstallOutcome::Installed { name, .. } if name == "seo-helper"));
        assert_eq!(
            env.git.clones.lock().unwrap().as_slice(),
            ["https://github.com/acme/seo-helper"]
        );
    }

    #[tokio::test]
    async fn test_install_by_name_registry_down() {
        let env = Env::new().await;
        Mock::given(method("GET"))
            .and(path("/plugins.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&env.server)
            .await;

        let outcomes = env.manager.install(&args(&["seo"])).await.unwrap();
        assert_eq!(
            outcomes,
            vec![InstallOutcome::NoMatches {
                query: "seo".to_string()
            }]
        );
    }
}

// ============================================================================
// SEARCH
// ============================================================================

mod search {
    use super::*;

    #[tokio::test]
    async fn test_search_refilters_ignored_query() {
        let env = Env::new().await;
        // Registry ignores the package filter and returns everything
        Mock::given(method("GET"))
            .and(path("/plugins.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[
                    {"package": "backups", "title": "Backups", "description": "", "creator": "Cy",
                     "repo": "https://github.com/acme/backups"},
                    {"package": "seo-helper", "title": "SEO helper", "description": "Helps",
                     "creator": "Bo", "repo": "https://github.com/acme/seo-helper"},
                    {"package": "seo-plugin", "title": "SEO", "description": "Audits",
                     "creator": "Ann", "repo": "https://github.com/acme/seo-plugin"}
                ]"#,
            ))
            .mount(&env.server)
            .await;
        fs::create_dir(env.plugin_dir("seo-plugin")).unwrap();

        let results = env.manager.search("seo").await.unwrap();
        let summary: Vec<(&str, bool)> = results
            .iter()
            .map(|r| (r.package.as_str(), r.installed))
            .collect();
        assert_eq!(summary, [("seo-helper", false), ("seo-plugin", true)]);
    }

    #[tokio::test]
    async fn test_search_with_html_response_is_empty() {
        let env = Env::new().await;
        Mock::given(method("GET"))
            .and(path("/plugins.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&env.server)
            .await;

        assert!(env.manager.search("seo").await.unwrap().is_empty());
    }
}

// ============================================================================
// UPDATE / UNINSTALL
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_update_all_with_nothing_installed() {
        let env = Env::new().await;
        env.manager.repositories().unwrap().load().unwrap();

        let outcomes = env.manager.update(&args(&["all"])).await.unwrap();
        assert!(outcomes.is_empty());
        assert!(env.git.pulls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_all_skips_unmanaged() {
        let env = Env::new().await;
        fs::create_dir_all(env.plugin_dir("managed").join(".git")).unwrap();
        fs::create_dir(env.plugin_dir("adhoc")).unwrap();

        let outcomes = env.manager.update(&args(&["all"])).await.unwrap();
        assert_eq!(
            outcomes,
            vec![
                UpdateOutcome::Unmanaged {
                    name: "adhoc".to_string()
                },
                UpdateOutcome::Updated {
                    name: "managed".to_string(),
                    output: vec!["Already up to date.".to_string()]
                },
            ]
        );
        assert_eq!(env.git.pulls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_install_then_uninstall() {
        let env = Env::new().await;
        env.plugin_page("acme", "backups", "Terminus plugin: backups").await;

        env.manager
            .install(&args(&[&env.url("acme/backups")]))
            .await
            .unwrap();
        assert!(env.plugin_dir("backups").is_dir());

        let outcomes = env
            .manager
            .uninstall(&args(&["backups", "backups"]))
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                UninstallOutcome::Removed {
                    name: "backups".to_string()
                },
                UninstallOutcome::NotInstalled {
                    name: "backups".to_string()
                },
            ]
        );
        assert!(!env.plugin_dir("backups").exists());
    }
}

// ============================================================================
// SHOW
// ============================================================================

mod show {
    use super::*;

    #[tokio::test]
    async fn test_show_unmanaged_directory() {
        let env = Env::new().await;
        fs::create_dir(env.plugin_dir("foo")).unwrap();

        let plugins = env.manager.list().await.unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "foo");
        assert_eq!(plugins[0].status, PluginStatus::Unmanaged);
    }

    #[tokio::test]
    async fn test_show_describes_managed_plugin_from_remote() {
        let env = Env::new().await;
        env.plugin_page("acme", "seo-plugin", "acme/seo-plugin: Terminus plugin for SEO")
            .await;
        fs::create_dir_all(env.plugin_dir("seo-plugin").join(".git")).unwrap();
        env.git.remotes.lock().unwrap().extend([
            format!("origin\t{} (fetch)", env.url("acme/seo-plugin.git")),
            format!("origin\t{} (push)", env.url("acme/seo-plugin.git")),
        ]);

        let plugins = env.manager.list().await.unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(
            plugins[0].description.as_deref(),
            Some("Terminus plugin for SEO")
        );
        assert!(matches!(plugins[0].status, PluginStatus::Managed { .. }));
    }

    #[tokio::test]
    async fn test_show_uses_known_repositories_for_unmanaged() {
        let env = Env::new().await;
        env.plugin_page("acme", "foo", "acme/foo: Terminus plugin foo").await;
        fs::create_dir(env.plugin_dir("foo")).unwrap();
        env.manager
            .repositories()
            .unwrap()
            .add(&env.server.uri(), "acme")
            .unwrap();

        let plugins = env.manager.list().await.unwrap();
        assert_eq!(plugins[0].status, PluginStatus::Unmanaged);
        assert_eq!(
            plugins[0].description.as_deref(),
            Some("Terminus plugin foo")
        );
    }
}

// ============================================================================
// REPOSITORIES
// ============================================================================

mod repositories {
    use super::*;

    #[test]
    fn test_repository_file_lives_in_plugin_root() {
        let root = TempDir::new().unwrap();
        let store = RepositoryStore::new(root.path());
        assert!(store.load().unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(root.path().join("repositories.yml")).unwrap(),
            REPOSITORIES_HEADER
        );

        let sources = vec![
            RepositorySource::new("https://github.com", vec!["pantheon-systems".to_string()]),
            RepositorySource::new("https://gitlab.com", vec!["a".to_string(), "b".to_string()]),
        ];
        store.save(&sources).unwrap();
        assert_eq!(RepositoryStore::new(root.path()).load().unwrap(), sources);
    }
}

// ============================================================================
// REAL GIT
// ============================================================================

mod git_cli {
    use super::*;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(["-c", "user.name=tpm", "-c", "user.email=tpm@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .expect("Failed to run git");
        assert!(output.status.success(), "git {:?} failed", args);
    }

    #[test]
    fn test_clone_pull_and_remotes() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let work = TempDir::new().unwrap();
        let upstream = work.path().join("upstream");
        fs::create_dir(&upstream).unwrap();
        git(&upstream, &["init", "-q"]);
        fs::write(upstream.join("README.md"), "plugin").unwrap();
        git(&upstream, &["add", "README.md"]);
        git(&upstream, &["commit", "-q", "-m", "init"]);

        let dest = work.path().join("plugins").join("my-plugin");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        let upstream_url = upstream.to_string_lossy().to_string();

        GitCli.clone_repo(&upstream_url, &dest).unwrap();
        assert!(GitCli.is_managed(&dest));
        assert!(dest.join("README.md").is_file());

        let remotes = tpm::vcs::parse_remote_urls(&GitCli.remotes(&dest).unwrap());
        assert_eq!(remotes, vec![upstream_url]);

        fs::write(upstream.join("CHANGELOG.md"), "v2").unwrap();
        git(&upstream, &["add", "CHANGELOG.md"]);
        git(&upstream, &["commit", "-q", "-m", "v2"]);
        GitCli.pull(&dest).unwrap();
        assert!(dest.join("CHANGELOG.md").is_file());
    }

    #[test]
    fn test_clone_failure_surfaces_git_message() {
        if !git_available() {
            return;
        }
        let work = TempDir::new().unwrap();
        let result = GitCli.clone_repo(
            &work.path().join("nope").to_string_lossy(),
            &work.path().join("dest"),
        );
        match result {
            Err(PluginError::Transport(message)) => assert!(message.starts_with("git clone failed")),
            other => panic!("expected transport error, got {:?}", other),
        }
    }
}
