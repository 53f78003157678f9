//! tpm - Terminus plugin manager
//!
//! Install, update, list, remove and search Terminus plugins.

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tpm::config;
use tpm::plugins::{PluginManager, PluginStatus};

#[derive(Parser)]
#[command(name = "tpm")]
#[command(author, version, about = "Terminus plugin manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install plugins from Git repository URLs or registry names
    #[command(visible_alias = "add")]
    Install {
        /// Plugin names or URLs to plugin Git repositories
        #[arg(required = true, value_name = "PLUGIN")]
        plugins: Vec<String>,
    },

    /// List installed plugins
    #[command(visible_alias = "list")]
    Show,

    /// Update installed plugins
    #[command(visible_alias = "up")]
    Update {
        /// `all` or one or more installed plugin names
        #[arg(required = true, value_name = "PLUGIN")]
        plugins: Vec<String>,
    },

    /// Remove installed plugins
    #[command(visible_alias = "remove")]
    Uninstall {
        /// Installed plugin names
        #[arg(required = true, value_name = "PLUGIN")]
        plugins: Vec<String>,
    },

    /// Search the plugin registry
    #[command(visible_alias = "find")]
    Search {
        /// Partial or complete plugin name
        query: String,
    },

    /// Manage known plugin repositories
    #[command(subcommand, visible_alias = "repo")]
    Repository(RepositoryCommands),
}

#[derive(Subcommand)]
enum RepositoryCommands {
    /// List known plugin repositories
    List,

    /// Add a repository, e.g. `https://github.com pantheon-systems`
    Add {
        /// Git host URL
        host: String,
        /// Organization or group path under the host
        path: String,
    },

    /// Remove a repository by its full URL
    Remove {
        /// Repository URL, e.g. `https://github.com/pantheon-systems`
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "tpm=debug" } else { "tpm=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .without_time(),
        )
        .init();

    let config = config::load_config()?;
    let manager = PluginManager::new(&config)?;

    match cli.command {
        Commands::Install { plugins } => {
            manager.install(&plugins).await?;
        }
        Commands::Show => cmd_show(&manager).await?,
        Commands::Update { plugins } => {
            manager.update(&plugins).await?;
        }
        Commands::Uninstall { plugins } => {
            manager.uninstall(&plugins).await?;
        }
        Commands::Search { query } => cmd_search(&manager, &query).await?,
        Commands::Repository(command) => cmd_repository(&manager, command)?,
    }
    Ok(())
}

/// List installed plugins
async fn cmd_show(manager: &PluginManager) -> anyhow::Result<()> {
    let plugins = manager.list().await?;
    if plugins.is_empty() {
        return Ok(());
    }

    info!(
        "Plugins are installed in {}.",
        manager.paths().root_display()
    );
    info!("The following plugins are installed:");

    let rows: Vec<Vec<String>> = plugins
        .iter()
        .map(|plugin| {
            let name = match plugin.status {
                PluginStatus::Managed { .. } => plugin.name.clone(),
                PluginStatus::Unverified => format!("{} ( unverified )", plugin.name),
                PluginStatus::Unmanaged => format!("{} ( not a Git repository )", plugin.name),
            };
            vec![
                name,
                plugin.location.display().to_string(),
                plugin.description.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["Name", "Location", "Description"], &rows);

    info!("Use 'tpm search' to find more plugins.");
    info!("Use 'tpm install' to add more plugins.");
    Ok(())
}

/// Search the registry and print matches
async fn cmd_search(manager: &PluginManager, query: &str) -> anyhow::Result<()> {
    let plugins = manager.search(query).await?;
    if plugins.is_empty() {
        info!("No plugins were found.");
        return Ok(());
    }

    info!("The following plugins were found:");
    let rows: Vec<Vec<String>> = plugins
        .iter()
        .map(|plugin| {
            let package = if plugin.installed {
                format!("{} ( installed )", plugin.package)
            } else {
                plugin.package.clone()
            };
            vec![
                package,
                plugin.title.clone(),
                plugin.description.clone(),
                plugin.author(),
            ]
        })
        .collect();
    print_table(&["Package", "Title", "Description", "Author"], &rows);
    Ok(())
}

/// Manage repositories.yml
fn cmd_repository(manager: &PluginManager, command: RepositoryCommands) -> anyhow::Result<()> {
    let store = manager.repositories()?;
    match command {
        RepositoryCommands::List => {
            let urls = store.list()?;
            if urls.is_empty() {
                info!("No plugin repositories configured in {}.", store.path().display());
            }
            for url in urls {
                println!("{}", url);
            }
        }
        RepositoryCommands::Add { host, path } => {
            if let Err(e) = store.add(&host, &path) {
                error!("{}", e);
            }
        }
        RepositoryCommands::Remove { url } => {
            if let Err(e) = store.remove(&url) {
                error!("{}", e);
            }
        }
    }
    Ok(())
}

/// Print rows as a left-aligned text table
fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    println!("{}", line(headers.to_vec()));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}
