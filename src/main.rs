// Magpie - evidence-backed AI code review
// Main entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use magpie::cache::CacheStore;
use magpie::config::load_config;
use magpie::platform::{ChangeSource, GitHubClient, GitLabClient};
use magpie::provider::{AiReviewer, OpenRouterClient};
use magpie::review::ReviewOrchestrator;
use magpie::tools::{FileReaderTool, GitHistoryTool, LinterTool, ToolRegistry};

#[derive(Parser)]
#[command(name = "magpie", version, about = "AI code review for pull and merge requests")]
struct Cli {
    /// Path to the config file (defaults to .ai-review.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull/merge request and post the results
    Review {
        /// Hosting platform to talk to
        #[arg(long, value_enum)]
        platform: Platform,

        /// PR number / MR iid; falls back to GITHUB_PR_NUMBER or
        /// CI_MERGE_REQUEST_IID
        #[arg(long)]
        id: Option<String>,

        /// Repository checkout the evidence tools run against
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,
    },

    /// Manage the on-disk review cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every cache entry
    Clear,
    /// Delete expired and unreadable entries
    ClearExpired,
}

#[derive(Clone, Copy, ValueEnum)]
enum Platform {
    Github,
    Gitlab,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Review {
            platform,
            id,
            repo_path,
        } => {
            if !config.enabled {
                info!("AI reviewer is disabled in configuration");
                return Ok(());
            }

            let (source, id): (Arc<dyn ChangeSource>, String) = match platform {
                Platform::Github => {
                    let id = match id.or_else(|| std::env::var("GITHUB_PR_NUMBER").ok()) {
                        Some(id) => id,
                        None => anyhow::bail!("No PR number: pass --id or set GITHUB_PR_NUMBER"),
                    };
                    (Arc::new(GitHubClient::from_env()?), id)
                }
                Platform::Gitlab => {
                    let id = match id.or_else(|| std::env::var("CI_MERGE_REQUEST_IID").ok()) {
                        Some(id) => id,
                        None => {
                            anyhow::bail!("No MR iid: pass --id or set CI_MERGE_REQUEST_IID")
                        }
                    };
                    (Arc::new(GitLabClient::from_env()?), id)
                }
            };

            let provider = Arc::new(OpenRouterClient::from_env(&config.provider)?);
            if !provider.test_connection().await {
                anyhow::bail!("Cannot reach the AI provider; check OPENROUTER_API_KEY");
            }

            let mut registry = ToolRegistry::new();
            registry.register(Arc::new(LinterTool::new(repo_path.clone())));
            registry.register(Arc::new(GitHistoryTool::new(repo_path.clone())));
            registry.register(Arc::new(FileReaderTool::new(repo_path)));

            let cache = CacheStore::new(&config.cache.dir, config.cache.ttl_days)?;

            let orchestrator = ReviewOrchestrator::new(
                source,
                provider,
                Arc::new(registry),
                cache,
                config.clone(),
            );

            let stats = orchestrator.review_pull_request(&id).await?;
            info!(
                "Done: {} files reviewed, {} comments posted",
                stats.files_reviewed, stats.total_comments
            );
        }

        Command::Cache { action } => {
            let cache = CacheStore::new(&config.cache.dir, config.cache.ttl_days)?;
            match action {
                CacheAction::Clear => {
                    let removed = cache.clear()?;
                    info!("Cache cleared ({} entries removed)", removed);
                }
                CacheAction::ClearExpired => {
                    let removed = cache.clear_expired();
                    if removed == 0 {
                        info!("No expired cache entries");
                    } else {
                        info!("Removed {} expired cache entries", removed);
                    }
                }
            }
        }
    }

    Ok(())
}
