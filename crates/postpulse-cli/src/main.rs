mod scan;

use clap::{Parser, Subcommand};
use postpulse_core::{Provider, ScanOptions, ScanStatus};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "postpulse")]
#[command(about = "Social post ingestion and engagement scans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scan and print the finished record as JSON
    Scan {
        /// User whose credentials and posts are scanned
        #[arg(long)]
        user: String,
        /// Provider to include (tiktok, instagram, youtube); repeatable
        #[arg(long = "provider", required = true)]
        providers: Vec<Provider>,
        /// How many days back to collect posts
        #[arg(long, default_value = "30")]
        lookback_days: u32,
        /// Competitor handle or channel id to include; repeatable
        #[arg(long = "competitor")]
        competitors: Vec<String>,
        /// Skip the user's own posts
        #[arg(long)]
        no_own_posts: bool,
        /// `UTC` or a fixed offset such as `-05:00` for peak-time buckets
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
    /// Drop cached posts and analytics for one user on one provider
    Invalidate {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: Provider,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = postpulse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let orchestrator = scan::build_orchestrator(&config)?;
    let _scheduler = postpulse_engine::build_cleanup_scheduler(orchestrator.clone()).await?;

    match cli.command {
        Commands::Scan {
            user,
            providers,
            lookback_days,
            competitors,
            no_own_posts,
            timezone,
        } => {
            let options = ScanOptions {
                providers,
                lookback_days,
                competitor_ids: competitors,
                include_own_posts: !no_own_posts,
                timezone,
            };
            let scan = scan::run_scan(&orchestrator, &user, options).await?;
            println!("{}", serde_json::to_string_pretty(&scan)?);
            if scan.status == ScanStatus::Failed {
                anyhow::bail!(
                    "scan {} failed: {}",
                    scan.id,
                    scan.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Commands::Invalidate { user, provider } => {
            let removed = orchestrator.invalidate_user_cache(provider, &user);
            println!("removed {removed} cached entries for {user} on {provider}");
        }
    }

    Ok(())
}
