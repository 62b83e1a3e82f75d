use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use sitelocal::config::{
    LocalizeConfig, DEFAULT_ASSETS_DIR, DEFAULT_CONCURRENT_FETCHES, DEFAULT_FETCH_TIMEOUT_SECS,
};
use sitelocal::crawl_engine::run_localization;
use sitelocal::{dev_server, search_index};

#[derive(Parser)]
#[command(name = "sitelocal", version, about = "Localize a static HTML export")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download referenced assets and rewrite pages to local paths
    Localize {
        /// Site root containing the exported HTML
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Asset host to localize; repeat for more (defaults built in)
        #[arg(long = "domain")]
        domains: Vec<String>,
        /// Directory name for mirrored assets, relative to the root
        #[arg(long, default_value = DEFAULT_ASSETS_DIR)]
        assets_dir: String,
        /// Concurrent downloads per wave
        #[arg(long, default_value_t = DEFAULT_CONCURRENT_FETCHES)]
        concurrency: usize,
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Build the search index over the rewritten pages
    BuildIndex {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value = DEFAULT_ASSETS_DIR)]
        assets_dir: String,
    },
    /// Serve the localized site with search and form endpoints
    Serve {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value = DEFAULT_ASSETS_DIR)]
        assets_dir: String,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Localize {
            root,
            domains,
            assets_dir,
            concurrency,
            timeout,
        } => {
            let mut builder = LocalizeConfig::builder()
                .site_root(root)
                .assets_dir(assets_dir)
                .concurrency(concurrency)
                .fetch_timeout_secs(timeout);
            if !domains.is_empty() {
                builder = builder.target_domains(domains);
            }
            let config = builder.build()?;
            let summary = run_localization(&config).await?;
            info!(
                "localized {} assets across {} waves, {} files rewritten",
                summary.downloaded,
                summary.waves,
                summary.changed_files.len()
            );
            if !summary.is_success() {
                // Partial failures are reported, not fatal mid-run; the exit
                // code still has to tell automation something went wrong.
                std::process::exit(2);
            }
        }
        Command::BuildIndex { root, assets_dir } => {
            let root = std::path::absolute(&root)?;
            let (path, pages) = search_index::build_index(&root, &assets_dir).await?;
            info!("indexed {pages} pages into {}", path.display());
        }
        Command::Serve {
            root,
            assets_dir,
            host,
            port,
        } => {
            let root = std::path::absolute(&root)?;
            dev_server::serve(root, &assets_dir, &host, port).await?;
        }
    }
    Ok(())
}
