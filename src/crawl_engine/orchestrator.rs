//! End-to-end localization run: inventory → crawl waves → rewrite → report.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{info, warn};

use super::fetcher::Fetcher;
use super::{inventory, scheduler};
use crate::config::LocalizeConfig;
use crate::registry::AssetRegistry;
use crate::report::{self, RunSummary};
use crate::rewriter;
use crate::url_scan::DomainClassifier;

/// Run the full pipeline over the configured site root.
///
/// Per-URL fetch failures never abort the run; they surface in the returned
/// summary (and the report) while everything that did download is still
/// rewritten. Re-running over an already-localized site is a no-op.
pub async fn run_localization(config: &LocalizeConfig) -> Result<RunSummary> {
    let classifier = DomainClassifier::new(config.target_domains());
    let mut registry = AssetRegistry::new(config.assets_dir());

    let html_files =
        inventory::discover_html_files(config.site_root(), config.assets_dir()).await?;
    if html_files.is_empty() {
        warn!(
            "no HTML files found under {}",
            config.site_root().display()
        );
    }
    info!("scanning {} HTML pages", html_files.len());
    let inventory = inventory::collect_inventory(html_files, &classifier).await?;
    info!(
        "inventory: {} URLs, {} to localize, {} external",
        inventory.all_tokens.len(),
        inventory.target_tokens.len(),
        inventory.external_tokens.len()
    );

    let mut seeds = Vec::new();
    for token in &inventory.target_tokens {
        let canonical = registry.observe_token(token)?;
        if registry.enqueue_if_new(&canonical) {
            seeds.push(canonical);
        }
    }

    let fetcher = Fetcher::new(
        config.user_agent(),
        config.fetch_timeout(),
        config.retry().clone(),
    )?;
    let outcome = scheduler::run_waves(
        config.site_root(),
        config.concurrency(),
        &fetcher,
        &classifier,
        &mut registry,
        seeds,
    )
    .await?;

    registry.finalize_variants();

    // Rewrite pass covers the original pages plus every downloaded text asset
    // that referenced target URLs.
    let mut work: BTreeMap<PathBuf, BTreeSet<String>> = inventory.file_tokens.clone();
    for (path, tokens) in &outcome.file_tokens {
        work.entry(path.clone())
            .or_default()
            .extend(tokens.iter().cloned());
    }
    let changed = rewriter::rewrite_files(config.site_root(), &work, &registry).await?;
    info!("rewrote {} files", changed.len());

    let mut discovered: BTreeSet<String> = inventory.target_tokens.clone();
    for tokens in outcome.file_tokens.values() {
        discovered.extend(tokens.iter().cloned());
    }

    let summary = RunSummary {
        total_urls: inventory.all_tokens.len(),
        target_in_html: inventory.target_tokens.len(),
        external: inventory.external_tokens.len(),
        discovered_targets: discovered.len(),
        downloaded: outcome.downloaded,
        waves: outcome.waves,
        failures: outcome.failures,
        changed_files: changed
            .iter()
            .map(|path| relative_display(config.site_root(), path))
            .collect(),
    };

    report::write_asset_map(config.site_root(), &registry).await?;
    report::write_classification(
        config.site_root(),
        &inventory.target_tokens,
        &inventory.external_tokens,
    )
    .await?;
    report::write_report(
        config.site_root(),
        config.assets_dir(),
        &summary,
        &classifier,
        &inventory.html_files,
    )
    .await?;

    if !summary.is_success() {
        warn!("{} URLs failed to localize", summary.failures.len());
    }
    Ok(summary)
}

fn relative_display(site_root: &Path, path: &Path) -> String {
    path.strip_prefix(site_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
