//! Breadth-first wave scheduler for the asset crawl.
//!
//! Each wave fetches the current frontier with a bounded worker pool, persists
//! the bytes, then re-scans text responses for target URLs to build the next
//! frontier. Discovery only ever appends to the next wave, and all registry
//! mutation happens here on the coordinating side after the wave's pool has
//! drained, so workers share nothing but the fetcher.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info};
use tokio::sync::Semaphore;

use super::fetcher::{FetchError, FetchedAsset, Fetcher};
use crate::registry::AssetRegistry;
use crate::url_scan::{self, DomainClassifier};

/// Extensions treated as text for recursive discovery and rewriting.
pub const TEXT_EXTENSIONS: [&str; 9] = [
    "css", "js", "json", "html", "htm", "txt", "xml", "svg", "map",
];

/// What the crawl produced: per-file target tokens for the rewriter, counts,
/// and the terminal failures.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Downloaded text assets that contained target tokens, keyed by absolute
    /// storage path. Drives the rewrite pass alongside the seed HTML files.
    pub file_tokens: BTreeMap<PathBuf, BTreeSet<String>>,
    pub waves: usize,
    pub downloaded: usize,
    /// Canonical URL → error text for fetches that exhausted their retries.
    pub failures: BTreeMap<String, String>,
}

/// Whether a response should be scanned for more target URLs, by storage
/// extension first and content type second.
#[must_use]
pub fn is_text_asset(storage_path: &str, content_type: &str) -> bool {
    if let Some(ext) = Path::new(storage_path).extension().and_then(|e| e.to_str()) {
        if TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    let ctype = content_type.to_ascii_lowercase();
    ctype.starts_with("text/")
        || ["javascript", "json", "xml", "svg"]
            .iter()
            .any(|marker| ctype.contains(marker))
}

/// Drive the crawl to completion from the seeded frontier.
///
/// The loop terminates because the queued-set check in the registry admits
/// each canonical URL at most once, so the frontier can only shrink once the
/// finite target-domain URL population is exhausted. Individual failures are
/// recorded and never abort the run.
pub async fn run_waves(
    site_root: &Path,
    concurrency: usize,
    fetcher: &Fetcher,
    classifier: &DomainClassifier,
    registry: &mut AssetRegistry,
    seeds: Vec<String>,
) -> Result<CrawlOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut outcome = CrawlOutcome::default();
    let mut frontier = seeds;

    while !frontier.is_empty() {
        outcome.waves += 1;
        let wave = std::mem::take(&mut frontier);
        info!("wave {}: fetching {} URLs", outcome.waves, wave.len());

        let fetches = wave.into_iter().map(|canonical| {
            let fetcher = fetcher.clone();
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            canonical,
                            Err(FetchError::Transport("semaphore closed".into())),
                        );
                    }
                };
                let result = fetcher.fetch(&canonical).await;
                (canonical, result)
            }
        });
        let results = futures::future::join_all(fetches).await;

        // Merge sequentially: registry and frontier mutation stay on the
        // coordinator.
        for (canonical, result) in results {
            match result {
                Ok(asset) => {
                    let discovered = persist_and_discover(
                        site_root,
                        &canonical,
                        &asset,
                        classifier,
                        registry,
                        &mut outcome,
                    )
                    .await?;
                    frontier.extend(discovered);
                }
                Err(error) => {
                    registry.mark_failed(&canonical, error.to_string());
                    outcome.failures.insert(canonical, error.to_string());
                }
            }
        }
    }

    info!(
        "crawl finished: {} downloaded, {} failed, {} waves",
        outcome.downloaded,
        outcome.failures.len(),
        outcome.waves
    );
    Ok(outcome)
}

/// Write one fetched asset to its storage path and, for text content, scan it
/// for target URLs. Returns the canonical URLs to enqueue for the next wave.
async fn persist_and_discover(
    site_root: &Path,
    canonical: &str,
    asset: &FetchedAsset,
    classifier: &DomainClassifier,
    registry: &mut AssetRegistry,
    outcome: &mut CrawlOutcome,
) -> Result<Vec<String>> {
    let storage = registry
        .paths_for_canonical(canonical)
        .map(|paths| paths.storage.clone())
        .with_context(|| format!("no asset record for fetched URL {canonical}"))?;
    let storage_abs = site_root.join(&storage);
    if let Some(parent) = storage_abs.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&storage_abs, &asset.body)
        .await
        .with_context(|| format!("failed to write {}", storage_abs.display()))?;
    registry.mark_fetched(canonical);
    outcome.downloaded += 1;

    if !is_text_asset(&storage, &asset.content_type) {
        return Ok(Vec::new());
    }

    let text = String::from_utf8_lossy(&asset.body);
    let mut next = Vec::new();
    for token in url_scan::extract_url_tokens(&text) {
        let token_canonical = url_scan::canonicalize(&token);
        if !classifier.is_target(&token_canonical) {
            continue;
        }
        registry.observe_token(&token)?;
        outcome
            .file_tokens
            .entry(storage_abs.clone())
            .or_default()
            .insert(token);
        if registry.enqueue_if_new(&token_canonical) {
            debug!("discovered {token_canonical} in {storage}");
            next.push(token_canonical);
        }
    }
    if !next.is_empty() {
        debug!("{storage}: {} new URLs for next wave", next.len());
    }
    Ok(next)
}
