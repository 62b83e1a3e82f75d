//! Run artifacts: asset map, classification split, and the human-readable
//! report.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use serde::Serialize;

use crate::crawl_engine::is_text_asset;
use crate::registry::AssetRegistry;
use crate::url_scan::{self, DomainClassifier};

pub const ASSET_MAP_FILE: &str = "asset-map.json";
pub const CLASSIFICATION_FILE: &str = "classification.json";
pub const REPORT_FILE: &str = "LOCALIZE_REPORT.md";

/// Counts and outcomes of one localization run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    /// Unique URL tokens found in the HTML inventory.
    pub total_urls: usize,
    /// Tokens classified as assets to localize, from HTML alone.
    pub target_in_html: usize,
    /// Tokens intentionally left external.
    pub external: usize,
    /// Target tokens after recursive discovery.
    pub discovered_targets: usize,
    /// Canonical assets downloaded.
    pub downloaded: usize,
    /// Crawl waves executed.
    pub waves: usize,
    /// Canonical URL → error text for terminal failures.
    pub failures: BTreeMap<String, String>,
    /// Repo-relative paths of files the rewriter changed.
    pub changed_files: Vec<String>,
}

impl RunSummary {
    /// A run fails overall when any fetch exhausted its retries, even though
    /// everything else was still rewritten.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Serialize)]
struct Classification<'a> {
    asset_to_localize: &'a BTreeSet<String>,
    external_reference: &'a BTreeSet<String>,
}

/// Serialize the full token → reference-path map, sorted by key.
pub async fn write_asset_map(site_root: &Path, registry: &AssetRegistry) -> Result<PathBuf> {
    let path = site_root.join(ASSET_MAP_FILE);
    let json = serde_json::to_string_pretty(&registry.asset_map())
        .context("failed to serialize asset map")?;
    tokio::fs::write(&path, json + "\n")
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// Persist the original target/external split for audit, independent of how
/// the crawl went.
pub async fn write_classification(
    site_root: &Path,
    target_tokens: &BTreeSet<String>,
    external_tokens: &BTreeSet<String>,
) -> Result<PathBuf> {
    let path = site_root.join(CLASSIFICATION_FILE);
    let payload = Classification {
        asset_to_localize: target_tokens,
        external_reference: external_tokens,
    };
    let json = serde_json::to_string_pretty(&payload).context("failed to serialize classification")?;
    tokio::fs::write(&path, json + "\n")
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// The grep a human would run to confirm no target-domain URL survived in the
/// rewritten pages.
fn verification_command(domains: &[String]) -> String {
    let alternation = domains
        .iter()
        .map(|d| d.replace('.', r"\."))
        .collect::<Vec<_>>()
        .join("|");
    format!(r#"rg -n "https?://({alternation})|//({alternation})" *.html */*.html"#)
}

/// Re-scan the rewritten pages for residual target tokens. Returns per-file
/// counts for any page that still references a target domain.
async fn residual_scan(
    site_root: &Path,
    html_files: &[PathBuf],
    classifier: &DomainClassifier,
) -> Result<Vec<(String, usize)>> {
    let mut residuals = Vec::new();
    for path in html_files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes);
        let count = url_scan::extract_url_tokens(&content)
            .iter()
            .filter(|token| classifier.is_target(&url_scan::canonicalize(token)))
            .count();
        if count > 0 {
            residuals.push((relative_display(site_root, path), count));
        }
    }
    Ok(residuals)
}

/// Re-scan the downloaded text assets for residual target tokens. A match
/// here means a reference discovered inside an asset escaped the rewrite.
async fn residual_scan_assets(
    site_root: &Path,
    assets_dir: &str,
    classifier: &DomainClassifier,
) -> Result<Vec<(String, usize)>> {
    let root = site_root.join(assets_dir);
    if !tokio::fs::try_exists(&root).await? {
        return Ok(Vec::new());
    }
    let mut residuals = Vec::new();
    let mut dirs = vec![root];
    while let Some(dir) = dirs.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("cannot read {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                dirs.push(path);
                continue;
            }
            if !is_text_asset(&path.to_string_lossy(), "") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            let content = String::from_utf8_lossy(&bytes);
            let count = url_scan::extract_url_tokens(&content)
                .iter()
                .filter(|token| classifier.is_target(&url_scan::canonicalize(token)))
                .count();
            if count > 0 {
                residuals.push((relative_display(site_root, &path), count));
            }
        }
    }
    residuals.sort();
    Ok(residuals)
}

fn relative_display(site_root: &Path, path: &Path) -> String {
    path.strip_prefix(site_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Write the Markdown run report: counts, changed files, verification and
/// failures.
pub async fn write_report(
    site_root: &Path,
    assets_dir: &str,
    summary: &RunSummary,
    classifier: &DomainClassifier,
    html_files: &[PathBuf],
) -> Result<PathBuf> {
    let path = site_root.join(REPORT_FILE);
    let command = verification_command(&classifier.domains());
    let residuals = residual_scan(site_root, html_files, classifier).await?;
    let asset_residuals = residual_scan_assets(site_root, assets_dir, classifier).await?;

    let mut lines = vec![
        "# LOCALIZE_REPORT".to_string(),
        String::new(),
        format!("Generated: {}", Utc::now().to_rfc3339()),
        String::new(),
        "## Summary".to_string(),
        format!(
            "- Total URLs found in HTML inventory (unique): {}",
            summary.total_urls
        ),
        format!(
            "- Total URLs classified as asset_to_localize (unique): {}",
            summary.target_in_html
        ),
        format!(
            "- Total URLs intentionally external (unique): {}",
            summary.external
        ),
        format!(
            "- Total localized target URLs after recursive discovery (unique): {}",
            summary.discovered_targets
        ),
        format!("- Total downloaded canonical assets: {}", summary.downloaded),
        format!("- Unresolved/failed URLs: {}", summary.failures.len()),
        format!("- Crawl waves: {}", summary.waves),
        String::new(),
        "## Files Changed".to_string(),
    ];
    if summary.changed_files.is_empty() {
        lines.push("- (none)".to_string());
    } else {
        lines.extend(summary.changed_files.iter().map(|f| format!("- {f}")));
    }

    lines.extend([
        String::new(),
        "## Verification".to_string(),
        "```bash".to_string(),
        command,
        "```".to_string(),
        "```text".to_string(),
    ]);
    if residuals.is_empty() {
        lines.push("(no matches)".to_string());
    } else {
        lines.extend(
            residuals
                .iter()
                .map(|(file, count)| format!("{file}: {count} residual target URLs")),
        );
    }
    lines.push("```".to_string());

    lines.extend([
        String::new(),
        "### Additional Verification (localized assets)".to_string(),
        "```text".to_string(),
    ]);
    if asset_residuals.is_empty() {
        lines.push("(no matches)".to_string());
    } else {
        lines.extend(
            asset_residuals
                .iter()
                .map(|(file, count)| format!("{file}: {count} residual target URLs")),
        );
    }
    lines.push("```".to_string());

    if !summary.failures.is_empty() {
        lines.push(String::new());
        lines.push("## Failures".to_string());
        lines.extend(
            summary
                .failures
                .iter()
                .map(|(url, error)| format!("- {url}: {error}")),
        );
    }

    tokio::fs::write(&path, lines.join("\n") + "\n")
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}
