//! HTML inventory: discover the exported pages and seed the crawl.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::url_scan::{self, DomainClassifier};

/// URL inventory of the fixed HTML set.
#[derive(Debug, Default)]
pub struct HtmlInventory {
    /// The pages scanned, sorted by path.
    pub html_files: Vec<PathBuf>,
    /// Every URL token observed, target or not.
    pub all_tokens: BTreeSet<String>,
    /// Tokens whose canonical form points at a target domain.
    pub target_tokens: BTreeSet<String>,
    /// Tokens intentionally left external.
    pub external_tokens: BTreeSet<String>,
    /// Target tokens per page; the rewriter's HTML work list.
    pub file_tokens: BTreeMap<PathBuf, BTreeSet<String>>,
}

/// Find the exported pages: `<root>/*.html` plus `<root>/<dir>/*.html` one
/// level deep, skipping the assets output directory. Sorted for stable
/// seeding order.
pub async fn discover_html_files(site_root: &Path, assets_dir: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_html_in_dir(site_root, &mut files).await?;

    let mut entries = tokio::fs::read_dir(site_root)
        .await
        .with_context(|| format!("cannot read site root {}", site_root.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy() == assets_dir || name.to_string_lossy().starts_with('.') {
            continue;
        }
        collect_html_in_dir(&path, &mut files).await?;
    }

    files.sort();
    Ok(files)
}

async fn collect_html_in_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot read {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("html"))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Scan the HTML set once, classifying every token. The resulting target
/// tokens seed the crawl frontier and the file map drives the HTML rewrite.
pub async fn collect_inventory(
    html_files: Vec<PathBuf>,
    classifier: &DomainClassifier,
) -> Result<HtmlInventory> {
    let mut inventory = HtmlInventory {
        html_files,
        ..HtmlInventory::default()
    };

    for path in inventory.html_files.clone() {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes);
        let tokens = url_scan::extract_url_tokens(&content);
        debug!("{}: {} URL tokens", path.display(), tokens.len());

        let file_entry = inventory.file_tokens.entry(path).or_default();
        for token in tokens {
            let canonical = url_scan::canonicalize(&token);
            if canonical.starts_with("http://") || canonical.starts_with("https://") {
                inventory.all_tokens.insert(token.clone());
            }
            if classifier.is_target(&canonical) {
                inventory.target_tokens.insert(token.clone());
                file_entry.insert(token);
            } else {
                inventory.external_tokens.insert(token);
            }
        }
    }

    Ok(inventory)
}
