//! Search-index builder: flattens the rewritten HTML pages into a JSON
//! document list for the dev server's search API.
//!
//! Runs after localization and assumes page URLs are already local. Markup is
//! stripped with plain regex passes; there is no DOM here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::crawl_engine::inventory::discover_html_files;

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("script pattern is valid")
});
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("style pattern is valid"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title>(.*?)</title>").expect("title pattern is valid"));

/// One indexed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// The on-disk index consumed by the dev server.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchIndex {
    pub generated_at: String,
    pub page_count: usize,
    pub pages: Vec<PageEntry>,
}

/// Where the index lives relative to the site root.
#[must_use]
pub fn index_path(site_root: &Path, assets_dir: &str) -> PathBuf {
    site_root.join(assets_dir).join("data/search-index.json")
}

/// Collapse a page to searchable plain text: drop scripts, styles and tags,
/// decode entities, squeeze whitespace.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let no_script = SCRIPT_RE.replace_all(raw, " ");
    let no_style = STYLE_RE.replace_all(&no_script, " ");
    let no_tags = TAG_RE.replace_all(&no_style, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    WS_RE.replace_all(&decoded, " ").trim().to_string()
}

/// `<title>` content, whitespace-squeezed; falls back when absent or empty.
#[must_use]
pub fn extract_title(raw: &str, fallback: &str) -> String {
    let title = TITLE_RE
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map(|m| {
            let decoded = html_escape::decode_html_entities(m.as_str());
            WS_RE.replace_all(&decoded, " ").trim().to_string()
        })
        .unwrap_or_default();
    if title.is_empty() {
        fallback.to_string()
    } else {
        title
    }
}

/// Build the index over the site's HTML set and write it under the assets
/// directory. Returns the output path and the page count.
pub async fn build_index(site_root: &Path, assets_dir: &str) -> Result<(PathBuf, usize)> {
    let files = discover_html_files(site_root, assets_dir).await?;
    let mut pages = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let raw = String::from_utf8_lossy(&bytes);
        let fallback = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        pages.push(PageEntry {
            url: path
                .strip_prefix(site_root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/"),
            title: extract_title(&raw, &fallback),
            text: normalize_text(&raw),
        });
    }

    let index = SearchIndex {
        generated_at: Utc::now().to_rfc3339(),
        page_count: pages.len(),
        pages,
    };
    let output = index_path(site_root, assets_dir);
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&index).context("failed to serialize search index")?;
    tokio::fs::write(&output, json)
        .await
        .with_context(|| format!("cannot write {}", output.display()))?;
    info!("wrote {} with {} pages", output.display(), index.page_count);
    Ok((output, index.page_count))
}

/// Load a previously built index; missing file yields an empty page list.
pub async fn load_index(site_root: &Path, assets_dir: &str) -> Result<Vec<PageEntry>> {
    let path = index_path(site_root, assets_dir);
    if !tokio::fs::try_exists(&path).await? {
        return Ok(Vec::new());
    }
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let index: SearchIndex =
        serde_json::from_str(&raw).with_context(|| format!("invalid index at {}", path.display()))?;
    Ok(index.pages)
}
