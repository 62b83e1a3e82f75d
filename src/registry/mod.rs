//! Asset registry: canonical URL → local path mapping and fetch state.
//!
//! Path derivation mirrors the remote layout under the local assets directory,
//! `<assets_dir>/<host>/<path>`. Directory-index URLs (trailing slash) store at
//! `<path>/index.html` while the reference path keeps the slash; query-string
//! variants get a deterministic `__q_<hash>` filename suffix so distinct
//! queries against the same path never collide.
//!
//! The registry is the single shared mutable structure of a run. It only
//! grows: records are created the first time a canonical URL is observed and
//! are never evicted, and every raw spelling of a URL resolves to the record
//! of its canonical form.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use url::Url;

use crate::url_scan::canonicalize;

/// Hex length of the query disambiguation hash.
const QUERY_HASH_LEN: usize = 12;

/// The local path pair derived from a canonical URL.
///
/// `reference` is the repo-relative POSIX path written into rewritten text
/// (after being made relative to the consuming file); `storage` is the
/// repo-relative path where fetched bytes are persisted. They differ only for
/// directory-index URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub reference: String,
    pub storage: String,
}

/// Fetch lifecycle of one canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Pending,
    Fetched,
    Failed(String),
}

/// Derive the (reference, storage) pair for a canonical URL.
///
/// Pure function of its inputs: the same canonical URL always maps to the same
/// paths, within a run and across runs.
pub fn map_canonical(canonical: &str, assets_dir: &str) -> Result<AssetPaths> {
    let parsed =
        Url::parse(canonical).with_context(|| format!("cannot map unparseable URL {canonical}"))?;
    let host = parsed
        .host_str()
        .unwrap_or("unknown-host")
        .to_ascii_lowercase();

    let path_part = parsed.path();
    let rel = path_part.trim_matches('/');
    let mut base = format!("{assets_dir}/{host}");
    if !rel.is_empty() {
        base.push('/');
        base.push_str(rel);
    }

    if path_part.ends_with('/') || path_part.is_empty() {
        return Ok(AssetPaths {
            reference: format!("{base}/"),
            storage: format!("{base}/index.html"),
        });
    }

    if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
        base = append_query_suffix(&base, &short_query_hash(query));
    }

    Ok(AssetPaths {
        reference: base.clone(),
        storage: base,
    })
}

/// First 12 hex chars of the SHA-256 of the query string.
fn short_query_hash(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    hex::encode(digest)[..QUERY_HASH_LEN].to_string()
}

/// Insert `__q_<hash>` between the filename stem and its extension.
fn append_query_suffix(path: &str, qhash: &str) -> String {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, path),
    };
    let (stem, ext) = split_stem(name);
    let stem = if stem.is_empty() { "file" } else { stem };
    let renamed = format!("{stem}__q_{qhash}{ext}");
    match dir {
        Some(dir) => format!("{dir}/{renamed}"),
        None => renamed,
    }
}

/// Split a filename into stem and extension (dot included). Dotfiles and
/// extensionless names keep the whole name as the stem.
fn split_stem(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(pos) => (&name[..pos], &name[pos..]),
    }
}

/// Append-only mapping from observed tokens and canonical URLs to local paths.
#[derive(Debug)]
pub struct AssetRegistry {
    assets_dir: String,
    /// Every raw token ever observed, mapped to its record's paths.
    token_paths: BTreeMap<String, AssetPaths>,
    /// One entry per canonical URL; the authoritative record set.
    canonical_paths: BTreeMap<String, AssetPaths>,
    status: BTreeMap<String, FetchStatus>,
    /// Canonical URLs ever handed to the crawl frontier. Checked before
    /// enqueue so each URL is fetched at most once.
    queued: BTreeSet<String>,
}

impl AssetRegistry {
    pub fn new(assets_dir: impl Into<String>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            token_paths: BTreeMap::new(),
            canonical_paths: BTreeMap::new(),
            status: BTreeMap::new(),
            queued: BTreeSet::new(),
        }
    }

    /// Record a raw token, creating the asset record for its canonical form if
    /// this is the first observation. Returns the canonical URL.
    pub fn observe_token(&mut self, token: &str) -> Result<String> {
        let canonical = canonicalize(token);
        let paths = match self.canonical_paths.get(&canonical) {
            Some(existing) => existing.clone(),
            None => {
                let derived = map_canonical(&canonical, &self.assets_dir)?;
                self.canonical_paths
                    .insert(canonical.clone(), derived.clone());
                self.status.insert(canonical.clone(), FetchStatus::Pending);
                derived
            }
        };
        self.token_paths
            .entry(token.to_string())
            .or_insert(paths);
        Ok(canonical)
    }

    /// Atomic check-then-insert on the queued set. Returns true when the
    /// canonical URL was not queued before and should join the frontier.
    pub fn enqueue_if_new(&mut self, canonical: &str) -> bool {
        self.queued.insert(canonical.to_string())
    }

    /// Mark a canonical URL as fetched. Its bytes on disk are immutable for
    /// the rest of the run.
    pub fn mark_fetched(&mut self, canonical: &str) {
        self.status
            .insert(canonical.to_string(), FetchStatus::Fetched);
    }

    /// Mark a canonical URL as terminally failed with its error text.
    pub fn mark_failed(&mut self, canonical: &str, error: String) {
        self.status
            .insert(canonical.to_string(), FetchStatus::Failed(error));
    }

    #[must_use]
    pub fn paths_for_token(&self, token: &str) -> Option<&AssetPaths> {
        self.token_paths.get(token)
    }

    #[must_use]
    pub fn paths_for_canonical(&self, canonical: &str) -> Option<&AssetPaths> {
        self.canonical_paths.get(canonical)
    }

    #[must_use]
    pub fn status_for(&self, canonical: &str) -> Option<&FetchStatus> {
        self.status.get(canonical)
    }

    /// Number of canonical URLs marked fetched.
    #[must_use]
    pub fn fetched_count(&self) -> usize {
        self.status
            .values()
            .filter(|s| matches!(s, FetchStatus::Fetched))
            .count()
    }

    /// Terminal failures as (canonical URL, error text), sorted by URL.
    #[must_use]
    pub fn failures(&self) -> Vec<(String, String)> {
        self.status
            .iter()
            .filter_map(|(url, status)| match status {
                FetchStatus::Failed(error) => Some((url.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of distinct canonical URLs ever observed.
    #[must_use]
    pub fn canonical_count(&self) -> usize {
        self.canonical_paths.len()
    }

    /// The full token/canonical → reference-path map, sorted by key. This is
    /// the durable artifact serialized to `asset-map.json`.
    #[must_use]
    pub fn asset_map(&self) -> BTreeMap<String, String> {
        self.token_paths
            .iter()
            .map(|(token, paths)| (token.clone(), paths.reference.clone()))
            .collect()
    }

    /// Fold the canonical and protocol-relative spellings of every record into
    /// the token map, so the asset map resolves all variants of a URL.
    pub fn finalize_variants(&mut self) {
        let records: Vec<(String, AssetPaths)> = self
            .canonical_paths
            .iter()
            .map(|(canonical, paths)| (canonical.clone(), paths.clone()))
            .collect();
        for (canonical, paths) in records {
            let proto_rel = canonical
                .strip_prefix("https:")
                .or_else(|| canonical.strip_prefix("http:"))
                .map(str::to_string);
            self.token_paths
                .entry(canonical)
                .or_insert_with(|| paths.clone());
            if let Some(proto_rel) = proto_rel.filter(|p| p.starts_with("//")) {
                self.token_paths.entry(proto_rel).or_insert(paths);
            }
        }
    }
}
