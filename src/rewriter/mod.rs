//! Rewrites target-URL tokens in place with consumer-relative local paths.
//!
//! Replacement is plain substitution over the file's raw bytes, longest token
//! first so a token that is a prefix of another is never partially
//! substituted. Working on bytes keeps every untouched byte verbatim, so
//! assets with non-UTF-8 content (Latin-1 comments in CSS, say) survive a
//! rewrite intact. Tokens that used backslash-escaped slashes get an escaped
//! replacement, keeping embedded JSON valid. Files are written back only when
//! their content actually changed, which also makes the pass idempotent:
//! after one rewrite the tokens are local paths that no longer match any
//! registry key.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::registry::{AssetRegistry, FetchStatus};
use crate::url_scan::{canonicalize, is_escaped_token};

/// Rewrite every file in the work list. Returns the files that changed,
/// sorted. Entries whose file is missing (a failed download) are skipped.
pub async fn rewrite_files(
    site_root: &Path,
    file_tokens: &BTreeMap<PathBuf, BTreeSet<String>>,
    registry: &AssetRegistry,
) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();
    for (path, tokens) in file_tokens {
        if tokens.is_empty() {
            continue;
        }
        if !tokio::fs::try_exists(path).await? {
            debug!("skipping missing file {}", path.display());
            continue;
        }
        if rewrite_file(site_root, path, tokens, registry).await? {
            changed.push(path.clone());
        }
    }
    changed.sort();
    Ok(changed)
}

/// Rewrite one file given the tokens found in it. Returns whether the file
/// was modified.
pub async fn rewrite_file(
    site_root: &Path,
    path: &Path,
    tokens: &BTreeSet<String>,
    registry: &AssetRegistry,
) -> Result<bool> {
    let original = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut updated = original.clone();

    // Longest first: "https://x/a.js?v=1" must be consumed before
    // "https://x/a.js" can match.
    let mut ordered: Vec<&String> = tokens.iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    for token in ordered {
        let Some(paths) = registry.paths_for_token(token) else {
            continue;
        };
        // Failed downloads keep their remote URL so the page still renders.
        let status = registry.status_for(&canonicalize(token));
        if !matches!(status, Some(FetchStatus::Fetched)) {
            continue;
        }
        let Some(mut replacement) = relative_reference(site_root, path, &paths.reference) else {
            continue;
        };
        if is_escaped_token(token) {
            replacement = replacement.replace('/', "\\/");
        }
        updated = replace_bytes(&updated, token.as_bytes(), replacement.as_bytes());
    }

    if updated == original {
        return Ok(false);
    }
    tokio::fs::write(path, &updated)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    debug!("rewrote {}", path.display());
    Ok(true)
}

/// Replace every occurrence of `needle` in `haystack`, byte for byte.
fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.windows(needle.len()).position(|window| window == needle) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        rest = &rest[pos + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Reference path relative to the consuming file's directory, preserving a
/// trailing slash for directory-index references.
fn relative_reference(site_root: &Path, consumer: &Path, reference: &str) -> Option<String> {
    let trailing_slash = reference.ends_with('/');
    let target_abs = site_root.join(reference.trim_end_matches('/'));
    let consumer_dir = consumer.parent()?;
    let rel = pathdiff::diff_paths(target_abs, consumer_dir)?;
    let mut result = rel.to_string_lossy().replace('\\', "/");
    if trailing_slash {
        result.push('/');
    }
    Some(result)
}
