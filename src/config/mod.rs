//! Run configuration for the localization pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::crawl_engine::RetryPolicy;
use crate::url_scan::classifier::DEFAULT_TARGET_DOMAINS;

pub const DEFAULT_CONCURRENT_FETCHES: usize = 10;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 45;
pub const DEFAULT_ASSETS_DIR: &str = "assets";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (sitelocal)";

/// Configuration for one localization run.
///
/// `site_root` is always an absolute path (normalized in the builder) so path
/// derivation and rewriting agree on the same base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizeConfig {
    pub(crate) site_root: PathBuf,
    pub(crate) assets_dir: String,
    pub(crate) target_domains: Vec<String>,
    pub(crate) concurrency: usize,
    pub(crate) fetch_timeout_secs: u64,
    pub(crate) user_agent: String,
    #[serde(skip, default)]
    pub(crate) retry: RetryPolicy,
}

impl LocalizeConfig {
    #[must_use]
    pub fn builder() -> LocalizeConfigBuilder {
        LocalizeConfigBuilder::default()
    }

    #[must_use]
    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    #[must_use]
    pub fn assets_dir(&self) -> &str {
        &self.assets_dir
    }

    #[must_use]
    pub fn target_domains(&self) -> &[String] {
        &self.target_domains
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// Fluent builder; `site_root` is the only required field.
#[derive(Debug, Default)]
pub struct LocalizeConfigBuilder {
    site_root: Option<PathBuf>,
    assets_dir: Option<String>,
    target_domains: Option<Vec<String>>,
    concurrency: Option<usize>,
    fetch_timeout_secs: Option<u64>,
    user_agent: Option<String>,
    retry: Option<RetryPolicy>,
}

impl LocalizeConfigBuilder {
    #[must_use]
    pub fn site_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.site_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn assets_dir(mut self, dir: impl Into<String>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn target_domains(mut self, domains: Vec<String>) -> Self {
        self.target_domains = Some(domains);
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Validate and build, normalizing `site_root` to an absolute path.
    pub fn build(self) -> Result<LocalizeConfig> {
        let site_root = self
            .site_root
            .context("site_root is required")?;
        let site_root =
            std::path::absolute(&site_root).context("cannot absolutize site_root")?;

        let assets_dir = self
            .assets_dir
            .unwrap_or_else(|| DEFAULT_ASSETS_DIR.to_string());
        if assets_dir.is_empty() || assets_dir.contains('/') {
            bail!("assets_dir must be a single directory name, got {assets_dir:?}");
        }

        let target_domains = match self.target_domains {
            Some(domains) if !domains.is_empty() => domains,
            Some(_) => bail!("target_domains must not be empty"),
            None => DEFAULT_TARGET_DOMAINS.iter().map(|d| d.to_string()).collect(),
        };

        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENT_FETCHES);
        if concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        Ok(LocalizeConfig {
            site_root,
            assets_dir,
            target_domains,
            concurrency,
            fetch_timeout_secs: self.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_site_root() {
        assert!(LocalizeConfig::builder().build().is_err());
    }

    #[test]
    fn defaults_are_applied() {
        let config = LocalizeConfig::builder().site_root("/tmp/site").build().unwrap();
        assert_eq!(config.assets_dir(), "assets");
        assert_eq!(config.concurrency(), DEFAULT_CONCURRENT_FETCHES);
        assert_eq!(config.target_domains().len(), DEFAULT_TARGET_DOMAINS.len());
        assert!(config.site_root().is_absolute());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(LocalizeConfig::builder()
            .site_root("/tmp/site")
            .concurrency(0)
            .build()
            .is_err());
        assert!(LocalizeConfig::builder()
            .site_root("/tmp/site")
            .assets_dir("a/b")
            .build()
            .is_err());
        assert!(LocalizeConfig::builder()
            .site_root("/tmp/site")
            .target_domains(Vec::new())
            .build()
            .is_err());
    }
}
