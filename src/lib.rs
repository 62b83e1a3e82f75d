//! Localize a static HTML export: find every reference to the configured
//! asset hosts, mirror those assets into a local `assets/` tree, and rewrite
//! the pages to point at the local copies.
//!
//! The pipeline is wave-based: scan the HTML inventory, download the
//! referenced assets with bounded concurrency, scan each downloaded text
//! asset for further references, and repeat until no new URLs appear. The
//! rewrite pass is idempotent, so re-running over an already-localized site
//! changes nothing.
//!
//! Two companions round out the workflow: a search-index builder over the
//! rewritten pages, and a dev server that serves the site with the search and
//! form endpoints the pages expect.

pub mod config;
pub mod crawl_engine;
pub mod dev_server;
pub mod registry;
pub mod report;
pub mod rewriter;
pub mod search_index;
pub mod url_scan;

pub use config::{LocalizeConfig, LocalizeConfigBuilder};
pub use crawl_engine::{run_localization, FetchError, Fetcher, RetryPolicy};
pub use registry::{AssetPaths, AssetRegistry, FetchStatus};
pub use report::RunSummary;
pub use url_scan::{canonicalize, extract_url_tokens, DomainClassifier};
