//! Breadth-first asset crawl with bounded concurrency and retry.

pub mod fetcher;
pub mod inventory;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;

pub use fetcher::{FetchError, FetchedAsset, Fetcher};
pub use orchestrator::run_localization;
pub use retry::RetryPolicy;
pub use scheduler::{is_text_asset, CrawlOutcome, TEXT_EXTENSIONS};
