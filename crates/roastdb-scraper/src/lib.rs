pub mod cache;
pub mod classify;
pub mod cycle;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod platform;
pub mod reconcile;
pub mod resilience;
pub mod types;

pub use cache::{CacheEntry, ConditionalCache};
pub use classify::{classify, AttemptOutcome, RetryDecision, TransportFault};
pub use cycle::{run_price_cycle, CycleDeps, CycleError, CycleReport};
pub use error::ScraperError;
pub use fetch::{FetchConfig, FetchRequest, FetchResponse, Fetcher};
pub use normalize::{normalize_product, normalize_products};
pub use platform::{
    Filters, PageOutcome, PageRun, PageTermination, PlatformAdapter, ShopifyAdapter,
    SourceAdapter, WooCommerceAdapter,
};
pub use reconcile::reconcile;
pub use types::ProductRecord;
