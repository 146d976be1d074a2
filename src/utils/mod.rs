//! Utility modules supporting the aggregation core.
//!
//! - [`ResourceCache`]: keyed single-flight cache with a TTL per [`ResourceClass`]
//! - [`PaperMerger`]: identity-based deduplication, backfill and ranking
//! - [`CircuitBreakerManager`]: per-source health tracking
//! - [`HttpClient`] and [`fetch_json`]: shared HTTP plumbing for adapters
//! - [`sanitize_paper_id`] and [`validate_doi`]: inbound identifier checks
//!
//! # Single-flight caching
//!
//! ```rust,no_run
//! use scholar_hub::utils::{CacheKey, ResourceCache, TtlPolicy};
//!
//! # async fn example() {
//! let cache: ResourceCache<String, String> = ResourceCache::new(TtlPolicy::default());
//! let value = cache
//!     .get(CacheKey::paper("P1"), || async { Ok("expensive".to_string()) })
//!     .await;
//! # }
//! ```

mod cache;
mod circuit_breaker;
mod dedup;
mod http;
mod validate;

pub use cache::{CacheKey, CacheStats, ResourceCache, ResourceClass, TtlPolicy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerManager, CircuitState};
pub use dedup::{group_by_identity, PaperMerger};
pub use http::{encode_id, fetch_json, HttpClient};
pub use validate::{sanitize_paper_id, validate_doi, ValidationError};
