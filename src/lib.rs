//! # Scholar Hub
//!
//! Multi-source academic paper aggregation with citation enrichment.
//!
//! A query fans out to every configured bibliographic source concurrently;
//! the answers are merged into one canonical record per paper, enriched with
//! an open-access PDF link and a one-hop citation network, and cached with
//! single-flight semantics.
//!
//! ## Architecture
//!
//! - [`models`]: canonical `Paper`, citation network and search types
//! - [`sources`]: source adapters behind the [`Source`] trait
//! - [`aggregate`]: concurrent fan-out, PDF enhancement, citation networks
//! - [`service`]: the cached [`PaperService`] facade every surface uses
//! - [`api`]: HTTP routes over the service
//! - [`mcp`]: MCP tools over the service
//! - [`utils`]: cache, merging, circuit breakers, HTTP plumbing
//! - [`config`]: layered configuration

pub mod aggregate;
pub mod api;
pub mod config;
pub mod mcp;
pub mod models;
pub mod service;
pub mod sources;
pub mod utils;

pub use models::{CitationNetwork, Paper};
pub use service::{PaperService, ServiceError};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
