//! Corpus Gateway - Identifier Classification, Entity Resolution, and
//! Federated Claims Aggregation
//!
//! A read-only gateway over a remote document index that curates entities
//! (people, organizations, publications) and claims (typed assertions
//! linking them). Given a loosely formatted identifier string it classifies
//! the identifier, resolves it to exactly one entity document, gathers and
//! merges every claim referencing that entity, and produces a
//! provenance-annotated package. It also serves faceted full-text search
//! over the entity corpus and a staleness-aware cache of derived term
//! listings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        HTTP surface (axum): /entity /search /claims /doi        │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!           ┌───────────────────┼───────────────────┐
//!           ▼                   ▼                   ▼
//! ┌──────────────────┐ ┌────────────────┐ ┌──────────────────────┐
//! │ IdentifierClass. │ │ FacetedSearch  │ │   TermCache          │
//! │ EntityResolver   │ │ Gateway        │ │ (watermark + atomic  │
//! │ ClaimsAggregator │ │                │ │  file replacement)   │
//! └──────────────────┘ └────────────────┘ └──────────────────────┘
//!           │                   │                   │
//!           └───────────────────┼───────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │         DocumentIndex trait (HTTP service / in-memory)          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use corpus_gateway::{classify, EntityResolver, ClaimsAggregator, MeiliIndex};
//!
//! let index = Arc::new(MeiliIndex::new(url, api_key, timeout)?);
//! let resolver = EntityResolver::new(index.clone(), "entities", "claims");
//! let aggregator = ClaimsAggregator::new(index, "claims", "cached_pubs", 1000);
//!
//! let identifier = classify("0000-0003-1682-4031").expect("classifiable");
//! let resolved = resolver.resolve(&identifier).await?;
//! let bundle = aggregator.aggregate(&resolved).await?;
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod identifier;
pub mod index;
pub mod resolver;
pub mod search;
pub mod server;
pub mod termcache;

// Re-export main types
pub use claims::{Claim, ClaimsAggregator, ClaimsBundle, Work};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use identifier::{classify, Identifier, IdentifierNamespace};
pub use index::{DocumentIndex, FilterExpr, MeiliIndex, MemoryIndex, Predicate, SearchRequest};
pub use resolver::{Entity, EntityResolver, ResolvedEntity};
pub use search::{FacetedSearchGateway, PageParams, SearchPage};
pub use server::{create_router, AppState};
pub use termcache::{CachedTermSet, TermCache, TermCount};
