//! Document index gateway
//!
//! Uniform query and document-fetch abstraction over named document
//! collections. The trait lives in [`traits`], filter construction in
//! [`filter`], the HTTP backend in [`meili`], and an in-memory fixture
//! backend in [`memory`].

pub mod filter;
pub mod meili;
pub mod memory;
pub mod traits;

pub use filter::{FilterExpr, Predicate};
pub use meili::MeiliIndex;
pub use memory::MemoryIndex;
pub use traits::{DocumentIndex, DocumentPage, SearchRequest, SearchResponse};
