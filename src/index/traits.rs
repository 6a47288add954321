//! Core trait and types for the document index abstraction
//!
//! This module defines the `DocumentIndex` trait that allows different
//! backends (the HTTP index service, the in-memory fixture index) to be
//! used interchangeably. All operations are read-only; upstream failures
//! surface as `GatewayError::IndexUnavailable`, never as silently empty
//! results.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;
use crate::index::filter::FilterExpr;

/// A search request against one named index.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Full-text query. Empty matches all documents.
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    /// Facet names to compute a value -> count distribution for.
    pub facets_distribution: Vec<String>,
    /// AND of OR-groups of equality predicates.
    pub facet_filters: Option<FilterExpr>,
    /// Restrict returned documents to these fields.
    pub attributes_to_retrieve: Option<Vec<String>>,
    /// Sort directives of the form `field:asc` / `field:desc`.
    pub sort: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn all(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn filtered(filter: FilterExpr, limit: usize) -> Self {
        Self {
            limit,
            facet_filters: Some(filter),
            ..Self::default()
        }
    }
}

/// Response for a search request.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub hits: Vec<Value>,
    /// Total matching documents, independent of pagination.
    pub total: u64,
    /// Raw facet distributions as reported upstream. May contain zero-count
    /// or empty-label entries; cleaning happens at the gateway layer.
    pub facets_distribution: HashMap<String, HashMap<String, u64>>,
}

/// Paged raw document listing.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub limit: usize,
    pub offset: usize,
    pub attributes_to_retrieve: Option<Vec<String>>,
}

/// Uniform read-only capability set over named document collections.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Execute a search against the named index.
    async fn search(&self, index: &str, req: &SearchRequest)
        -> Result<SearchResponse, GatewayError>;

    /// Fetch one document by its primary id.
    ///
    /// `Ok(None)` is a well-formed negative outcome; `Err` is reserved for
    /// upstream failures.
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, GatewayError>;

    /// Fetch a page of documents without a query.
    async fn get_documents(
        &self,
        index: &str,
        page: &DocumentPage,
    ) -> Result<Vec<Value>, GatewayError>;

    /// List the facet-eligible field names of the named index.
    async fn facet_attributes(&self, index: &str) -> Result<Vec<String>, GatewayError>;
}
