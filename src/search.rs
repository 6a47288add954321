//! Faceted full-text search over the entity corpus
//!
//! Facet filters are `name:value` pairs, OR'd within a facet name and AND'd
//! across names, matching the upstream index's own combination semantics.
//! Distributions handed to callers are cleaned (no zero counts, no empty
//! labels) and sorted case-insensitively for ordered display.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;
use crate::index::{DocumentIndex, FilterExpr, Predicate, SearchRequest};

/// Default page size when the caller does not specify one.
pub const DEFAULT_LIMIT: usize = 20;

/// Lenient pagination parameters.
///
/// Inputs are accepted only when they parse as non-negative integers;
/// otherwise the defaults apply silently. Parse failures are deliberately
/// not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub limit: usize,
    pub offset: usize,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PageParams {
    pub fn lenient(limit: Option<&str>, offset: Option<&str>) -> Self {
        Self {
            limit: limit
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LIMIT),
            offset: offset.and_then(|v| v.parse().ok()).unwrap_or(0),
        }
    }
}

/// One cleaned facet value with its nonzero count.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

/// One page of faceted search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub hits: Vec<Value>,
    /// Facet name -> cleaned, case-insensitively sorted value counts.
    pub facets_distribution: HashMap<String, Vec<FacetCount>>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_offset: Option<usize>,
}

/// Full-text + facet-filter + pagination gateway over the entity index.
pub struct FacetedSearchGateway {
    index: Arc<dyn DocumentIndex>,
    entities_index: String,
}

impl FacetedSearchGateway {
    pub fn new(index: Arc<dyn DocumentIndex>, entities_index: impl Into<String>) -> Self {
        Self {
            index,
            entities_index: entities_index.into(),
        }
    }

    /// Run one search page.
    ///
    /// `facet_filters` are (facet name, value) selections; multiple values
    /// for the same name are OR'd, distinct names are AND'd.
    pub async fn search(
        &self,
        query: &str,
        facet_filters: &[(String, String)],
        page: PageParams,
    ) -> Result<SearchPage, GatewayError> {
        let facet_names = self.index.facet_attributes(&self.entities_index).await?;

        let req = SearchRequest {
            query: query.to_string(),
            limit: page.limit,
            offset: page.offset,
            facets_distribution: facet_names,
            facet_filters: Some(group_filters(facet_filters)),
            ..SearchRequest::default()
        };
        let resp = self.index.search(&self.entities_index, &req).await?;

        Ok(SearchPage {
            hits: resp.hits,
            facets_distribution: clean_distribution(resp.facets_distribution),
            total: resp.total,
            limit: page.limit,
            offset: page.offset,
            next_offset: next_offset(page.offset, page.limit, resp.total),
            previous_offset: previous_offset(page.offset, page.limit),
        })
    }
}

/// Group selections by facet name into AND'd OR-groups.
fn group_filters(selections: &[(String, String)]) -> FilterExpr {
    let mut by_name: Vec<(&str, Vec<Predicate>)> = Vec::new();
    for (name, value) in selections {
        match by_name.iter_mut().find(|(n, _)| n == name) {
            Some((_, group)) => group.push(Predicate::new(name, value)),
            None => by_name.push((name, vec![Predicate::new(name, value)])),
        }
    }
    by_name
        .into_iter()
        .fold(FilterExpr::new(), |expr, (_, group)| expr.and_group(group))
}

/// Parse a comma-separated `name:value,...` filter criteria string.
/// Malformed segments (no colon) are skipped.
pub fn parse_filter_criteria(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|segment| {
            let (name, value) = segment.split_once(':')?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Drop zero-count and empty-label entries, sort case-insensitively.
fn clean_distribution(
    raw: HashMap<String, HashMap<String, u64>>,
) -> HashMap<String, Vec<FacetCount>> {
    raw.into_iter()
        .map(|(facet, counts)| {
            let mut values: Vec<FacetCount> = counts
                .into_iter()
                .filter(|(value, count)| *count > 0 && !value.is_empty())
                .map(|(value, count)| FacetCount { value, count })
                .collect();
            values.sort_by(|a, b| a.value.to_lowercase().cmp(&b.value.to_lowercase()));
            (facet, values)
        })
        .collect()
}

fn next_offset(offset: usize, limit: usize, total: u64) -> Option<usize> {
    let next = offset + limit;
    ((next as u64) < total).then_some(next)
}

fn previous_offset(offset: usize, limit: usize) -> Option<usize> {
    (offset > 0).then(|| offset.saturating_sub(limit))
}
