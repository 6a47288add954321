//! In-memory document index
//!
//! A small `DocumentIndex` backend over plain JSON documents. Used as the
//! fixture backend in tests and for local development without the index
//! service. Implements the same filter, facet and pagination semantics as
//! the HTTP backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;
use crate::index::traits::{DocumentIndex, DocumentPage, SearchRequest, SearchResponse};

struct StoredIndex {
    primary_key: String,
    facet_fields: Vec<String>,
    documents: Vec<Value>,
}

/// In-memory index collection.
#[derive(Default)]
pub struct MemoryIndex {
    indexes: RwLock<HashMap<String, StoredIndex>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an index with the given primary key and
    /// facet-eligible fields.
    pub fn create_index(&self, name: &str, primary_key: &str, facet_fields: &[&str]) {
        self.indexes.write().unwrap().insert(
            name.to_string(),
            StoredIndex {
                primary_key: primary_key.to_string(),
                facet_fields: facet_fields.iter().map(|s| s.to_string()).collect(),
                documents: Vec::new(),
            },
        );
    }

    /// Add documents to an existing index.
    pub fn add_documents(&self, name: &str, docs: Vec<Value>) {
        let mut indexes = self.indexes.write().unwrap();
        let index = indexes
            .get_mut(name)
            .unwrap_or_else(|| panic!("index '{name}' not created"));
        index.documents.extend(docs);
    }

    fn with_index<T>(
        &self,
        name: &str,
        f: impl FnOnce(&StoredIndex) -> T,
    ) -> Result<T, GatewayError> {
        let indexes = self.indexes.read().unwrap();
        match indexes.get(name) {
            Some(index) => Ok(f(index)),
            None => Err(GatewayError::unavailable(name, "index does not exist")),
        }
    }
}

/// All string values a document carries under a field, flattening arrays.
fn field_values(doc: &Value, field: &str) -> Vec<String> {
    match doc.get(field) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::Number(n)) => vec![n.to_string()],
        _ => vec![],
    }
}

/// Case-insensitive substring match across all string leaves of a document.
fn text_matches(doc: &Value, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    fn walk(value: &Value, needle: &str) -> bool {
        match value {
            Value::String(s) => s.to_lowercase().contains(needle),
            Value::Array(items) => items.iter().any(|v| walk(v, needle)),
            Value::Object(map) => map.values().any(|v| walk(v, needle)),
            _ => false,
        }
    }
    walk(doc, &needle)
}

fn project(doc: &Value, attributes: &Option<Vec<String>>) -> Value {
    match (doc.as_object(), attributes) {
        (Some(map), Some(attrs)) => {
            let projected: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(k, _)| attrs.iter().any(|a| a == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(projected)
        }
        _ => doc.clone(),
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn search(
        &self,
        index: &str,
        req: &SearchRequest,
    ) -> Result<SearchResponse, GatewayError> {
        self.with_index(index, |stored| {
            let mut matched: Vec<&Value> = stored
                .documents
                .iter()
                .filter(|doc| text_matches(doc, &req.query))
                .filter(|doc| match &req.facet_filters {
                    Some(filter) => filter.matches(|field| field_values(doc, field)),
                    None => true,
                })
                .collect();

            if let Some(sort) = &req.sort {
                for directive in sort.iter().rev() {
                    let (field, desc) = match directive.rsplit_once(':') {
                        Some((f, "desc")) => (f, true),
                        Some((f, _)) => (f, false),
                        None => (directive.as_str(), false),
                    };
                    matched.sort_by(|a, b| {
                        let av = field_values(a, field).into_iter().next().unwrap_or_default();
                        let bv = field_values(b, field).into_iter().next().unwrap_or_default();
                        if desc { bv.cmp(&av) } else { av.cmp(&bv) }
                    });
                }
            }

            let mut facets_distribution: HashMap<String, HashMap<String, u64>> = HashMap::new();
            for facet in &req.facets_distribution {
                let mut counts: HashMap<String, u64> = HashMap::new();
                for doc in &matched {
                    for value in field_values(doc, facet) {
                        *counts.entry(value).or_insert(0) += 1;
                    }
                }
                facets_distribution.insert(facet.clone(), counts);
            }

            let total = matched.len() as u64;
            let hits = matched
                .into_iter()
                .skip(req.offset)
                .take(req.limit)
                .map(|doc| project(doc, &req.attributes_to_retrieve))
                .collect();

            SearchResponse {
                hits,
                total,
                facets_distribution,
            }
        })
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, GatewayError> {
        self.with_index(index, |stored| {
            stored
                .documents
                .iter()
                .find(|doc| {
                    field_values(doc, &stored.primary_key)
                        .iter()
                        .any(|v| v == id)
                })
                .cloned()
        })
    }

    async fn get_documents(
        &self,
        index: &str,
        page: &DocumentPage,
    ) -> Result<Vec<Value>, GatewayError> {
        self.with_index(index, |stored| {
            stored
                .documents
                .iter()
                .skip(page.offset)
                .take(page.limit)
                .map(|doc| project(doc, &page.attributes_to_retrieve))
                .collect()
        })
    }

    async fn facet_attributes(&self, index: &str) -> Result<Vec<String>, GatewayError> {
        self.with_index(index, |stored| stored.facet_fields.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::filter::{FilterExpr, Predicate};
    use serde_json::json;

    fn people_index() -> MemoryIndex {
        let index = MemoryIndex::new();
        index.create_index("entities", "entity_id", &["expertise", "region"]);
        index.add_documents(
            "entities",
            vec![
                json!({"entity_id": "e1", "display_name": "Jane Doe",
                       "expertise": ["hydrology", "geology"], "region": "West"}),
                json!({"entity_id": "e2", "display_name": "John Roe",
                       "expertise": ["geology"], "region": "East"}),
            ],
        );
        index
    }

    #[tokio::test]
    async fn filters_are_or_within_and_across() {
        let index = people_index();
        let filter = FilterExpr::new()
            .and_group(vec![
                Predicate::new("expertise", "hydrology"),
                Predicate::new("expertise", "seismology"),
            ])
            .and("region", "West");

        let resp = index
            .search("entities", &SearchRequest::filtered(filter, 10))
            .await
            .unwrap();
        assert_eq!(resp.total, 1);
        assert_eq!(resp.hits[0]["entity_id"], "e1");
    }

    #[tokio::test]
    async fn facet_distribution_counts_array_values() {
        let index = people_index();
        let req = SearchRequest {
            limit: 10,
            facets_distribution: vec!["expertise".to_string()],
            ..SearchRequest::default()
        };
        let resp = index.search("entities", &req).await.unwrap();
        let expertise = &resp.facets_distribution["expertise"];
        assert_eq!(expertise["geology"], 2);
        assert_eq!(expertise["hydrology"], 1);
    }

    #[tokio::test]
    async fn get_document_by_primary_key() {
        let index = people_index();
        let doc = index.get_document("entities", "e2").await.unwrap().unwrap();
        assert_eq!(doc["display_name"], "John Roe");
        assert!(index.get_document("entities", "e9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_index_is_unavailable_not_empty() {
        let index = MemoryIndex::new();
        let err = index
            .search("nope", &SearchRequest::all(10))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn sort_descending_orders_hits() {
        let index = MemoryIndex::new();
        index.create_index("claims", "claim_id", &[]);
        index.add_documents(
            "claims",
            vec![
                json!({"claim_id": "c1", "claim_created": "2024-01-01T00:00:00Z"}),
                json!({"claim_id": "c2", "claim_created": "2024-02-01T00:00:00Z"}),
            ],
        );
        let req = SearchRequest {
            limit: 1,
            sort: Some(vec!["claim_created:desc".to_string()]),
            ..SearchRequest::default()
        };
        let resp = index.search("claims", &req).await.unwrap();
        assert_eq!(resp.hits[0]["claim_id"], "c2");
    }
}
