//! Claims aggregation
//!
//! Gathers every claim referencing a resolved entity via an OR-combined
//! identifier filter, derives secondary views (authored/edited works) by
//! property label, and assembles first-seen ordered source provenance.
//! Claims are immutable facts; this engine never constructs or edits them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;
use crate::identifier::{Identifier, IdentifierNamespace};
use crate::index::{DocumentIndex, FilterExpr, Predicate, SearchRequest};
use crate::resolver::ResolvedEntity;

/// Property label whose claims become the authored-works view.
pub const AUTHOR_OF: &str = "author of";

/// Property label whose claims become the edited-works view.
pub const EDITOR_OF: &str = "editor of";

/// A typed assertion about an entity, fetched by filter from a claim store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    #[serde(default)]
    pub claim_source: Option<String>,
    #[serde(default)]
    pub claim_created: Option<DateTime<Utc>>,
    pub property_label: String,
    #[serde(default)]
    pub object_label: Option<String>,
    #[serde(default)]
    pub object_instance_of: Option<String>,
    #[serde(default)]
    pub object_identifier_doi: Option<String>,
    #[serde(default)]
    pub subject_label: Option<String>,
    #[serde(default)]
    pub subject_identifier_email: Option<String>,
    #[serde(default)]
    pub subject_identifier_orcid: Option<String>,
    #[serde(default)]
    pub date_qualifier: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A derived work entry (from "author of" / "editor of" claims).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Work {
    pub title: String,
    /// DOI exactly as the claim recorded it. Also the enrichment lookup key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Resolvable link when the claim object carries a DOI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Publication metadata from the cached-publications index, when the
    /// enrichment lookup is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<Value>,
}

/// Aggregated claims with derived views and provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimsBundle {
    pub claims: Vec<Claim>,
    pub authored_works: Vec<Work>,
    pub edited_works: Vec<Work>,
    /// Entity's own declared source first, then each distinct claim source
    /// in first-seen order.
    pub sources: Vec<String>,
    /// Total matching claims reported upstream.
    pub total: u64,
    /// True when the fetch hit the page bound; the claim list is then a
    /// lower bound and callers must not treat it as complete.
    pub truncated: bool,
}

/// Aggregates claims for resolved entities.
pub struct ClaimsAggregator {
    index: Arc<dyn DocumentIndex>,
    claims_index: String,
    publications_index: String,
    page_limit: usize,
}

impl ClaimsAggregator {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        claims_index: impl Into<String>,
        publications_index: impl Into<String>,
        page_limit: usize,
    ) -> Self {
        Self {
            index,
            claims_index: claims_index.into(),
            publications_index: publications_index.into(),
            page_limit,
        }
    }

    /// Gather and merge every claim referencing the entity.
    ///
    /// An entity with no claim-filterable identifiers yields an empty
    /// bundle, not an error. A claims-store outage propagates.
    pub async fn aggregate(&self, resolved: &ResolvedEntity) -> Result<ClaimsBundle, GatewayError> {
        let filter = Self::subject_filter(&resolved.entity.identifiers());

        let (claims, total) = if filter.is_empty() {
            (Vec::new(), 0)
        } else {
            let resp = self
                .index
                .search(
                    &self.claims_index,
                    &SearchRequest::filtered(filter, self.page_limit),
                )
                .await?;
            let claims = resp
                .hits
                .into_iter()
                .map(serde_json::from_value::<Claim>)
                .collect::<Result<Vec<_>, _>>()?;
            (claims, resp.total)
        };

        let truncated = claims.len() >= self.page_limit && self.page_limit > 0;
        if truncated {
            tracing::warn!(
                entity_id = %resolved.entity.entity_id,
                limit = self.page_limit,
                total,
                "claims fetch hit page bound, result is a lower bound"
            );
        }

        let mut authored_works = derive_works(&claims, AUTHOR_OF);
        let mut edited_works = derive_works(&claims, EDITOR_OF);
        self.enrich_publications(&mut authored_works).await;
        self.enrich_publications(&mut edited_works).await;

        Ok(ClaimsBundle {
            sources: merge_sources(&resolved.sources, &claims),
            authored_works,
            edited_works,
            total,
            truncated,
            claims,
        })
    }

    /// Single OR-group over every claim-filterable identifier the entity
    /// holds.
    fn subject_filter(identifiers: &[Identifier]) -> FilterExpr {
        let group: Vec<Predicate> = identifiers
            .iter()
            .filter_map(|id| {
                id.namespace
                    .claim_subject_field()
                    .map(|field| Predicate::new(field, &id.value))
            })
            .collect();
        FilterExpr::new().and_group(group)
    }

    /// Secondary enrichment: attach cached publication metadata to works
    /// that carry a DOI. An unavailable publications index degrades
    /// gracefully and never fails the primary payload.
    async fn enrich_publications(&self, works: &mut [Work]) {
        for work in works.iter_mut() {
            let Some(doi) = work.doi.clone() else { continue };
            match self
                .index
                .get_document(&self.publications_index, &doi)
                .await
            {
                Ok(publication) => work.publication = publication,
                Err(e) => {
                    tracing::warn!(doi = %doi, error = %e, "publication enrichment unavailable");
                    return;
                }
            }
        }
    }

    /// Look up one cached publication record by DOI.
    pub async fn publication(&self, doi: &str) -> Result<Value, GatewayError> {
        self.index
            .get_document(&self.publications_index, doi)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                index: self.publications_index.clone(),
                key: format!("doi = {doi}"),
            })
    }
}

/// Claims with the given property label, as work entries.
fn derive_works(claims: &[Claim], property_label: &str) -> Vec<Work> {
    claims
        .iter()
        .filter(|c| c.property_label == property_label)
        .filter_map(|c| {
            let title = c.object_label.clone()?;
            let doi = c.object_identifier_doi.clone();
            let link = doi
                .as_ref()
                .and_then(|doi| Identifier::new(IdentifierNamespace::Doi, doi).resolver_url());
            Some(Work {
                title,
                doi,
                link,
                publication: None,
            })
        })
        .collect()
}

/// Seed sources first, then each distinct claim source in first-seen order.
fn merge_sources(seed: &[String], claims: &[Claim]) -> Vec<String> {
    let mut sources: Vec<String> = seed.to_vec();
    for claim in claims {
        if let Some(source) = &claim.claim_source {
            if !sources.iter().any(|s| s == source) {
                sources.push(source.clone());
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::resolver::Entity;
    use serde_json::json;

    fn entity_with(email: Option<&str>, orcid: Option<&str>) -> ResolvedEntity {
        let entity: Entity = serde_json::from_value(json!({
            "entity_id": "e1",
            "entity_source": "directory",
            "identifier_email": email,
            "identifier_orcid": orcid,
        }))
        .unwrap();
        let sources = entity.entity_source.iter().cloned().collect();
        ResolvedEntity { entity, sources }
    }

    fn fixture() -> (Arc<MemoryIndex>, ClaimsAggregator) {
        let index = Arc::new(MemoryIndex::new());
        index.create_index(
            "claims",
            "claim_id",
            &["subject_identifier_email", "subject_identifier_orcid"],
        );
        index.create_index("cached_pubs", "doi", &[]);
        let aggregator = ClaimsAggregator::new(index.clone(), "claims", "cached_pubs", 1000);
        (index, aggregator)
    }

    #[tokio::test]
    async fn merges_claims_across_identifiers() {
        let (index, aggregator) = fixture();
        index.add_documents(
            "claims",
            vec![
                json!({"claim_id": "c1", "property_label": "employed by",
                       "object_label": "Water Mission Area",
                       "subject_identifier_email": "a@b.com",
                       "claim_source": "directory"}),
                json!({"claim_id": "c2", "property_label": "author of",
                       "object_label": "Streamflow trends",
                       "subject_identifier_orcid": "0000-0003-1682-4031",
                       "object_identifier_doi": "10.5066/p9abc123",
                       "claim_source": "pub_index"}),
                json!({"claim_id": "c3", "property_label": "author of",
                       "object_label": "Unrelated",
                       "subject_identifier_email": "other@b.com"}),
            ],
        );

        let resolved = entity_with(Some("a@b.com"), Some("0000-0003-1682-4031"));
        let bundle = aggregator.aggregate(&resolved).await.unwrap();

        assert_eq!(bundle.claims.len(), 2);
        assert_eq!(bundle.total, 2);
        assert!(!bundle.truncated);
        assert_eq!(bundle.authored_works.len(), 1);
        assert_eq!(bundle.authored_works[0].title, "Streamflow trends");
        assert_eq!(
            bundle.authored_works[0].link.as_deref(),
            Some("https://doi.org/10.5066/P9ABC123")
        );
    }

    #[tokio::test]
    async fn sources_start_with_entity_source_and_never_duplicate() {
        let (index, aggregator) = fixture();
        index.add_documents(
            "claims",
            vec![
                json!({"claim_id": "c1", "property_label": "field of work",
                       "object_label": "hydrology",
                       "subject_identifier_email": "a@b.com",
                       "claim_source": "orcid"}),
                json!({"claim_id": "c2", "property_label": "expertise",
                       "object_label": "floods",
                       "subject_identifier_email": "a@b.com",
                       "claim_source": "directory"}),
                json!({"claim_id": "c3", "property_label": "expertise",
                       "object_label": "droughts",
                       "subject_identifier_email": "a@b.com",
                       "claim_source": "orcid"}),
            ],
        );

        let resolved = entity_with(Some("a@b.com"), None);
        let bundle = aggregator.aggregate(&resolved).await.unwrap();
        assert_eq!(bundle.sources, vec!["directory", "orcid"]);
    }

    #[tokio::test]
    async fn entity_without_filterable_identifiers_yields_empty_bundle() {
        let (_, aggregator) = fixture();
        let resolved = entity_with(None, None);
        let bundle = aggregator.aggregate(&resolved).await.unwrap();
        assert!(bundle.claims.is_empty());
        assert!(!bundle.truncated);
        assert_eq!(bundle.sources, vec!["directory"]);
    }

    #[tokio::test]
    async fn truncation_is_signaled_at_page_bound() {
        let index = Arc::new(MemoryIndex::new());
        index.create_index("claims", "claim_id", &["subject_identifier_email"]);
        index.create_index("cached_pubs", "doi", &[]);
        index.add_documents(
            "claims",
            (0..3)
                .map(|i| {
                    json!({"claim_id": format!("c{i}"), "property_label": "expertise",
                           "object_label": format!("term {i}"),
                           "subject_identifier_email": "a@b.com"})
                })
                .collect(),
        );
        let aggregator = ClaimsAggregator::new(index, "claims", "cached_pubs", 2);

        let resolved = entity_with(Some("a@b.com"), None);
        let bundle = aggregator.aggregate(&resolved).await.unwrap();
        assert_eq!(bundle.claims.len(), 2);
        assert_eq!(bundle.total, 3);
        assert!(bundle.truncated);
    }

    #[tokio::test]
    async fn publication_enrichment_is_keyed_by_the_claim_doi_casing() {
        let (index, aggregator) = fixture();
        index.add_documents(
            "claims",
            vec![json!({"claim_id": "c1", "property_label": "author of",
                        "object_label": "Streamflow trends",
                        "subject_identifier_email": "a@b.com",
                        "object_identifier_doi": "10.5066/p9abc123"})],
        );
        // Cached under the claim's own casing. The uppercased display link
        // must not leak into the lookup key.
        index.add_documents(
            "cached_pubs",
            vec![json!({"doi": "10.5066/p9abc123", "year": "2021"})],
        );

        let resolved = entity_with(Some("a@b.com"), None);
        let bundle = aggregator.aggregate(&resolved).await.unwrap();
        let work = &bundle.authored_works[0];
        assert_eq!(work.doi.as_deref(), Some("10.5066/p9abc123"));
        assert_eq!(work.link.as_deref(), Some("https://doi.org/10.5066/P9ABC123"));
        let publication = work.publication.as_ref().unwrap();
        assert_eq!(publication["year"], "2021");
    }

    #[tokio::test]
    async fn missing_publications_index_degrades_gracefully() {
        let index = Arc::new(MemoryIndex::new());
        index.create_index("claims", "claim_id", &["subject_identifier_email"]);
        // No cached_pubs index: enrichment lookups fail as unavailable.
        index.add_documents(
            "claims",
            vec![json!({"claim_id": "c1", "property_label": "author of",
                        "object_label": "Streamflow trends",
                        "subject_identifier_email": "a@b.com",
                        "object_identifier_doi": "10.5066/p9abc123"})],
        );
        let aggregator = ClaimsAggregator::new(index, "claims", "cached_pubs", 1000);

        let resolved = entity_with(Some("a@b.com"), None);
        let bundle = aggregator.aggregate(&resolved).await.unwrap();
        assert_eq!(bundle.authored_works.len(), 1);
        assert!(bundle.authored_works[0].publication.is_none());
    }
}
