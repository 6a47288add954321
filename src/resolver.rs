//! Entity resolution
//!
//! Resolves a classified identifier to exactly one entity document in the
//! entity index. Email lookups additionally try the historical hashed
//! document-id strategies before falling back to a filtered search.
//! Duplicate hits on namespaces that require uniqueness are reported as
//! `Ambiguous`, never silently resolved.

use std::collections::HashSet;
use std::sync::Arc;

use md5::Md5;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::GatewayError;
use crate::identifier::{Identifier, IdentifierNamespace};
use crate::index::{DocumentIndex, DocumentPage, FilterExpr, SearchRequest};

/// Bounded candidate fetch for resolution; enough to detect duplicates
/// without scanning.
const RESOLVE_SEARCH_LIMIT: usize = 5;

/// Page size for full-corpus identifier scans.
const SCAN_PAGE_SIZE: usize = 1000;

/// Safety cap on scan pages.
const MAX_SCAN_PAGES: usize = 100;

/// An entity document from the index.
///
/// Entities are created and replaced wholesale by the ingestion pipeline;
/// this engine only reads them. Unknown fields are carried in `extra` so
/// the full document survives into API payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub entity_source: Option<String>,
    #[serde(default)]
    pub identifier_email: Option<String>,
    #[serde(default)]
    pub identifier_orcid: Option<String>,
    #[serde(default)]
    pub identifier_doi: Option<String>,
    #[serde(default)]
    pub identifier_wikidata: Option<String>,
    #[serde(default)]
    pub identifier_profile_url: Option<String>,
    #[serde(default)]
    pub identifier_sbid: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Entity {
    /// Value the entity carries for a namespace, if any.
    pub fn identifier_value(&self, namespace: IdentifierNamespace) -> Option<&str> {
        let value = match namespace {
            IdentifierNamespace::Email => &self.identifier_email,
            IdentifierNamespace::Orcid => &self.identifier_orcid,
            IdentifierNamespace::Doi => &self.identifier_doi,
            IdentifierNamespace::WikidataQid => &self.identifier_wikidata,
            IdentifierNamespace::ProfileUrl => &self.identifier_profile_url,
            IdentifierNamespace::Sbid => &self.identifier_sbid,
        };
        value.as_deref()
    }

    /// All identifiers the entity holds, in a fixed namespace order.
    pub fn identifiers(&self) -> Vec<Identifier> {
        use IdentifierNamespace::*;
        [Email, Orcid, Doi, WikidataQid, ProfileUrl, Sbid]
            .into_iter()
            .filter_map(|ns| {
                self.identifier_value(ns)
                    .map(|value| Identifier::new(ns, value))
            })
            .collect()
    }
}

/// A resolved entity with its provenance list seeded from the document's
/// own declared source.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEntity {
    pub entity: Entity,
    pub sources: Vec<String>,
}

impl ResolvedEntity {
    fn new(entity: Entity) -> Self {
        let sources = entity.entity_source.iter().cloned().collect();
        Self { entity, sources }
    }
}

/// Resolves classified identifiers against the entity index.
pub struct EntityResolver {
    index: Arc<dyn DocumentIndex>,
    entities_index: String,
    claims_index: String,
}

impl EntityResolver {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        entities_index: impl Into<String>,
        claims_index: impl Into<String>,
    ) -> Self {
        Self {
            index,
            entities_index: entities_index.into(),
            claims_index: claims_index.into(),
        }
    }

    /// Resolve an identifier to exactly one entity.
    ///
    /// Zero hits is `NotFound`. More than one hit on a namespace that
    /// requires uniqueness (email, orcid) is `Ambiguous`; other namespaces
    /// take the first bounded hit.
    pub async fn resolve(&self, identifier: &Identifier) -> Result<ResolvedEntity, GatewayError> {
        if identifier.namespace == IdentifierNamespace::Email {
            if let Some(entity) = self.lookup_by_hashed_id(&identifier.value).await? {
                return Ok(ResolvedEntity::new(entity));
            }
        }

        let field = identifier.namespace.entity_field();
        let filter = FilterExpr::new().and(field, &identifier.value);
        let resp = self
            .index
            .search(
                &self.entities_index,
                &SearchRequest::filtered(filter, RESOLVE_SEARCH_LIMIT),
            )
            .await?;

        match resp.total {
            0 => Err(GatewayError::NotFound {
                index: self.entities_index.clone(),
                key: format!("{field} = {}", identifier.value),
            }),
            n if n > 1 && identifier.namespace.expects_unique() => Err(GatewayError::Ambiguous {
                index: self.entities_index.clone(),
                field: field.to_string(),
                value: identifier.value.clone(),
                count: n as usize,
            }),
            n => {
                if n > 1 {
                    tracing::debug!(
                        field,
                        value = %identifier.value,
                        hits = n,
                        "non-unique namespace, taking first hit"
                    );
                }
                let hit = resp.hits.into_iter().next().ok_or_else(|| {
                    GatewayError::unavailable(&self.entities_index, "hit count and page disagree")
                })?;
                let entity: Entity = serde_json::from_value(hit)?;
                Ok(ResolvedEntity::new(entity))
            }
        }
    }

    /// Two-step hashed document-id lookup for email identifiers.
    ///
    /// SHA-256 of the lowercased address is the current id convention;
    /// MD5 is the legacy scheme kept as an explicit fallback attempt.
    async fn lookup_by_hashed_id(&self, email: &str) -> Result<Option<Entity>, GatewayError> {
        let normalized = email.to_lowercase();
        let primary = hex::encode(Sha256::digest(normalized.as_bytes()));
        let legacy = hex::encode(Md5::digest(normalized.as_bytes()));

        for id in [primary, legacy] {
            if let Some(doc) = self.index.get_document(&self.entities_index, &id).await? {
                let entity: Entity = serde_json::from_value(doc)?;
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }

    /// Identifier values of a namespace mentioned in claims but absent from
    /// every entity document. Computed as a true set difference; the result
    /// is sorted for stable output.
    pub async fn unresolved_identifiers(
        &self,
        namespace: IdentifierNamespace,
    ) -> Result<Vec<String>, GatewayError> {
        let mention_fields = namespace.claim_mention_fields();
        if mention_fields.is_empty() {
            return Err(GatewayError::InvalidIdentifier {
                input: namespace.as_str().to_string(),
                detected: Some(namespace),
            });
        }

        let mentioned = self
            .collect_values(&self.claims_index, mention_fields)
            .await?;
        let known = self
            .collect_values(&self.entities_index, &[namespace.entity_field()])
            .await?;

        let mut unresolved: Vec<String> = mentioned.difference(&known).cloned().collect();
        unresolved.sort();
        Ok(unresolved)
    }

    /// Scan an index and collect every non-empty string value under the
    /// given fields.
    async fn collect_values(
        &self,
        index: &str,
        fields: &[&str],
    ) -> Result<HashSet<String>, GatewayError> {
        let mut values = HashSet::new();
        let attributes: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut offset = 0;

        for page_no in 0.. {
            if page_no >= MAX_SCAN_PAGES {
                tracing::warn!(index, "identifier scan hit page cap, result may be partial");
                break;
            }
            let page = self
                .index
                .get_documents(
                    index,
                    &DocumentPage {
                        limit: SCAN_PAGE_SIZE,
                        offset,
                        attributes_to_retrieve: Some(attributes.clone()),
                    },
                )
                .await?;
            let count = page.len();

            for doc in page {
                for field in fields {
                    if let Some(value) = doc.get(*field).and_then(Value::as_str) {
                        if !value.is_empty() {
                            values.insert(value.to_string());
                        }
                    }
                }
            }

            if count < SCAN_PAGE_SIZE {
                break;
            }
            offset += SCAN_PAGE_SIZE;
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::classify;
    use crate::index::MemoryIndex;
    use serde_json::json;

    fn fixture() -> (Arc<MemoryIndex>, EntityResolver) {
        let index = Arc::new(MemoryIndex::new());
        index.create_index(
            "entities",
            "entity_id",
            &["identifier_email", "identifier_orcid", "identifier_wikidata"],
        );
        index.create_index("claims", "claim_id", &[]);
        let resolver = EntityResolver::new(index.clone(), "entities", "claims");
        (index, resolver)
    }

    #[tokio::test]
    async fn resolves_unique_orcid_round_trip() {
        let (index, resolver) = fixture();
        index.add_documents(
            "entities",
            vec![json!({
                "entity_id": "e1",
                "display_name": "Jane Doe",
                "entity_source": "directory",
                "identifier_orcid": "0000-0003-1682-4031"
            })],
        );

        let id = classify("0000-0003-1682-4031").unwrap();
        let resolved = resolver.resolve(&id).await.unwrap();
        assert_eq!(resolved.entity.entity_id, "e1");
        assert_eq!(resolved.sources, vec!["directory".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_email_is_ambiguous() {
        let (index, resolver) = fixture();
        index.add_documents(
            "entities",
            vec![
                json!({"entity_id": "e1", "identifier_email": "a@b.com"}),
                json!({"entity_id": "e2", "identifier_email": "a@b.com"}),
            ],
        );

        let id = classify("a@b.com").unwrap();
        let err = resolver.resolve(&id).await.unwrap_err();
        match err {
            GatewayError::Ambiguous { count, .. } => assert_eq!(count, 2),
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let (_, resolver) = fixture();
        let id = classify("Q42").unwrap();
        let err = resolver.resolve(&id).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn email_resolves_via_hashed_document_id() {
        let (index, resolver) = fixture();
        let id_hash = hex::encode(Sha256::digest(b"a@b.com"));
        index.add_documents(
            "entities",
            vec![json!({
                "entity_id": id_hash,
                "identifier_email": "a@b.com",
                "entity_source": "directory"
            })],
        );

        // Hashing normalizes case, so the mixed-case input still hits the
        // primary document-id strategy.
        let id = classify("A@B.com").unwrap();
        let resolved = resolver.resolve(&id).await.unwrap();
        assert_eq!(resolved.entity.entity_id, id_hash);
    }

    #[tokio::test]
    async fn legacy_md5_document_id_still_resolves() {
        let (index, resolver) = fixture();
        let legacy_hash = hex::encode(Md5::digest(b"old@b.com"));
        index.add_documents(
            "entities",
            vec![json!({
                "entity_id": legacy_hash,
                "identifier_email": "old@b.com"
            })],
        );

        let id = classify("old@b.com").unwrap();
        let resolved = resolver.resolve(&id).await.unwrap();
        assert_eq!(resolved.entity.entity_id, legacy_hash);
    }

    #[tokio::test]
    async fn unresolved_identifiers_is_a_set_difference() {
        let (index, resolver) = fixture();
        index.add_documents(
            "entities",
            vec![json!({"entity_id": "e1", "identifier_orcid": "0000-0001-0000-0001"})],
        );
        index.add_documents(
            "claims",
            vec![
                json!({"claim_id": "c1", "subject_identifier_orcid": "0000-0001-0000-0001"}),
                json!({"claim_id": "c2", "subject_identifier_orcid": "0000-0002-0000-0002"}),
                // Duplicate mention must not produce a duplicate entry.
                json!({"claim_id": "c3", "subject_identifier_orcid": "0000-0002-0000-0002"}),
            ],
        );

        let unresolved = resolver
            .unresolved_identifiers(IdentifierNamespace::Orcid)
            .await
            .unwrap();
        assert_eq!(unresolved, vec!["0000-0002-0000-0002".to_string()]);
    }

    #[tokio::test]
    async fn unlistable_namespace_is_rejected() {
        let (_, resolver) = fixture();
        let err = resolver
            .unresolved_identifiers(IdentifierNamespace::Sbid)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIdentifier { .. }));
    }
}
