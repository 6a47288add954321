//! Staleness-aware term cache
//!
//! Persists distinct object-label listings per claim property label (e.g.
//! all "expertise" values) together with a `max_claim_created` watermark.
//! A cached set is reused only while the live upstream maximum timestamp
//! does not exceed the watermark; otherwise the full aggregation is redone
//! and the artifact replaced atomically (write-to-temp-then-rename, so a
//! crash mid-write never corrupts the previous valid cache).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::index::{DocumentIndex, FilterExpr, SearchRequest};

/// Page size for the full aggregation scan.
const AGGREGATION_PAGE_SIZE: usize = 1000;

/// Safety cap on aggregation pages per property label.
const MAX_AGGREGATION_PAGES: usize = 100;

/// One cached term with its occurrence count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermCount {
    pub object_label: String,
    /// Number of distinct subjects carrying the term, not raw claim count.
    pub total_occurrences: usize,
}

/// Persisted aggregate of object labels for one property label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTermSet {
    pub property_label: String,
    /// Maximum `claim_created` among the aggregated claims.
    pub max_claim_created: Option<DateTime<Utc>>,
    pub terms: Vec<TermCount>,
}

/// Cache of derived term listings, keyed by property label.
pub struct TermCache {
    index: Arc<dyn DocumentIndex>,
    claims_index: String,
    cache_dir: PathBuf,
    /// Per-key write serialization: two concurrent recomputations of the
    /// same label must not interleave.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TermCache {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        claims_index: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            claims_index: claims_index.into(),
            cache_dir: cache_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the term listing for a property label.
    ///
    /// With `use_cache`, a persisted set is returned unmodified as long as
    /// its watermark covers the live upstream maximum `claim_created`;
    /// otherwise (or when the cache is missing or unreadable) the full
    /// aggregation runs and the artifact is replaced.
    pub async fn get_terms(
        &self,
        property_label: &str,
        use_cache: bool,
    ) -> Result<CachedTermSet, GatewayError> {
        let key_lock = self.key_lock(property_label).await;
        let _guard = key_lock.lock().await;

        if use_cache {
            if let Some(cached) = self.read_cache(property_label) {
                let upstream_max = self.probe_max_created(property_label).await?;
                if upstream_max.is_none() || cached.max_claim_created >= upstream_max {
                    tracing::debug!(property_label, "term cache fresh");
                    return Ok(cached);
                }
                tracing::info!(
                    property_label,
                    cached = ?cached.max_claim_created,
                    upstream = ?upstream_max,
                    "term cache stale, recomputing"
                );
            }
        }

        let set = self.aggregate(property_label).await?;
        self.persist(&set)?;
        Ok(set)
    }

    async fn key_lock(&self, property_label: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(property_label.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn cache_path(&self, property_label: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", slug(property_label)))
    }

    /// Read the persisted set. An unreadable file is reported as corrupt
    /// via a warning and treated as absent, which forces a recompute.
    fn read_cache(&self, property_label: &str) -> Option<CachedTermSet> {
        let path = self.cache_path(property_label);
        if !path.exists() {
            return None;
        }
        match read_term_set(&path) {
            Ok(set) => Some(set),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "term cache unreadable, recomputing");
                None
            }
        }
    }

    /// Cheap upstream probe: only the maximum `claim_created` for the
    /// property label, never the full claim set.
    async fn probe_max_created(
        &self,
        property_label: &str,
    ) -> Result<Option<DateTime<Utc>>, GatewayError> {
        let req = SearchRequest {
            limit: 1,
            facet_filters: Some(FilterExpr::new().and("property_label", property_label)),
            attributes_to_retrieve: Some(vec!["claim_created".to_string()]),
            sort: Some(vec!["claim_created:desc".to_string()]),
            ..SearchRequest::default()
        };
        let resp = self.index.search(&self.claims_index, &req).await?;
        Ok(resp
            .hits
            .first()
            .and_then(|hit| hit.get("claim_created"))
            .and_then(parse_created))
    }

    /// Full aggregation: distinct subjects per object label, plus the new
    /// watermark.
    async fn aggregate(&self, property_label: &str) -> Result<CachedTermSet, GatewayError> {
        let mut subjects_by_label: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut max_created: Option<DateTime<Utc>> = None;
        let mut offset = 0;

        for page_no in 0.. {
            if page_no >= MAX_AGGREGATION_PAGES {
                tracing::warn!(property_label, "term aggregation hit page cap");
                break;
            }
            let req = SearchRequest {
                limit: AGGREGATION_PAGE_SIZE,
                offset,
                facet_filters: Some(FilterExpr::new().and("property_label", property_label)),
                attributes_to_retrieve: Some(vec![
                    "object_label".to_string(),
                    "subject_label".to_string(),
                    "claim_created".to_string(),
                ]),
                ..SearchRequest::default()
            };
            let resp = self.index.search(&self.claims_index, &req).await?;
            let count = resp.hits.len();

            for hit in resp.hits {
                let Some(object_label) = hit.get("object_label").and_then(Value::as_str) else {
                    continue;
                };
                if object_label.is_empty() {
                    continue;
                }
                let subject = hit
                    .get("subject_label")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                subjects_by_label
                    .entry(object_label.to_string())
                    .or_default()
                    .insert(subject);

                if let Some(created) = hit.get("claim_created").and_then(parse_created) {
                    max_created = Some(match max_created {
                        Some(current) => current.max(created),
                        None => created,
                    });
                }
            }

            if count < AGGREGATION_PAGE_SIZE {
                break;
            }
            offset += AGGREGATION_PAGE_SIZE;
        }

        let terms = subjects_by_label
            .into_iter()
            .map(|(object_label, subjects)| TermCount {
                object_label,
                total_occurrences: subjects.len(),
            })
            .collect();

        Ok(CachedTermSet {
            property_label: property_label.to_string(),
            max_claim_created: max_created,
            terms,
        })
    }

    /// Replace the artifact atomically: write to a temp file in the same
    /// directory, then rename over the previous one.
    fn persist(&self, set: &CachedTermSet) -> Result<(), GatewayError> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(&set.property_label);

        let tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        serde_json::to_writer_pretty(tmp.as_file(), set)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::info!(
            property_label = %set.property_label,
            terms = set.terms.len(),
            watermark = ?set.max_claim_created,
            path = %path.display(),
            "term cache persisted"
        );
        Ok(())
    }
}

fn read_term_set(path: &Path) -> Result<CachedTermSet, GatewayError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| GatewayError::CacheCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    serde_json::from_str(&content).map_err(|e| GatewayError::CacheCorrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn parse_created(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

/// Filesystem-safe cache key for a property label.
fn slug(property_label: &str) -> String {
    property_label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::traits::{DocumentPage, SearchResponse};
    use crate::index::MemoryIndex;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegating index that counts search calls, to observe cache reuse.
    struct CountingIndex {
        inner: MemoryIndex,
        searches: AtomicUsize,
    }

    #[async_trait]
    impl DocumentIndex for CountingIndex {
        async fn search(
            &self,
            index: &str,
            req: &SearchRequest,
        ) -> Result<SearchResponse, GatewayError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.inner.search(index, req).await
        }

        async fn get_document(
            &self,
            index: &str,
            id: &str,
        ) -> Result<Option<Value>, GatewayError> {
            self.inner.get_document(index, id).await
        }

        async fn get_documents(
            &self,
            index: &str,
            page: &DocumentPage,
        ) -> Result<Vec<Value>, GatewayError> {
            self.inner.get_documents(index, page).await
        }

        async fn facet_attributes(&self, index: &str) -> Result<Vec<String>, GatewayError> {
            self.inner.facet_attributes(index).await
        }
    }

    fn expertise_claim(id: &str, subject: &str, term: &str, created: &str) -> Value {
        json!({
            "claim_id": id,
            "property_label": "expertise",
            "subject_label": subject,
            "object_label": term,
            "claim_created": created,
        })
    }

    fn fixture(claims: Vec<Value>) -> (Arc<CountingIndex>, TermCache, tempfile::TempDir) {
        let inner = MemoryIndex::new();
        inner.create_index("claims", "claim_id", &["property_label"]);
        inner.add_documents("claims", claims);
        let index = Arc::new(CountingIndex {
            inner,
            searches: AtomicUsize::new(0),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = TermCache::new(index.clone(), "claims", dir.path());
        (index, cache, dir)
    }

    #[tokio::test]
    async fn counts_distinct_subjects_not_claims() {
        let (_, cache, _dir) = fixture(vec![
            expertise_claim("c1", "Jane", "hydrology", "2024-01-01T00:00:00Z"),
            expertise_claim("c2", "Jane", "hydrology", "2024-01-02T00:00:00Z"),
            expertise_claim("c3", "John", "hydrology", "2024-01-03T00:00:00Z"),
            expertise_claim("c4", "Jane", "geology", "2024-01-04T00:00:00Z"),
        ]);

        let set = cache.get_terms("expertise", true).await.unwrap();
        assert_eq!(
            set.terms,
            vec![
                TermCount {
                    object_label: "geology".into(),
                    total_occurrences: 1
                },
                TermCount {
                    object_label: "hydrology".into(),
                    total_occurrences: 2
                },
            ]
        );
        assert_eq!(
            set.max_claim_created.unwrap().to_rfc3339(),
            "2024-01-04T00:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn second_call_reuses_cache_without_full_aggregation() {
        let (index, cache, _dir) = fixture(vec![expertise_claim(
            "c1",
            "Jane",
            "hydrology",
            "2024-01-01T00:00:00Z",
        )]);

        cache.get_terms("expertise", true).await.unwrap();
        let after_first = index.searches.load(Ordering::SeqCst);

        cache.get_terms("expertise", true).await.unwrap();
        let after_second = index.searches.load(Ordering::SeqCst);

        // The second call issues only the one-hit watermark probe.
        assert_eq!(after_second - after_first, 1);
    }

    #[tokio::test]
    async fn stale_watermark_triggers_recompute_and_new_watermark() {
        let (index, cache, _dir) = fixture(vec![expertise_claim(
            "c1",
            "Jane",
            "hydrology",
            "2024-01-01T00:00:00Z",
        )]);

        let first = cache.get_terms("expertise", true).await.unwrap();
        assert_eq!(
            first.max_claim_created.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );

        index.inner.add_documents(
            "claims",
            vec![expertise_claim(
                "c2",
                "John",
                "seismology",
                "2024-02-01T00:00:00Z",
            )],
        );

        let second = cache.get_terms("expertise", true).await.unwrap();
        assert!(
            second.max_claim_created.unwrap()
                >= "2024-02-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(second
            .terms
            .iter()
            .any(|t| t.object_label == "seismology"));
    }

    #[tokio::test]
    async fn corrupt_cache_file_recomputes_instead_of_failing() {
        let (_, cache, dir) = fixture(vec![expertise_claim(
            "c1",
            "Jane",
            "hydrology",
            "2024-01-01T00:00:00Z",
        )]);

        std::fs::write(dir.path().join("expertise.json"), "not json").unwrap();

        let set = cache.get_terms("expertise", true).await.unwrap();
        assert_eq!(set.terms.len(), 1);
        // The artifact was replaced with a valid one.
        let replaced = read_term_set(&dir.path().join("expertise.json")).unwrap();
        assert_eq!(replaced.terms, set.terms);
    }

    #[tokio::test]
    async fn bypassing_the_cache_always_recomputes() {
        let (index, cache, _dir) = fixture(vec![expertise_claim(
            "c1",
            "Jane",
            "hydrology",
            "2024-01-01T00:00:00Z",
        )]);

        cache.get_terms("expertise", true).await.unwrap();
        let before = index.searches.load(Ordering::SeqCst);
        cache.get_terms("expertise", false).await.unwrap();
        // Full aggregation ran again (no probe, one scan page).
        assert!(index.searches.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(slug("field of work"), "field_of_work");
        assert_eq!(slug("job title"), "job_title");
    }
}
