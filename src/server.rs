//! HTTP surface
//!
//! Thin JSON adapters over the engine: parameter extraction, status-code
//! mapping, nothing else. All state is the explicitly constructed
//! `AppState`; handlers share no globals.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::claims::ClaimsAggregator;
use crate::error::GatewayError;
use crate::identifier::{classify, IdentifierNamespace};
use crate::resolver::EntityResolver;
use crate::search::{parse_filter_criteria, FacetedSearchGateway, PageParams};
use crate::termcache::TermCache;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<EntityResolver>,
    pub aggregator: Arc<ClaimsAggregator>,
    pub search: Arc<FacetedSearchGateway>,
    pub term_cache: Arc<TermCache>,
    /// Name of the claims store exposed in identifier-listing paths.
    pub claims_store: String,
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/entity", get(lookup_entity))
        .route("/search", get(search_entities))
        .route("/claims/:property", get(claim_terms))
        .route("/identifiers/:store/:namespace", get(unresolved_identifiers))
        .route("/doi", get(publication))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detected_namespace: Option<IdentifierNamespace>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::InvalidIdentifier { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Ambiguous { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::IndexUnavailable { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detected_namespace = match &self {
            GatewayError::InvalidIdentifier { detected, .. } => *detected,
            _ => None,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            detected_namespace,
        };
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Deserialize)]
struct EntityQuery {
    id: Option<String>,
}

/// Assembled entity package: the resolved entity plus its aggregated,
/// provenance-annotated claims.
#[derive(Serialize)]
struct EntityPackage {
    entity: crate::resolver::Entity,
    claims: Vec<crate::claims::Claim>,
    authored_works: Vec<crate::claims::Work>,
    edited_works: Vec<crate::claims::Work>,
    sources: Vec<String>,
    claims_total: u64,
    claims_truncated: bool,
}

async fn lookup_entity(
    State(state): State<AppState>,
    Query(params): Query<EntityQuery>,
) -> Result<Json<EntityPackage>, GatewayError> {
    let raw = params.id.unwrap_or_default();
    let identifier = classify(&raw).ok_or_else(|| GatewayError::InvalidIdentifier {
        input: raw.clone(),
        detected: None,
    })?;

    tracing::debug!(namespace = %identifier.namespace, "resolving entity");
    let resolved = state.resolver.resolve(&identifier).await?;
    let bundle = state.aggregator.aggregate(&resolved).await?;

    Ok(Json(EntityPackage {
        entity: resolved.entity,
        claims: bundle.claims,
        authored_works: bundle.authored_works,
        edited_works: bundle.edited_works,
        sources: bundle.sources,
        claims_total: bundle.total,
        claims_truncated: bundle.truncated,
    }))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    filters: Option<String>,
    #[serde(default)]
    limit: Option<String>,
    #[serde(default)]
    offset: Option<String>,
}

async fn search_entities(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<crate::search::SearchPage>, GatewayError> {
    let query = params.q.unwrap_or_default();
    let filters = params
        .filters
        .as_deref()
        .map(parse_filter_criteria)
        .unwrap_or_default();
    let page = PageParams::lenient(params.limit.as_deref(), params.offset.as_deref());

    let result = state.search.search(&query, &filters, page).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct TermsQuery {
    #[serde(default)]
    refresh: Option<bool>,
}

async fn claim_terms(
    State(state): State<AppState>,
    Path(property): Path<String>,
    Query(params): Query<TermsQuery>,
) -> Result<Json<crate::termcache::CachedTermSet>, GatewayError> {
    // URL slugs use underscores for spaces in property labels.
    let label = property.replace('_', " ");
    let use_cache = !params.refresh.unwrap_or(false);
    let terms = state.term_cache.get_terms(&label, use_cache).await?;
    Ok(Json(terms))
}

#[derive(Serialize)]
struct UnresolvedListing {
    store: String,
    namespace: IdentifierNamespace,
    unresolved: Vec<String>,
}

async fn unresolved_identifiers(
    State(state): State<AppState>,
    Path((store, namespace)): Path<(String, String)>,
) -> Result<Json<UnresolvedListing>, GatewayError> {
    if store != state.claims_store {
        return Err(GatewayError::NotFound {
            index: store,
            key: "claims store".to_string(),
        });
    }
    let namespace =
        IdentifierNamespace::parse(&namespace).ok_or_else(|| GatewayError::InvalidIdentifier {
            input: namespace,
            detected: None,
        })?;

    let unresolved = state.resolver.unresolved_identifiers(namespace).await?;
    Ok(Json(UnresolvedListing {
        store,
        namespace,
        unresolved,
    }))
}

#[derive(Deserialize)]
struct DoiQuery {
    doi: Option<String>,
}

async fn publication(
    State(state): State<AppState>,
    Query(params): Query<DoiQuery>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let doi = params.doi.filter(|d| !d.is_empty()).ok_or_else(|| {
        GatewayError::InvalidIdentifier {
            input: String::new(),
            detected: None,
        }
    })?;
    let record = state.aggregator.publication(&doi).await?;
    Ok(Json(record))
}
