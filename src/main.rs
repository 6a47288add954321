//! Corpus Gateway Server
//!
//! Main entry point for the gateway's HTTP surface.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corpus_gateway::{
    create_router, AppState, ClaimsAggregator, EntityResolver, FacetedSearchGateway,
    GatewayConfig, MeiliIndex, TermCache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corpus_gateway=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = GatewayConfig::from_env();

    tracing::info!(
        index_url = %config.index_url,
        entities = %config.entities_index,
        claims = %config.claims_index,
        cache_dir = %config.cache_dir.display(),
        "starting corpus-gateway"
    );

    let index = Arc::new(MeiliIndex::new(
        config.index_url.clone(),
        config.index_api_key.clone(),
        config.request_timeout,
    )?);

    let state = AppState {
        resolver: Arc::new(EntityResolver::new(
            index.clone(),
            config.entities_index.clone(),
            config.claims_index.clone(),
        )),
        aggregator: Arc::new(ClaimsAggregator::new(
            index.clone(),
            config.claims_index.clone(),
            config.publications_index.clone(),
            config.claims_page_limit,
        )),
        search: Arc::new(FacetedSearchGateway::new(
            index.clone(),
            config.entities_index.clone(),
        )),
        term_cache: Arc::new(TermCache::new(
            index,
            config.claims_index.clone(),
            config.cache_dir.clone(),
        )),
        claims_store: config.claims_index.clone(),
    };

    let app = create_router(state);

    tracing::info!(addr = %config.listen_addr, "listening");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
