//! HTTP-backed document index client
//!
//! Talks to the index service's REST API. Every call carries the client
//! timeout and a retry-once policy for transient network failures
//! (connect errors and timeouts). Well-formed negative outcomes (404 on a
//! document fetch) are returned as `Ok(None)` and never retried.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;
use crate::index::traits::{DocumentIndex, DocumentPage, SearchRequest, SearchResponse};

const API_KEY_HEADER: &str = "X-Meili-API-Key";

/// Client for the remote index service.
pub struct MeiliIndex {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSearchRequest<'a> {
    q: &'a str,
    limit: usize,
    offset: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    facets_distribution: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    facet_filters: Option<Vec<Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes_to_retrieve: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSearchResponse {
    hits: Vec<Value>,
    nb_hits: u64,
    #[serde(default)]
    facets_distribution: HashMap<String, HashMap<String, u64>>,
}

impl MeiliIndex {
    /// Create a client for the service at `base_url`, with the given
    /// request timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::unavailable("-", format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    /// Send a request, retrying exactly once on transient failures.
    async fn send_with_retry(
        &self,
        index: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, GatewayError> {
        match self.authed(build()).send().await {
            Ok(resp) => Ok(resp),
            Err(first) if first.is_timeout() || first.is_connect() => {
                tracing::debug!(index, error = %first, "transient index failure, retrying once");
                self.authed(build())
                    .send()
                    .await
                    .map_err(|e| GatewayError::unavailable(index, e))
            }
            Err(e) => Err(GatewayError::unavailable(index, e)),
        }
    }

    async fn expect_success(
        &self,
        index: &str,
        resp: Response,
    ) -> Result<Response, GatewayError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::unavailable(
            index,
            format!("{} {}", status, body.chars().take(200).collect::<String>()),
        ))
    }
}

#[async_trait]
impl DocumentIndex for MeiliIndex {
    async fn search(
        &self,
        index: &str,
        req: &SearchRequest,
    ) -> Result<SearchResponse, GatewayError> {
        let url = self.url(&format!("/indexes/{index}/search"));
        let body = WireSearchRequest {
            q: &req.query,
            limit: req.limit,
            offset: req.offset,
            facets_distribution: req.facets_distribution.clone(),
            facet_filters: req
                .facet_filters
                .as_ref()
                .filter(|f| !f.is_empty())
                .map(|f| f.to_wire()),
            attributes_to_retrieve: req.attributes_to_retrieve.clone(),
            sort: req.sort.clone(),
        };

        let resp = self
            .send_with_retry(index, || self.http.post(&url).json(&body))
            .await?;
        let resp = self.expect_success(index, resp).await?;

        let wire: WireSearchResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::unavailable(index, format!("malformed response: {e}")))?;

        Ok(SearchResponse {
            hits: wire.hits,
            total: wire.nb_hits,
            facets_distribution: wire.facets_distribution,
        })
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, GatewayError> {
        let url = self.url(&format!("/indexes/{index}/documents/{id}"));
        let resp = self
            .send_with_retry(index, || self.http.get(&url))
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = self.expect_success(index, resp).await?;
        let doc = resp
            .json()
            .await
            .map_err(|e| GatewayError::unavailable(index, format!("malformed document: {e}")))?;
        Ok(Some(doc))
    }

    async fn get_documents(
        &self,
        index: &str,
        page: &DocumentPage,
    ) -> Result<Vec<Value>, GatewayError> {
        let url = self.url(&format!("/indexes/{index}/documents"));
        let mut query: Vec<(&str, String)> = vec![
            ("limit", page.limit.to_string()),
            ("offset", page.offset.to_string()),
        ];
        if let Some(attrs) = &page.attributes_to_retrieve {
            query.push(("attributesToRetrieve", attrs.join(",")));
        }

        let resp = self
            .send_with_retry(index, || self.http.get(&url).query(&query))
            .await?;
        let resp = self.expect_success(index, resp).await?;
        resp.json()
            .await
            .map_err(|e| GatewayError::unavailable(index, format!("malformed page: {e}")))
    }

    async fn facet_attributes(&self, index: &str) -> Result<Vec<String>, GatewayError> {
        let url = self.url(&format!("/indexes/{index}/settings/attributes-for-faceting"));
        let resp = self
            .send_with_retry(index, || self.http.get(&url))
            .await?;
        let resp = self.expect_success(index, resp).await?;
        resp.json()
            .await
            .map_err(|e| GatewayError::unavailable(index, format!("malformed settings: {e}")))
    }
}
