//! HTTP client for the admin REST API.

use std::marker::PhantomData;

use async_trait::async_trait;
use frameworks_shared::{FetchError, FetchResponse, QueryParams};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::table::TableFetcher;

/// HTTP client for the admin API, authenticating with a bearer token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new()
            .with_base_url(config.api_base_url.clone())
            .with_token(config.token.clone())
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// GET and decode a JSON body.
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, FetchError> {
        let rb = self.authorize(self.client.get(self.url(path)));
        let text = send(rb).await?;
        decode(&text)
    }

    /// POST a JSON body and decode the JSON reply. An empty reply decodes
    /// as `null`.
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, FetchError> {
        let body_bytes = serde_json::to_vec(body).map_err(|e| FetchError::Deserialize(e.to_string()))?;
        let rb = self
            .authorize(self.client.post(self.url(path)))
            .body(body_bytes)
            .header("Content-Type", "application/json");
        let text = send(rb).await?;
        if text.is_empty() {
            decode("null")
        } else {
            decode(&text)
        }
    }

    /// One page of a listing endpoint, queried with `params`.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> Result<FetchResponse<T>, FetchError> {
        self.get_json(&with_query(path, params)).await
    }

    /// A [`TableFetcher`] for the listing at `path`.
    pub fn endpoint<T>(&self, path: impl Into<String>) -> ListEndpoint<T> {
        ListEndpoint {
            client: self.clone(),
            path: path.into(),
            _rows: PhantomData,
        }
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn with_query(path: &str, params: &QueryParams) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{params}")
}

async fn send(rb: RequestBuilder) -> Result<String, FetchError> {
    let resp = rb.send().await.map_err(|e| FetchError::Network(e.to_string()))?;

    let status = resp.status().as_u16();
    let is_success = resp.status().is_success();

    let text = resp
        .text()
        .await
        .map_err(|e| FetchError::Network(format!("failed to read body: {e}")))?;

    if !is_success {
        return Err(FetchError::Http { status, body: text });
    }
    Ok(text)
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, FetchError> {
    serde_json::from_str(text).map_err(|e| FetchError::Deserialize(e.to_string()))
}

/// A REST listing endpoint bound to a client, usable as a table's fetcher.
#[derive(Debug)]
pub struct ListEndpoint<T> {
    client: ApiClient,
    path: String,
    _rows: PhantomData<fn() -> T>,
}

impl<T> Clone for ListEndpoint<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            path: self.path.clone(),
            _rows: PhantomData,
        }
    }
}

impl<T> ListEndpoint<T> {
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl<T> TableFetcher<T> for ListEndpoint<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self, params: QueryParams) -> Result<FetchResponse<T>, FetchError> {
        self.client.list(&self.path, &params).await
    }
}
