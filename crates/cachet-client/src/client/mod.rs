//! Authenticated HTTP client shared by both backends

use std::time::Duration;

use cachet_core::error::CacheError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::ClientResult;

const USER_AGENT: &str = concat!("cachet/", env!("CARGO_PKG_VERSION"));

/// Decoded JSON response; HTTP failures are data, not errors
#[derive(Debug, Clone, PartialEq)]
pub struct TypedResponse<T> {
    pub status: u16,
    pub result: Option<T>,
    /// Server-supplied error message for non-success responses
    pub message: Option<String>,
}

impl<T> TypedResponse<T> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error body shape used by the cache service
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "msg")]
    message: Option<String>,
}

/// HTTP client bound to one service base URL
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Base URL, always ending in `/`
    base_url: Url,
}

impl HttpClient {
    /// Create a client with bearer auth and a fixed Accept header
    pub fn new(base_url: &str, token: Option<&str>, accept: Option<&str>) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                CacheError::ConfigValidation {
                    field: "ACTIONS_RUNTIME_TOKEN".to_string(),
                    reason: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(accept) = accept {
            let value = HeaderValue::from_str(accept)
                .map_err(|e| CacheError::validation(format!("Invalid Accept header: {e}")))?;
            headers.insert(ACCEPT, value);
        }

        let client = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| CacheError::network(format!("Failed to create HTTP client: {e}"), e))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the base URL
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CacheError::validation(format!("Invalid cache service path {path}: {e}")))
    }

    /// Start a request carrying the client's default headers
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<TypedResponse<T>> {
        self.send_json(self.request(Method::GET, url)).await
    }

    pub async fn post_json<B, T>(&self, url: Url, body: &B) -> ClientResult<TypedResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(self.request(Method::POST, url).json(body)).await
    }

    pub async fn patch_json<B, T>(&self, url: Url, body: &B) -> ClientResult<TypedResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(self.request(Method::PATCH, url).json(body)).await
    }

    /// Send a request and decode a JSON body from a success response
    ///
    /// 204 and empty bodies decode to `None`. Non-success statuses keep the
    /// server's message and never produce an `Err`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> ClientResult<TypedResponse<T>> {
        let response = self.send_raw(request).await?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::network(format!("Failed to read response body: {e}"), e))?;

        if !(200..300).contains(&status) {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .or_else(|| {
                    let text = String::from_utf8_lossy(&body).trim().to_string();
                    (!text.is_empty()).then_some(text)
                });
            debug!("Cache service returned {status}: {message:?}");
            return Ok(TypedResponse {
                status,
                result: None,
                message,
            });
        }

        if status == 204 || body.is_empty() {
            return Ok(TypedResponse {
                status,
                result: None,
                message: None,
            });
        }

        let result = serde_json::from_slice(&body).map_err(|e| CacheError::InvalidResponse {
            message: format!("Failed to parse response body: {e}"),
        })?;

        Ok(TypedResponse {
            status,
            result: Some(result),
            message: None,
        })
    }

    /// Send a request and hand back the raw response
    pub async fn send_raw(&self, request: RequestBuilder) -> ClientResult<Response> {
        request
            .send()
            .await
            .map_err(|e| CacheError::network(format!("Request to cache service failed: {e}"), e))
    }
}

/// Parse a base URL and make sure relative joins land beneath it
pub fn normalize_base_url(raw: &str) -> ClientResult<Url> {
    let mut url = Url::parse(raw).map_err(|e| CacheError::ConfigValidation {
        field: "cache service URL".to_string(),
        reason: e.to_string(),
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
