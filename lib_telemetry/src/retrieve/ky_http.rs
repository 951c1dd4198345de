//! # HTTP Retrieval Utilities
//!
//! This module provides an asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries and
//! standardized response handling: non-2xx statuses come back as an
//! `ApiResponse` with `success: false` instead of an error, so callers can
//! tell a rejected request from a network failure.

use std::time::Duration;

use anyhow::Context;
use reqwest::{
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined. Always ends in `/`.
    base_url: Url,
    /// An optional Bearer token used for authorization.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    /// * `base_url` - Absolute base URL (e.g., "http://localhost:3000/telemetry").
    ///   A trailing slash is added when missing so relative paths append to it.
    /// * `auth_token` - An optional string for the Authorization header.
    /// * `timeout` - Per-request timeout.
    /// * `max_retries` - Transient-failure retries inside one request (0 disables).
    ///
    /// # Errors
    /// Fails if `base_url` is not an absolute URL or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> anyhow::Result<Self> {
        let url = Self::normalize_base(base_url)?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lib_telemetry/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let mut builder = ClientBuilder::new(http);
        if max_retries > 0 {
            // Configure an exponential backoff policy for transient failures
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            inner: builder.build(),
            base_url: url,
            auth_token,
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL. A leading `/` is ignored so the
    /// base path is always kept.
    pub fn url_for(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn normalize_base(base_url: &str) -> anyhow::Result<Url> {
        let mut raw = base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .with_context(|| format!("Invalid base URL (must be absolute): {}", base_url))?;
        if url.cannot_be_a_base() {
            anyhow::bail!("Invalid base URL (cannot be a base): {}", base_url);
        }
        Ok(url)
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<Vec<u8>>,
    ) -> anyhow::Result<reqwest_middleware::RequestBuilder> {
        let full_url = self.url_for(path)?;
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(b) = body {
            req = req.header(CONTENT_TYPE, "application/json").body(b);
        }
        Ok(req)
    }

    /// Performs a generic HTTP request and deserializes a JSON response.
    ///
    /// # Errors
    /// Returns an error if URL joining, serialization, the network exchange, or
    /// decoding of a successful body fails. Non-2xx statuses are not errors.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<&B>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let payload = body.map(serde_json::to_vec).transpose()?;
        let response: reqwest::Response = self.build(method, path, headers, payload)?.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// POSTs `body` as JSON and returns the raw response text.
    ///
    /// Ingest endpoints answer with arbitrary (often empty) bodies, so nothing
    /// is decoded here; only the status decides success.
    pub async fn post_json<B>(&self, path: &str, body: &B) -> anyhow::Result<ApiResponse<String>>
    where
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(body)?;
        let response: reqwest::Response = self
            .build(Method::POST, path, None, Some(payload))?
            .send()
            .await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let text = response.text().await.ok();

        Ok(ApiResponse {
            success: status.is_success(),
            data: if status.is_success() { text.clone() } else { None },
            error_body: if status.is_success() { None } else { text },
            status: status.as_u16(),
            headers: resp_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, None, Duration::from_secs(1), 0).unwrap()
    }

    #[test]
    fn base_path_is_kept_when_joining() {
        let api = client("http://localhost:3000/telemetry");
        assert_eq!(api.base_url().as_str(), "http://localhost:3000/telemetry/");
        assert_eq!(
            api.url_for("event").unwrap().as_str(),
            "http://localhost:3000/telemetry/event"
        );
        assert_eq!(
            api.url_for("/screen-view").unwrap().as_str(),
            "http://localhost:3000/telemetry/screen-view"
        );
    }

    #[test]
    fn relative_base_is_rejected() {
        assert!(ApiClient::new("telemetry", None, Duration::from_secs(1), 0).is_err());
    }
}
