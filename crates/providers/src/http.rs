//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;
use crate::settings::ServiceConfig;

/// How the API key is presented to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `Authorization: Key <key>` (fal)
    Key,
    /// Key travels in the JSON body; no header is sent.
    Body,
}

/// HTTP client bound to one service's base URL and credential.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    auth: AuthScheme,
    timeout: Duration,
}

impl ServiceClient {
    /// Bind `client` to a service. Fails if the service has no API key.
    pub fn new(
        client: reqwest::Client,
        service: &ServiceConfig,
        auth: AuthScheme,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client,
            base_url: service.base_url.clone(),
            api_key: service.require_key()?.to_string(),
            auth,
            timeout,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `POST {base}/{path}` with a JSON body; returns the parsed JSON reply.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        self.post_json_with(path, body, &[]).await
    }

    /// Like [`post_json`](Self::post_json) with extra request headers.
    pub async fn post_json_with(
        &self,
        path: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, ProviderError> {
        let mut request = self
            .authorize(self.client.post(self.url(path)))
            .timeout(self.timeout)
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// `GET {base}/{path}`; returns the parsed JSON reply.
    pub async fn get_json(&self, path: &str) -> Result<Value, ProviderError> {
        let response = self
            .authorize(self.client.get(self.url(path)))
            .timeout(self.timeout)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            AuthScheme::Bearer => request.bearer_auth(&self.api_key),
            AuthScheme::Key => request.header("Authorization", format!("Key {}", self.api_key)),
            AuthScheme::Body => request,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ProviderError::Api`] carrying
    /// the provider's message on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| provider_message(&v))
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_string()
                    } else {
                        body
                    }
                });
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Check the status code, then read the body as JSON.
    async fn parse_response(response: reqwest::Response) -> Result<Value, ProviderError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("body is not JSON: {e}")))
    }
}

/// Human-readable message from a provider body: `message`, `msg`,
/// `detail`, or a string `error`.
pub fn provider_message(body: &Value) -> Option<String> {
    ["message", "msg", "detail", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

/// First non-empty string or number found at any of `paths`
/// (dot-separated).
pub fn first_id(body: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| {
        let value = p.split('.').try_fold(body, |v, key| v.get(key))?;
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}
