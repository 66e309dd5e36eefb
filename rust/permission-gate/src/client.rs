//! HTTP client for the permission API.
//! Both endpoints answer with a `{ success, data, message? }` envelope.

use crate::config::GateConfig;
use crate::credentials::CredentialSource;
use crate::error::{GateError, Result};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// Remote decision for a single `resource:action` pair.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteDecision {
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The authenticated user as returned by `/api/auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// Permission API client.
pub struct PermissionClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialSource>,
}

impl PermissionClient {
    pub fn new(config: &GateConfig, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn status_to_error(status: StatusCode, body: String) -> GateError {
        match status.as_u16() {
            401 | 403 => GateError::Unauthorized(status.as_u16()),
            429 => GateError::RateLimited,
            code => GateError::ServerError {
                status: code,
                message: body,
            },
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or(GateError::NotAuthenticated)?;

        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| GateError::InvalidCredential)?;
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let headers = self.headers()?;
        debug!("GET {}", url);

        let resp = self.client.get(url).headers(headers).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, text));
        }

        let status = resp.status().as_u16();
        let envelope: ApiResponse<T> = serde_json::from_slice(&resp.bytes().await?)?;
        if !envelope.success {
            return Err(GateError::ServerError {
                status,
                message: envelope
                    .message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            });
        }

        envelope
            .data
            .ok_or_else(|| GateError::InvalidResponse("no data in response".to_string()))
    }

    /// Ask the server whether the current user may perform `action` on `resource`.
    pub async fn check(&self, resource: &str, action: &str) -> Result<RemoteDecision> {
        let url = format!(
            "{}/api/permissions/check?resource={}&action={}",
            self.base_url,
            urlencoding::encode(resource),
            urlencoding::encode(action)
        );
        self.get(&url).await.map_err(|e| match e {
            GateError::ServerError { status, message } => {
                GateError::RemoteCheckFailed { status, message }
            }
            other => other,
        })
    }

    /// Fetch the authenticated user, including the full permission list.
    pub async fn me(&self) -> Result<CurrentUser> {
        let url = format!("{}/api/auth/me", self.base_url);
        self.get(&url).await
    }
}
