//! JSON/HTTP control-plane gateway client.
//!
//! Routes (relative to the configured base URL):
//!
//! | Call                      | Method | Path                                   |
//! |---------------------------|--------|----------------------------------------|
//! | modify master password    | POST   | `databases/{id}/master-password`       |
//! | modify auth token         | POST   | `cache-clusters/{id}/auth-token`       |
//! | describe cache            | GET    | `cache-clusters/{id}`                  |
//! | update broker user        | PUT    | `brokers/{id}/users/{username}`        |
//! | reboot broker             | POST   | `brokers/{id}/reboot`                  |
//! | describe broker           | GET    | `brokers/{id}`                         |
//! | update vault credential   | PUT    | `vault/resources/{id}/credential`      |
//!
//! Identifiers are sent as single percent-encoded path segments. 404 maps
//! to [`TargetError::NotFound`]; any other non-2xx status maps to
//! [`TargetError::Rejected`] carrying the response body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::json;

use super::{
    AuthTokenStrategy, BrokerApi, CacheApi, DatabaseApi, ResourceState, TargetError, VaultApi,
    VaultCredentials,
};
use crate::store::Secret;

/// Per-request timeout used by [`HttpControlPlane::new`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway client implementing every target API.
pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
    vault: Option<VaultCredentials>,
}

impl HttpControlPlane {
    /// Create a client for the gateway at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, TargetError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, TargetError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TargetError::Misconfigured {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Self::with_client(client, base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, TargetError> {
        let base_url = Url::parse(base_url).map_err(|e| TargetError::Misconfigured {
            message: format!("invalid control plane endpoint {:?}: {}", base_url, e),
        })?;

        if base_url.cannot_be_a_base() {
            return Err(TargetError::Misconfigured {
                message: format!("control plane endpoint {} cannot be a base URL", base_url),
            });
        }

        Ok(Self {
            client,
            base_url,
            vault: None,
        })
    }

    /// Authenticate vault calls with `credentials`.
    pub fn with_vault_credentials(mut self, credentials: Option<VaultCredentials>) -> Self {
        self.vault = credentials;
        self
    }

    /// Append `segments` to the base URL, encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, resource: &str, request: RequestBuilder) -> Result<reqwest::Response, TargetError> {
        let response = request.send().await.map_err(|e| TargetError::Transport {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(TargetError::NotFound {
                resource: resource.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "no response body".to_string());

        Err(TargetError::Rejected {
            resource: resource.to_string(),
            message: format!("{}: {}", status, body),
        })
    }

    async fn describe(&self, resource: &str, url: Url) -> Result<ResourceState, TargetError> {
        let response = self.send(resource, self.client.get(url)).await?;

        response.json().await.map_err(|e| TargetError::Transport {
            message: format!("invalid describe response for {}: {}", resource, e),
        })
    }
}

impl std::fmt::Debug for HttpControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpControlPlane")
            .field("base_url", &self.base_url.as_str())
            .field("vault_enabled", &self.vault.is_some())
            .finish()
    }
}

#[async_trait]
impl DatabaseApi for HttpControlPlane {
    async fn modify_master_password(&self, db_id: &str, password: &Secret) -> Result<(), TargetError> {
        let request = self
            .client
            .post(self.url(&["databases", db_id, "master-password"]))
            .json(&json!({
                "master_user_password": password.expose(),
                "apply_immediately": true,
            }));

        self.send(db_id, request).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheApi for HttpControlPlane {
    async fn modify_auth_token(
        &self,
        group_id: &str,
        token: &Secret,
        strategy: AuthTokenStrategy,
    ) -> Result<(), TargetError> {
        let request = self
            .client
            .post(self.url(&["cache-clusters", group_id, "auth-token"]))
            .json(&json!({
                "auth_token": token.expose(),
                "strategy": strategy,
                "apply_immediately": true,
            }));

        self.send(group_id, request).await?;
        Ok(())
    }

    async fn describe_cache(&self, group_id: &str) -> Result<ResourceState, TargetError> {
        self.describe(group_id, self.url(&["cache-clusters", group_id]))
            .await
    }
}

#[async_trait]
impl BrokerApi for HttpControlPlane {
    async fn update_user(
        &self,
        broker_id: &str,
        username: &str,
        password: &Secret,
        console_access: bool,
    ) -> Result<(), TargetError> {
        let request = self
            .client
            .put(self.url(&["brokers", broker_id, "users", username]))
            .json(&json!({
                "password": password.expose(),
                "console_access": console_access,
            }));

        self.send(broker_id, request).await?;
        Ok(())
    }

    async fn reboot(&self, broker_id: &str) -> Result<(), TargetError> {
        let request = self
            .client
            .post(self.url(&["brokers", broker_id, "reboot"]));

        self.send(broker_id, request).await?;
        Ok(())
    }

    async fn describe_broker(&self, broker_id: &str) -> Result<ResourceState, TargetError> {
        self.describe(broker_id, self.url(&["brokers", broker_id]))
            .await
    }
}

#[async_trait]
impl VaultApi for HttpControlPlane {
    async fn update_credential(
        &self,
        resource_id: &str,
        username: Option<&str>,
        password: &Secret,
    ) -> Result<(), TargetError> {
        let credentials = self.vault.as_ref().ok_or_else(|| TargetError::Misconfigured {
            message: "vault access keys are not configured".to_string(),
        })?;

        let request = self
            .client
            .put(self.url(&["vault", "resources", resource_id, "credential"]))
            .header("X-Vault-Access-Key", credentials.access_key.expose())
            .header("X-Vault-Secret-Key", credentials.secret_key.expose())
            .json(&json!({
                "username": username,
                "password": password.expose(),
            }));

        self.send(resource_id, request).await?;
        Ok(())
    }
}
