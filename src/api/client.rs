//! HTTP implementation of the identity gateway.
//!
//! The identity service fronts its RPC interface with JSON-over-HTTP
//! endpoints. Requests are POSTs with a JSON body; authenticated calls
//! carry the access token in a `token` header. Endpoints that take
//! `grpc://` or `grpc+ssl://` URIs in the config are rewritten to their
//! HTTP gateway equivalents.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::gateway::{IdentityGateway, RoleType, Scope, TokenPair, Workspace};
use super::ApiError;

/// HTTP request timeout in seconds.
/// The flow itself enforces no timeout; this only bounds a hung socket.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lifetime requested for granted tokens, in seconds (24 hours)
const GRANT_TIMEOUT_SECS: u32 = 86_400;

/// Grant type for refresh-token exchange
const GRANT_TYPE_REFRESH: &str = "REFRESH_TOKEN";

#[derive(Debug, Deserialize)]
struct DomainAuthInfo {
    domain_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenIssueResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct UserProfileResponse {
    domain_id: String,
    role_type: RoleType,
}

#[derive(Debug, Deserialize)]
struct WorkspaceListResponse {
    #[serde(default)]
    results: Vec<Workspace>,
}

#[derive(Debug, Deserialize)]
struct TokenGrantResponse {
    access_token: String,
}

/// Identity service client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
}

impl IdentityClient {
    /// Create a client for the given identity endpoint
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_endpoint(endpoint),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "identity call");

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = token {
            request = request.header("token", token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

/// Rewrite a configured endpoint URI into an HTTP base URL
fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("grpc+ssl://") {
        format!("https://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("grpc://") {
        format!("http://{}", rest)
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl IdentityGateway for IdentityClient {
    async fn resolve_domain(&self, name: &str) -> Result<String, ApiError> {
        let info: DomainAuthInfo = self
            .post(
                "/identity/domain/get-auth-info",
                json!({ "name": name }),
                None,
            )
            .await?;
        Ok(info.domain_id)
    }

    async fn issue_token(
        &self,
        user_id: &str,
        password: &str,
        domain_id: &str,
    ) -> Result<TokenPair, ApiError> {
        let issued: TokenIssueResponse = self
            .post(
                "/identity/token/issue",
                json!({
                    "credentials": {
                        "user_id": user_id,
                        "password": password,
                    },
                    "auth_type": "LOCAL",
                    "domain_id": domain_id,
                }),
                None,
            )
            .await?;
        Ok(TokenPair {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        })
    }

    async fn who_am_i(&self, access_token: &str) -> Result<(String, RoleType), ApiError> {
        let profile: UserProfileResponse = self
            .post("/identity/user-profile/get", json!({}), Some(access_token))
            .await?;
        Ok((profile.domain_id, profile.role_type))
    }

    async fn list_workspaces(&self, access_token: &str) -> Result<Vec<Workspace>, ApiError> {
        let listing: WorkspaceListResponse = self
            .post(
                "/identity/user-profile/get-workspaces",
                json!({}),
                Some(access_token),
            )
            .await?;
        Ok(listing.results)
    }

    async fn grant_token(
        &self,
        refresh_token: &str,
        scope: Scope,
        domain_id: &str,
        workspace_id: Option<&str>,
    ) -> Result<String, ApiError> {
        let mut body = json!({
            "grant_type": GRANT_TYPE_REFRESH,
            "scope": scope.as_str(),
            "token": refresh_token,
            "timeout": GRANT_TIMEOUT_SECS,
            "domain_id": domain_id,
        });
        if let Some(workspace_id) = workspace_id.filter(|w| !w.is_empty()) {
            body["workspace_id"] = json!(workspace_id);
        }

        let granted: TokenGrantResponse =
            self.post("/identity/token/grant", body, None).await?;
        Ok(granted.access_token)
    }
}
