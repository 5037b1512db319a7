//! Transport-agnostic contract with the remote identity service.

use async_trait::async_trait;
use serde::Deserialize;

use super::ApiError;

/// A workspace the logged-in user can enter. Transient; never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct Workspace {
    pub workspace_id: String,
    pub name: String,
}

/// Role reported by the identity service for the current user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleType {
    DomainAdmin,
    WorkspaceOwner,
    WorkspaceMember,
}

/// Authorization breadth requested when granting a session token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Domain,
    Workspace,
    User,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Domain => "DOMAIN",
            Scope::Workspace => "WORKSPACE",
            Scope::User => "USER",
        }
    }
}

/// Access/refresh token pair returned by token issuance
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Remote identity operations the login flow depends on. Every call
/// blocks the flow until response or failure; failures are fatal for the
/// current invocation with no retry.
#[async_trait]
pub trait IdentityGateway {
    /// Resolve a domain name to its domain id
    async fn resolve_domain(&self, name: &str) -> Result<String, ApiError>;

    /// Issue an access/refresh token pair for user credentials
    async fn issue_token(
        &self,
        user_id: &str,
        password: &str,
        domain_id: &str,
    ) -> Result<TokenPair, ApiError>;

    /// Domain id and role of the user behind an access token
    async fn who_am_i(&self, access_token: &str) -> Result<(String, RoleType), ApiError>;

    /// Workspaces accessible to the user behind an access token
    async fn list_workspaces(&self, access_token: &str) -> Result<Vec<Workspace>, ApiError>;

    /// Exchange a refresh token for a scoped access token
    async fn grant_token(
        &self,
        refresh_token: &str,
        scope: Scope,
        domain_id: &str,
        workspace_id: Option<&str>,
    ) -> Result<String, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_type_wire_names() {
        let role: RoleType = serde_json::from_str("\"DOMAIN_ADMIN\"").unwrap();
        assert_eq!(role, RoleType::DomainAdmin);
        let role: RoleType = serde_json::from_str("\"WORKSPACE_OWNER\"").unwrap();
        assert_eq!(role, RoleType::WorkspaceOwner);
        let role: RoleType = serde_json::from_str("\"WORKSPACE_MEMBER\"").unwrap();
        assert_eq!(role, RoleType::WorkspaceMember);
        assert!(serde_json::from_str::<RoleType>("\"INTERN\"").is_err());
    }

    #[test]
    fn test_scope_wire_names() {
        assert_eq!(Scope::Domain.as_str(), "DOMAIN");
        assert_eq!(Scope::Workspace.as_str(), "WORKSPACE");
        assert_eq!(Scope::User.as_str(), "USER");
    }
}
