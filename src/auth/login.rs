//! Login orchestration.
//!
//! `LoginFlow` drives the whole authentication chain: it reads the
//! current environment from the config store, branches between app-token
//! and user login, negotiates domain, role, scope, and workspace with the
//! identity service, and persists credentials through the vault only
//! after the final token grant succeeds. Any remote failure aborts the
//! invocation with no partial state written.
//!
//! User interaction goes through the `LoginPrompts` seam so the flow can
//! be exercised with scripted prompts in tests.

use tracing::{info, warn};

use crate::api::{ApiError, IdentityGateway, Scope, Workspace};
use crate::config::{self, ConfigError, ConfigStore, Field};
use crate::vault::{Vault, VaultError};

use super::claims::{self, TokenClaims};

#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("no environment selected")]
    NoEnvironment,

    #[error("no endpoint configured for environment '{0}'")]
    NoEndpoint(String),

    #[error("endpoint for '{0}' is not an identity endpoint; enable proxy mode or point the environment at the identity service first")]
    NotIdentityEndpoint(String),

    #[error("environment name '{0}' is invalid: expected at least three '-' separated segments")]
    InvalidEnvironmentName(String),

    #[error("password does not match the stored credentials")]
    PasswordMismatch,

    #[error("no accessible workspace; ask your administrators or workspace owners for access")]
    NoAccessibleWorkspace,

    #[error("{0} is required")]
    MissingInput(&'static str),

    #[error("cancelled")]
    Cancelled,

    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    #[error(transparent)]
    Rpc(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Outcome of the cached-user picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    /// Index into the cached-user list
    Existing(usize),
    AddNew,
}

/// Outcome of the scope picker shown to domain admins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeChoice {
    Domain,
    Workspaces,
}

/// User-interaction seam for the login flow
pub trait LoginPrompts {
    /// Masked prompt for a raw app token
    fn app_token(&mut self) -> Result<String, LoginError>;

    /// Prompt for a fresh user id and password
    fn credentials(&mut self) -> Result<(String, String), LoginError>;

    /// Masked prompt for a password only
    fn password(&mut self) -> Result<String, LoginError>;

    /// Pick a cached user or choose to add a new one
    fn select_user(&mut self, user_ids: &[String]) -> Result<UserChoice, LoginError>;

    /// Domain admins choose between domain scope and a workspace
    fn select_scope(&mut self) -> Result<ScopeChoice, LoginError>;

    /// Pick a workspace; returns an index into the given slice
    fn select_workspace(&mut self, workspaces: &[Workspace]) -> Result<usize, LoginError>;
}

/// The branch taken after reading the current environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginTarget {
    App {
        environment: String,
    },
    User {
        environment: String,
        endpoint: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    AppTokenSaved {
        /// False when an identical token was already stored
        added: bool,
    },
    LoggedIn {
        user_id: String,
        scope: Scope,
        workspace_id: Option<String>,
    },
}

pub struct LoginFlow<'a, P> {
    store: &'a ConfigStore,
    vault: &'a Vault<'a>,
    prompts: &'a mut P,
    url_override: Option<String>,
}

impl<'a, P: LoginPrompts> LoginFlow<'a, P> {
    pub fn new(
        store: &'a ConfigStore,
        vault: &'a Vault<'a>,
        prompts: &'a mut P,
        url_override: Option<String>,
    ) -> Self {
        Self {
            store,
            vault,
            prompts,
            url_override,
        }
    }

    /// Read the current environment and branch on its kind. For user
    /// environments the identity endpoint is resolved here, layered
    /// config first unless overridden on the command line.
    pub fn target(&self) -> Result<LoginTarget, LoginError> {
        let environment = self
            .store
            .current_environment()?
            .ok_or(LoginError::NoEnvironment)?;

        if config::is_app_environment(&environment) {
            return Ok(LoginTarget::App { environment });
        }

        let endpoint = match &self.url_override {
            Some(url) => url.clone(),
            None => self
                .store
                .get(&environment, Field::Endpoint)?
                .ok_or_else(|| LoginError::NoEndpoint(environment.clone()))?,
        };

        // A non-proxy endpoint must point at the identity service itself,
        // otherwise the token calls below would hit the wrong backend.
        let proxy = self
            .store
            .get(&environment, Field::Proxy)?
            .map(|p| p == "true")
            .unwrap_or(false);
        if !proxy && !endpoint.to_lowercase().contains("identity") {
            return Err(LoginError::NotIdentityEndpoint(environment));
        }

        Ok(LoginTarget::User {
            environment,
            endpoint,
        })
    }

    /// App environments take a raw bearer token and store it in the
    /// environment's de-duplicated token list. The token is stored as-is;
    /// an inspectable token with an unpermitted role only draws a warning,
    /// since role enforcement happens where the token is used.
    pub fn app_login(&mut self, environment: &str) -> Result<LoginOutcome, LoginError> {
        let token = self.prompts.app_token()?;
        if let Ok(claims) = TokenClaims::decode(&token) {
            if let Err(e) = claims.check_role() {
                warn!(environment, "{e}");
            }
        }
        let added = self.store.append_app_token(environment, &token)?;
        if added {
            info!(environment, "app token saved");
        } else {
            info!(environment, "identical app token already stored");
        }
        Ok(LoginOutcome::AppTokenSaved { added })
    }

    /// Full user login chain: credentials, domain resolution, token
    /// issuance, role and scope resolution, token grant, persistence.
    pub async fn user_login<G>(
        &mut self,
        environment: &str,
        gateway: &G,
    ) -> Result<LoginOutcome, LoginError>
    where
        G: IdentityGateway + Sync,
    {
        let (user_id, password) = self.acquire_credentials(environment)?;

        // The domain name is the middle segment of the environment name;
        // validated before any remote call is made.
        let segments: Vec<&str> = environment.split('-').collect();
        if segments.len() < 3 {
            return Err(LoginError::InvalidEnvironmentName(environment.to_string()));
        }
        let domain_name = segments[1];

        let domain_id = gateway.resolve_domain(domain_name).await?;
        let issued = gateway.issue_token(&user_id, &password, &domain_id).await?;

        let (domain_id, role_type) = gateway.who_am_i(&issued.access_token).await?;

        let (scope, workspace_id) = match role_type {
            crate::api::RoleType::DomainAdmin => match self.prompts.select_scope()? {
                ScopeChoice::Domain => (Scope::Domain, None),
                ScopeChoice::Workspaces => {
                    self.pick_workspace(gateway, &issued.access_token).await?
                }
            },
            _ => self.pick_workspace(gateway, &issued.access_token).await?,
        };

        let access_token = gateway
            .grant_token(
                &issued.refresh_token,
                scope,
                &domain_id,
                workspace_id.as_deref(),
            )
            .await?;

        // Persist only now, after the entire chain has succeeded
        let encrypted = self.vault.encrypt(&password)?;
        self.vault
            .upsert_user(environment, &user_id, &encrypted, &access_token)?;
        info!(environment, user_id, scope = scope.as_str(), "logged in");

        Ok(LoginOutcome::LoggedIn {
            user_id,
            scope,
            workspace_id,
        })
    }

    /// Credential acquisition. Cached users are offered through the
    /// selector; an unexpired cached token reuses the stored password
    /// silently, an expired one requires the password to be re-entered
    /// and match. A stored password that no longer decrypts degrades to
    /// a plain prompt instead of failing the flow.
    fn acquire_credentials(&mut self, environment: &str) -> Result<(String, String), LoginError> {
        let users = self.vault.users(environment)?;
        if users.is_empty() {
            return self.prompts.credentials();
        }

        let user_ids: Vec<String> = users.iter().map(|u| u.userid.clone()).collect();
        let choice = self.prompts.select_user(&user_ids)?;
        let user = match choice {
            UserChoice::AddNew => return self.prompts.credentials(),
            UserChoice::Existing(index) => &users[index],
        };

        if !claims::token_expired(&user.token) {
            match self.vault.decrypt(&user.password) {
                Ok(password) => {
                    info!(user_id = %user.userid, "using saved credentials");
                    return Ok((user.userid.clone(), password));
                }
                Err(VaultError::Decrypt(e)) => {
                    warn!(user_id = %user.userid, error = %e, "stored password unusable, prompting");
                    let password = self.prompts.password()?;
                    return Ok((user.userid.clone(), password));
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Token expired: the password must be re-entered and match the
        // stored one before new tokens are issued under this identity.
        let entered = self.prompts.password()?;
        match self.vault.decrypt(&user.password) {
            Ok(stored) if stored == entered => Ok((user.userid.clone(), entered)),
            Ok(_) => Err(LoginError::PasswordMismatch),
            Err(VaultError::Decrypt(e)) => {
                warn!(user_id = %user.userid, error = %e, "stored password unusable, skipping match check");
                Ok((user.userid.clone(), entered))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn pick_workspace<G>(
        &mut self,
        gateway: &G,
        access_token: &str,
    ) -> Result<(Scope, Option<String>), LoginError>
    where
        G: IdentityGateway + Sync,
    {
        let workspaces = gateway.list_workspaces(access_token).await?;
        if workspaces.is_empty() {
            return Err(LoginError::NoAccessibleWorkspace);
        }
        let index = self.prompts.select_workspace(&workspaces)?;
        Ok((
            Scope::Workspace,
            Some(workspaces[index].workspace_id.clone()),
        ))
    }
}
