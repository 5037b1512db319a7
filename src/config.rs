//! Layered environment configuration.
//!
//! Environment settings are resolved across two tiers with fixed precedence:
//! the application tier (`config.json`) and the user-cache tier
//! (`cache/config.json`), both under `~/.config/atlasctl/`. The app tier
//! holds endpoints, proxy flags, app tokens and the current-environment
//! marker; the cache tier holds per-environment cached user credentials.
//!
//! A missing tier file is treated as an empty tier. A malformed file is a
//! fatal error. Writes are whole-file rewrites; a single active process is
//! assumed, so no file locking is done.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Application name used for the config directory path
pub const APP_NAME: &str = "atlasctl";

/// App-tier config file name
const CONFIG_FILE: &str = "config.json";

/// Cache-tier config file name, under the `cache` subdirectory
const CACHE_CONFIG_FILE: &str = "config.json";

/// Environment names ending in this suffix are app-kind environments
const APP_SUFFIX: &str = "-app";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not locate the user config directory")]
    NoConfigDir,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Storage tier, in override precedence order: `App` shadows `Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    App,
    Cache,
}

/// Per-environment fields addressable through `get`/`set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Endpoint,
    Proxy,
    /// Legacy single-token field, app tier only
    Token,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Endpoint => "endpoint",
            Field::Proxy => "proxy",
            Field::Token => "token",
        }
    }
}

/// A single app token entry in an app-kind environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
}

/// A cached user credential for a user-kind environment.
/// The password is stored encrypted; see `vault`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedUser {
    pub userid: String,
    pub password: String,
    pub token: String,
}

/// Raw on-disk environment record. Which fields are meaningful depends on
/// the tier and the environment kind; `Environment` is the typed view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EnvRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proxy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tokens: Vec<TokenEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    users: Vec<CachedUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TierFile {
    /// Name of the current environment (app tier only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    environments: BTreeMap<String, EnvRecord>,
}

/// Typed view of an environment, tagged by kind so that app-only fields
/// are not reachable from user-kind environments and vice versa.
#[derive(Debug, Clone)]
pub enum Environment {
    App(AppEnvironment),
    User(UserEnvironment),
}

#[derive(Debug, Clone)]
pub struct AppEnvironment {
    pub name: String,
    pub endpoint: Option<String>,
    pub proxy: bool,
    /// Legacy single-token field
    pub token: Option<String>,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserEnvironment {
    pub name: String,
    pub endpoint: Option<String>,
    pub proxy: bool,
}

/// An environment name in `list()` output, with the current-environment marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvListing {
    pub name: String,
    pub current: bool,
}

/// True if the environment name marks an app-kind environment
pub fn is_app_environment(name: &str) -> bool {
    name.ends_with(APP_SUFFIX)
}

pub struct ConfigStore {
    app_path: PathBuf,
    cache_path: PathBuf,
}

impl ConfigStore {
    /// Create a store rooted at the standard config directory
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        let base = config_dir.join(APP_NAME);
        Ok(Self {
            app_path: base.join(CONFIG_FILE),
            cache_path: base.join("cache").join(CACHE_CONFIG_FILE),
        })
    }

    /// Create a store with explicit tier file paths (used by tests)
    pub fn with_paths(app_path: PathBuf, cache_path: PathBuf) -> Self {
        Self {
            app_path,
            cache_path,
        }
    }

    fn tier_path(&self, tier: Tier) -> &Path {
        match tier {
            Tier::App => &self.app_path,
            Tier::Cache => &self.cache_path,
        }
    }

    /// Load a tier file. A missing file is an empty tier; a file that
    /// exists but does not parse is fatal.
    fn load(&self, tier: Tier) -> Result<TierFile, ConfigError> {
        let path = self.tier_path(tier);
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TierFile::default());
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Whole-file rewrite of a tier
    fn save(&self, tier: Tier, file: &TierFile) -> Result<(), ConfigError> {
        let path = self.tier_path(tier);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        let contents = serde_json::to_string_pretty(file).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(path = %path.display(), "wrote config tier");
        Ok(())
    }

    /// Name of the current environment, recorded in the app tier only
    pub fn current_environment(&self) -> Result<Option<String>, ConfigError> {
        let file = self.load(Tier::App)?;
        Ok(file.environment.filter(|name| !name.is_empty()))
    }

    /// Set the current environment marker in the app tier
    pub fn set_current_environment(&self, name: &str) -> Result<(), ConfigError> {
        let mut file = self.load(Tier::App)?;
        file.environment = Some(name.to_string());
        self.save(Tier::App, &file)
    }

    /// Resolve a field for an environment across tiers, app tier first.
    /// Returns the first non-empty value.
    pub fn get(&self, environment: &str, field: Field) -> Result<Option<String>, ConfigError> {
        for tier in [Tier::App, Tier::Cache] {
            let file = self.load(tier)?;
            if let Some(record) = file.environments.get(environment) {
                let value = match field {
                    Field::Endpoint => record.endpoint.clone(),
                    Field::Proxy => record.proxy.map(|p| p.to_string()),
                    Field::Token => record.token.clone(),
                };
                if let Some(value) = value.filter(|v| !v.is_empty()) {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    /// Write a field for an environment into the specified tier only
    pub fn set(
        &self,
        environment: &str,
        field: Field,
        value: &str,
        tier: Tier,
    ) -> Result<(), ConfigError> {
        let mut file = self.load(tier)?;
        let record = file.environments.entry(environment.to_string()).or_default();
        match field {
            Field::Endpoint => record.endpoint = Some(value.to_string()),
            Field::Proxy => {
                let parsed = value.parse::<bool>().map_err(|_| ConfigError::InvalidValue {
                    field: field.name(),
                    value: value.to_string(),
                })?;
                record.proxy = Some(parsed);
            }
            Field::Token => record.token = Some(value.to_string()),
        }
        self.save(tier, &file)
    }

    /// Union of environment names across tiers, sorted, with the
    /// current-environment marker
    pub fn list(&self) -> Result<Vec<EnvListing>, ConfigError> {
        let app = self.load(Tier::App)?;
        let cache = self.load(Tier::Cache)?;

        let mut names: BTreeSet<String> = app.environments.keys().cloned().collect();
        names.extend(cache.environments.keys().cloned());

        let current = app.environment.unwrap_or_default();
        Ok(names
            .into_iter()
            .map(|name| EnvListing {
                current: name == current,
                name,
            })
            .collect())
    }

    /// Typed view of an environment with endpoint/proxy resolved across tiers.
    /// Returns `None` if the environment exists in neither tier.
    pub fn environment(&self, name: &str) -> Result<Option<Environment>, ConfigError> {
        let app = self.load(Tier::App)?;
        let cache = self.load(Tier::Cache)?;
        if !app.environments.contains_key(name) && !cache.environments.contains_key(name) {
            return Ok(None);
        }

        let endpoint = self.get(name, Field::Endpoint)?;
        let proxy = self
            .get(name, Field::Proxy)?
            .map(|p| p == "true")
            .unwrap_or(false);

        if is_app_environment(name) {
            let record = app.environments.get(name);
            Ok(Some(Environment::App(AppEnvironment {
                name: name.to_string(),
                endpoint,
                proxy,
                token: record.and_then(|r| r.token.clone()),
                tokens: record
                    .map(|r| r.tokens.iter().map(|t| t.token.clone()).collect())
                    .unwrap_or_default(),
            })))
        } else {
            Ok(Some(Environment::User(UserEnvironment {
                name: name.to_string(),
                endpoint,
                proxy,
            })))
        }
    }

    /// Append an app token to the environment's token list, skipping the
    /// append if an identical token is already present. Endpoint and proxy
    /// settings are preserved by the rewrite. Returns whether the token
    /// was added.
    pub fn append_app_token(&self, environment: &str, token: &str) -> Result<bool, ConfigError> {
        let mut file = self.load(Tier::App)?;
        let record = file.environments.entry(environment.to_string()).or_default();
        if record.tokens.iter().any(|t| t.token == token) {
            return Ok(false);
        }
        record.tokens.push(TokenEntry {
            token: token.to_string(),
        });
        self.save(Tier::App, &file)?;
        Ok(true)
    }

    /// Cached users for an environment (cache tier)
    pub fn users(&self, environment: &str) -> Result<Vec<CachedUser>, ConfigError> {
        let file = self.load(Tier::Cache)?;
        Ok(file
            .environments
            .get(environment)
            .map(|r| r.users.clone())
            .unwrap_or_default())
    }

    /// Insert a cached user, or replace the password/token of an existing
    /// entry with the same user id. The per-environment user count never
    /// grows from repeated logins of the same user.
    pub fn upsert_user(&self, environment: &str, user: CachedUser) -> Result<(), ConfigError> {
        let mut file = self.load(Tier::Cache)?;
        let record = file.environments.entry(environment.to_string()).or_default();
        match record.users.iter_mut().find(|u| u.userid == user.userid) {
            Some(existing) => {
                existing.password = user.password;
                existing.token = user.token;
            }
            None => record.users.push(user),
        }
        self.save(Tier::Cache, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_paths(
            dir.path().join("config.json"),
            dir.path().join("cache").join("config.json"),
        );
        (dir, store)
    }

    #[test]
    fn test_missing_files_are_empty_tiers() {
        let (_dir, store) = test_store();
        assert!(store.current_environment().unwrap().is_none());
        assert!(store.get("dev-acme-user", Field::Endpoint).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let (dir, store) = test_store();
        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        assert!(matches!(
            store.current_environment(),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_app_tier_shadows_cache_tier() {
        let (_dir, store) = test_store();
        store
            .set("dev-acme-user", Field::Endpoint, "grpc://cache", Tier::Cache)
            .unwrap();
        store
            .set("dev-acme-user", Field::Endpoint, "grpc://app", Tier::App)
            .unwrap();

        let endpoint = store.get("dev-acme-user", Field::Endpoint).unwrap();
        assert_eq!(endpoint.as_deref(), Some("grpc://app"));
    }

    #[test]
    fn test_get_falls_through_to_cache_tier() {
        let (_dir, store) = test_store();
        store
            .set("dev-acme-user", Field::Endpoint, "grpc://cache", Tier::Cache)
            .unwrap();
        let endpoint = store.get("dev-acme-user", Field::Endpoint).unwrap();
        assert_eq!(endpoint.as_deref(), Some("grpc://cache"));
    }

    #[test]
    fn test_list_unions_tiers_with_current_marker() {
        let (_dir, store) = test_store();
        store
            .set("dev-acme-user", Field::Endpoint, "grpc://a", Tier::App)
            .unwrap();
        store
            .set("stg-acme-user", Field::Endpoint, "grpc://b", Tier::Cache)
            .unwrap();
        store.set_current_environment("dev-acme-user").unwrap();

        let listings = store.list().unwrap();
        assert_eq!(
            listings,
            vec![
                EnvListing {
                    name: "dev-acme-user".into(),
                    current: true,
                },
                EnvListing {
                    name: "stg-acme-user".into(),
                    current: false,
                },
            ]
        );
    }

    #[test]
    fn test_append_app_token_dedups() {
        let (_dir, store) = test_store();
        assert!(store.append_app_token("dev-acme-app", "tok-1").unwrap());
        assert!(store.append_app_token("dev-acme-app", "tok-2").unwrap());
        assert!(!store.append_app_token("dev-acme-app", "tok-1").unwrap());

        match store.environment("dev-acme-app").unwrap().unwrap() {
            Environment::App(env) => assert_eq!(env.tokens, vec!["tok-1", "tok-2"]),
            Environment::User(_) => panic!("expected app environment"),
        }
    }

    #[test]
    fn test_append_app_token_preserves_settings() {
        let (_dir, store) = test_store();
        store
            .set("dev-acme-app", Field::Endpoint, "grpc://id", Tier::App)
            .unwrap();
        store
            .set("dev-acme-app", Field::Proxy, "true", Tier::App)
            .unwrap();
        store.append_app_token("dev-acme-app", "tok-1").unwrap();

        assert_eq!(
            store.get("dev-acme-app", Field::Endpoint).unwrap().as_deref(),
            Some("grpc://id")
        );
        assert_eq!(
            store.get("dev-acme-app", Field::Proxy).unwrap().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_legacy_token_field_resolves_across_tiers() {
        let (_dir, store) = test_store();
        store
            .set("dev-acme-app", Field::Token, "cache-tok", Tier::Cache)
            .unwrap();
        assert_eq!(
            store.get("dev-acme-app", Field::Token).unwrap().as_deref(),
            Some("cache-tok")
        );

        store
            .set("dev-acme-app", Field::Token, "app-tok", Tier::App)
            .unwrap();
        assert_eq!(
            store.get("dev-acme-app", Field::Token).unwrap().as_deref(),
            Some("app-tok")
        );

        // The typed view carries the legacy field from the app tier
        match store.environment("dev-acme-app").unwrap().unwrap() {
            Environment::App(env) => assert_eq!(env.token.as_deref(), Some("app-tok")),
            Environment::User(_) => panic!("expected app environment"),
        }
    }

    #[test]
    fn test_environment_kind_follows_name_suffix() {
        let (_dir, store) = test_store();
        store
            .set("dev-acme-app", Field::Endpoint, "grpc://id", Tier::App)
            .unwrap();
        store
            .set("dev-acme-user", Field::Endpoint, "grpc://id", Tier::App)
            .unwrap();

        assert!(matches!(
            store.environment("dev-acme-app").unwrap(),
            Some(Environment::App(_))
        ));
        assert!(matches!(
            store.environment("dev-acme-user").unwrap(),
            Some(Environment::User(_))
        ));
        assert!(store.environment("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_user_replaces_in_place() {
        let (_dir, store) = test_store();
        store
            .upsert_user(
                "dev-acme-user",
                CachedUser {
                    userid: "alice".into(),
                    password: "enc-1".into(),
                    token: "tok-1".into(),
                },
            )
            .unwrap();
        store
            .upsert_user(
                "dev-acme-user",
                CachedUser {
                    userid: "alice".into(),
                    password: "enc-2".into(),
                    token: "tok-2".into(),
                },
            )
            .unwrap();

        let users = store.users("dev-acme-user").unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].password, "enc-2");
        assert_eq!(users[0].token, "tok-2");
    }

    #[test]
    fn test_proxy_rejects_non_bool() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.set("dev-acme-user", Field::Proxy, "maybe", Tier::App),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
