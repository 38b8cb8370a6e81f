//! Authentication
//!
//! Credential storage and resolution for LLM providers. Resolution order is
//! fixed: environment variable, then user config (with `{env:VAR}`
//! substitution), then the credential store.

pub mod oauth;
pub mod providers;
pub mod store;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use thiserror::Error;

use crate::config::UserConfig;
use crate::llm::ProviderId;

pub use oauth::{OAuthConfig, OAuthResult};
pub use store::{AuthStore, Credential};

/// No credential could be resolved from any source.
#[derive(Debug, Error)]
#[error("no API key found for provider: {0}")]
pub struct CredentialMissing(pub ProviderId);

/// Resolves and manages provider credentials.
pub struct Manager {
    store: AuthStore,
    config: UserConfig,
}

impl Manager {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let store = AuthStore::open(data_dir)?;
        let config = UserConfig::load().unwrap_or_default();
        Ok(Self { store, config })
    }

    /// Construct with an explicit user config (used in tests).
    pub fn with_config(data_dir: &Path, config: UserConfig) -> Result<Self> {
        let store = AuthStore::open(data_dir)?;
        Ok(Self { store, config })
    }

    /// Resolve the API key for a provider:
    /// 1. environment variable,
    /// 2. `llm.providers.<id>.api_key` in config.yaml with `{env:VAR}`
    ///    substitution,
    /// 3. the credential store (API key, or OAuth access token).
    pub fn get_api_key(&self, id: ProviderId) -> Result<String> {
        if let Ok(key) = std::env::var(id.env_var()) {
            if !key.is_empty() {
                return Ok(key);
            }
        }

        if let Some(raw) = self.config.provider_api_key(id.as_str()) {
            let resolved = resolve_env_substitution(&raw);
            if !resolved.is_empty() {
                return Ok(resolved);
            }
        }

        match self.store.get(id) {
            Some(Credential::Api { key }) if !key.is_empty() => Ok(key),
            Some(Credential::Oauth { access_token, .. }) if !access_token.is_empty() => {
                Ok(access_token)
            }
            _ => Err(CredentialMissing(id).into()),
        }
    }

    /// Whether any source can produce a credential for this provider.
    pub fn has_credential(&self, id: ProviderId) -> bool {
        if std::env::var(id.env_var()).map(|v| !v.is_empty()).unwrap_or(false) {
            return true;
        }
        if let Some(raw) = self.config.provider_api_key(id.as_str()) {
            if !resolve_env_substitution(&raw).is_empty() {
                return true;
            }
        }
        self.store.get(id).is_some()
    }

    /// All providers with a resolvable credential, in priority order.
    pub fn list_connected(&self) -> Vec<ProviderId> {
        ProviderId::all()
            .into_iter()
            .filter(|id| self.has_credential(*id))
            .collect()
    }

    pub fn set_api_key(&self, id: ProviderId, key: String) -> Result<()> {
        self.store.set(id, Credential::Api { key })
    }

    pub fn oauth_credential(&self, id: ProviderId) -> Option<Credential> {
        match self.store.get(id) {
            Some(cred @ Credential::Oauth { .. }) => Some(cred),
            _ => None,
        }
    }

    pub fn remove_credential(&self, id: ProviderId) -> Result<()> {
        self.store.remove(id)
    }

    pub fn default_provider(&self) -> ProviderId {
        self.store.default_provider()
    }

    pub fn set_default_provider(&self, id: ProviderId) -> Result<()> {
        self.store.set_default_provider(id)
    }

    /// Run the OAuth authorization-code flow for a provider and persist the
    /// resulting tokens.
    pub async fn connect_with_oauth(&self, id: ProviderId) -> Result<()> {
        let config = providers::oauth_config(id)
            .with_context(|| format!("provider {id} does not support OAuth"))?;

        let result = oauth::start_oauth_flow(&config).await?;

        let expires_at = if result.expires_in > 0 {
            (Utc::now() + chrono::Duration::seconds(result.expires_in)).to_rfc3339()
        } else {
            String::new()
        };

        self.store.set(
            id,
            Credential::Oauth {
                access_token: result.access_token,
                refresh_token: result.refresh_token,
                expires_at,
            },
        )
    }
}

/// Replace `{env:VAR_NAME}` occurrences with the variable's value; a missing
/// variable substitutes the empty string.
pub fn resolve_env_substitution(value: &str) -> String {
    if !value.contains("{env:") {
        return value.to_string();
    }

    let re = Regex::new(r"\{env:([^}]+)\}").unwrap();
    re.replace_all(value, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_env_substitution() {
        std::env::set_var("CLIFI_TEST_SUB_VAR", "resolved");
        assert_eq!(
            resolve_env_substitution("{env:CLIFI_TEST_SUB_VAR}"),
            "resolved"
        );
        assert_eq!(
            resolve_env_substitution("pre-{env:CLIFI_TEST_SUB_VAR}-post"),
            "pre-resolved-post"
        );
        assert_eq!(resolve_env_substitution("{env:CLIFI_TEST_UNSET_VAR}"), "");
        assert_eq!(resolve_env_substitution("plain"), "plain");
        std::env::remove_var("CLIFI_TEST_SUB_VAR");
    }

    #[test]
    fn test_env_key_only_resolves() {
        let dir = tempdir().unwrap();
        let manager = Manager::with_config(dir.path(), UserConfig::default()).unwrap();

        // Venice is unused by the other tests, keeping the env var private
        // to this one.
        std::env::set_var("VENICE_API_KEY", "sk-venice-env");
        assert_eq!(
            manager.get_api_key(ProviderId::Venice).unwrap(),
            "sk-venice-env"
        );
        assert!(manager.has_credential(ProviderId::Venice));
        std::env::remove_var("VENICE_API_KEY");
    }

    #[test]
    fn test_env_overrides_store_and_unset_restores() {
        let dir = tempdir().unwrap();
        let manager = Manager::with_config(dir.path(), UserConfig::default()).unwrap();
        manager
            .set_api_key(ProviderId::Gemini, "stored-k".into())
            .unwrap();

        std::env::set_var("GOOGLE_API_KEY", "env-k");
        assert_eq!(manager.get_api_key(ProviderId::Gemini).unwrap(), "env-k");

        std::env::remove_var("GOOGLE_API_KEY");
        assert_eq!(manager.get_api_key(ProviderId::Gemini).unwrap(), "stored-k");
    }

    #[test]
    fn test_config_key_beats_store() {
        let dir = tempdir().unwrap();
        let config = UserConfig::from_yaml(
            "llm:\n  providers:\n    openrouter:\n      api_key: cfg-key\n",
        )
        .unwrap();
        let manager = Manager::with_config(dir.path(), config).unwrap();
        manager
            .set_api_key(ProviderId::Openrouter, "stored-key".into())
            .unwrap();

        assert_eq!(
            manager.get_api_key(ProviderId::Openrouter).unwrap(),
            "cfg-key"
        );
    }

    #[test]
    fn test_oauth_access_token_is_usable_as_key() {
        let dir = tempdir().unwrap();
        let manager = Manager::with_config(dir.path(), UserConfig::default()).unwrap();
        manager
            .store
            .set(
                ProviderId::Copilot,
                Credential::Oauth {
                    access_token: "gho_token".into(),
                    refresh_token: String::new(),
                    expires_at: String::new(),
                },
            )
            .unwrap();

        assert_eq!(manager.get_api_key(ProviderId::Copilot).unwrap(), "gho_token");
    }

    #[test]
    fn test_missing_credential_error() {
        let dir = tempdir().unwrap();
        let manager = Manager::with_config(dir.path(), UserConfig::default()).unwrap();
        let err = manager.get_api_key(ProviderId::Anthropic).unwrap_err();
        assert!(err.downcast_ref::<CredentialMissing>().is_some());
        assert!(!manager.has_credential(ProviderId::Anthropic));
    }
}
