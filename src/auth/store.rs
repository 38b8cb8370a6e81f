//! Credential store
//!
//! Single-file JSON store at `<data_dir>/auth.json` holding per-provider
//! credentials and the default-provider selection. Writes go through a
//! temp-file + rename so an interrupted save never corrupts the canonical
//! file, and the file always carries mode 0600.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::ProviderId;

const AUTH_FILENAME: &str = "auth.json";
const FILE_MODE: u32 = 0o600;

/// A stored credential: either a bare API key or an OAuth token triple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credential {
    Api {
        key: String,
    },
    Oauth {
        access_token: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        refresh_token: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        expires_at: String,
    },
}

/// On-disk shape of `auth.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthData {
    pub version: u32,
    #[serde(default)]
    pub providers: HashMap<ProviderId, Credential>,
    pub default_provider: ProviderId,
}

impl Default for AuthData {
    fn default() -> Self {
        Self {
            version: 1,
            providers: HashMap::new(),
            default_provider: ProviderId::Anthropic,
        }
    }
}

/// Owns `auth.json` and its in-memory copy.
pub struct AuthStore {
    file_path: PathBuf,
    data: RwLock<AuthData>,
}

impl AuthStore {
    /// Open the store under `data_dir`, creating the directory (0700) if
    /// needed. A missing auth file is an empty store; an unparseable one is
    /// fatal so we never clobber a file we cannot read.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
        fs::set_permissions(data_dir, fs::Permissions::from_mode(0o700))
            .context("failed to set data directory permissions")?;

        let file_path = data_dir.join(AUTH_FILENAME);
        let data = if file_path.exists() {
            let contents = fs::read_to_string(&file_path)
                .with_context(|| format!("failed to read {}", file_path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", file_path.display()))?
        } else {
            AuthData::default()
        };

        Ok(Self {
            file_path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self, id: ProviderId) -> Option<Credential> {
        self.data.read().unwrap().providers.get(&id).cloned()
    }

    pub fn set(&self, id: ProviderId, cred: Credential) -> Result<()> {
        let mut data = self.data.write().unwrap();
        data.providers.insert(id, cred);
        self.save(&data)
    }

    pub fn remove(&self, id: ProviderId) -> Result<()> {
        let mut data = self.data.write().unwrap();
        data.providers.remove(&id);
        self.save(&data)
    }

    /// All providers with a stored credential.
    pub fn list(&self) -> Vec<ProviderId> {
        self.data.read().unwrap().providers.keys().copied().collect()
    }

    pub fn default_provider(&self) -> ProviderId {
        self.data.read().unwrap().default_provider
    }

    pub fn set_default_provider(&self, id: ProviderId) -> Result<()> {
        let mut data = self.data.write().unwrap();
        data.default_provider = id;
        self.save(&data)
    }

    /// Atomic write: serialize, write to `auth.json.tmp`, rename over the
    /// canonical path, then fix the mode. On rename failure the temp file
    /// is unlinked best-effort and the previous file stays intact.
    fn save(&self, data: &AuthData) -> Result<()> {
        let json = serde_json::to_string_pretty(data).context("failed to serialize auth data")?;

        let tmp_path = self.file_path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(FILE_MODE))
            .context("failed to set auth file permissions")?;

        if let Err(err) = fs::rename(&tmp_path, &self.file_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err)
                .with_context(|| format!("failed to save {}", self.file_path.display()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn api(key: &str) -> Credential {
        Credential::Api { key: key.into() }
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = AuthStore::open(dir.path()).unwrap();

        let cred = Credential::Oauth {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            expires_at: "2026-01-01T00:00:00Z".into(),
        };
        store.set(ProviderId::Copilot, cred.clone()).unwrap();
        assert_eq!(store.get(ProviderId::Copilot), Some(cred));
    }

    #[test]
    fn test_save_then_reload_yields_same_data() {
        let dir = tempdir().unwrap();
        {
            let store = AuthStore::open(dir.path()).unwrap();
            store.set(ProviderId::Openai, api("sk-stored")).unwrap();
            store.set_default_provider(ProviderId::Openai).unwrap();
        }

        let reloaded = AuthStore::open(dir.path()).unwrap();
        assert_eq!(reloaded.get(ProviderId::Openai), Some(api("sk-stored")));
        assert_eq!(reloaded.default_provider(), ProviderId::Openai);
    }

    #[test]
    fn test_auth_file_mode_is_0600() {
        let dir = tempdir().unwrap();
        let store = AuthStore::open(dir.path()).unwrap();
        store.set(ProviderId::Anthropic, api("sk-ant")).unwrap();

        let mode = fs::metadata(dir.path().join(AUTH_FILENAME))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = AuthStore::open(dir.path()).unwrap();
        assert!(store.get(ProviderId::Anthropic).is_none());
        assert!(store.list().is_empty());
        assert_eq!(store.default_provider(), ProviderId::Anthropic);
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(AUTH_FILENAME), "{not json").unwrap();
        assert!(AuthStore::open(dir.path()).is_err());
    }

    #[test]
    fn test_missing_providers_key_becomes_empty_map() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(AUTH_FILENAME),
            r#"{"version": 1, "default_provider": "anthropic"}"#,
        )
        .unwrap();

        let store = AuthStore::open(dir.path()).unwrap();
        assert!(store.list().is_empty());
        // A set after loading the sparse file must not panic.
        store.set(ProviderId::Venice, api("vk")).unwrap();
        assert_eq!(store.get(ProviderId::Venice), Some(api("vk")));
    }

    #[test]
    fn test_remove_deletes_credential() {
        let dir = tempdir().unwrap();
        let store = AuthStore::open(dir.path()).unwrap();
        store.set(ProviderId::Gemini, api("gk")).unwrap();
        store.remove(ProviderId::Gemini).unwrap();
        assert!(store.get(ProviderId::Gemini).is_none());
    }
}
