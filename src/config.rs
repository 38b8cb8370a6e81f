//! User configuration
//!
//! Resolves the `~/.clifi` data directory and reads the optional
//! `config.yaml` inside it. Recognized keys: `chain` (default chain name)
//! and `llm.providers.<id>.api_key`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use yaml_rust2::{Yaml, YamlLoader};

/// Directory name under the user's home for all clifi data.
const DATA_DIR_NAME: &str = ".clifi";

/// Config file name within the data directory.
const CONFIG_FILENAME: &str = "config.yaml";

/// Returns the clifi data directory: `~/.clifi`.
///
/// Falls back to `USERPROFILE` when `HOME` is not resolvable.
pub fn data_dir() -> PathBuf {
    let home = dirs::home_dir()
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(DATA_DIR_NAME)
}

/// Returns the full path to the user config file: `~/.clifi/config.yaml`.
pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILENAME)
}

/// Parsed user configuration. A missing config file yields an empty config.
#[derive(Debug, Clone, Default)]
pub struct UserConfig {
    doc: Option<Yaml>,
}

impl UserConfig {
    /// Load the config from the default location. Missing file is not an
    /// error; an unreadable or malformed file is.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load the config from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Build a config directly from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut docs = YamlLoader::load_from_str(contents).context("invalid YAML")?;
        Ok(Self {
            doc: if docs.is_empty() {
                None
            } else {
                Some(docs.remove(0))
            },
        })
    }

    /// Look up a string value by dotted key path, e.g.
    /// `llm.providers.anthropic.api_key`.
    pub fn get_str(&self, dotted_key: &str) -> Option<String> {
        let mut node = self.doc.as_ref()?;
        for segment in dotted_key.split('.') {
            node = &node[segment];
        }
        node.as_str().map(|s| s.to_string())
    }

    /// The user's default chain name, if configured.
    pub fn default_chain(&self) -> Option<String> {
        self.get_str("chain")
    }

    /// The configured API key for a provider, if any. `{env:VAR}`
    /// substitution is applied by the credential resolver, not here.
    pub fn provider_api_key(&self, provider_id: &str) -> Option<String> {
        self.get_str(&format!("llm.providers.{provider_id}.api_key"))
    }
}
