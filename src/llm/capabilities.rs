//! Tool-capability cache
//!
//! Answers "does this (provider, model) support tool calling?". The static
//! model catalog is authoritative when it lists the model; for aggregators
//! (OpenRouter) the live models endpoint is consulted and the whole answer
//! map cached for six hours. Unknown models default to optimistic.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use super::{Provider, ProviderId};

const CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const OPENROUTER_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";

/// Process-global capability cache.
static CAPABILITY_CACHE: LazyLock<CapabilityCache> = LazyLock::new(CapabilityCache::new);

struct CacheEntry {
    expires_at: Instant,
    support: HashMap<String, bool>,
}

pub struct CapabilityCache {
    entries: Mutex<HashMap<ProviderId, CacheEntry>>,
}

impl CapabilityCache {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// TTL-checked cache lookup. `None` means no fresh entry or no answer
    /// for this model in the cached map.
    fn lookup(&self, provider: ProviderId, model_id: &str) -> Option<bool> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&provider)?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        entry.support.get(model_id).copied()
    }

    fn install(&self, provider: ProviderId, support: HashMap<String, bool>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            provider,
            CacheEntry {
                expires_at: Instant::now() + CACHE_TTL,
                support,
            },
        );
    }
}

/// Returns `(supports, known)` for a provider/model pair. `known == false`
/// means the answer is a default and callers may choose to degrade.
pub async fn supports_tools_for(
    provider: &dyn Provider,
    model_id: &str,
    openrouter_api_key: Option<&str>,
) -> (bool, bool) {
    // The static catalog wins when it knows the model.
    for m in provider.models() {
        if m.id == model_id {
            return (m.supports_tools, true);
        }
    }

    if provider.id() == ProviderId::Openrouter {
        if let Some(key) = openrouter_api_key {
            if let Some(answer) = openrouter_lookup(key, model_id).await {
                return (answer, true);
            }
        }
    }

    (true, false)
}

/// Cached OpenRouter lookup. The HTTP fetch happens outside the cache lock.
async fn openrouter_lookup(api_key: &str, model_id: &str) -> Option<bool> {
    if api_key.is_empty() {
        return None;
    }

    if let Some(answer) = CAPABILITY_CACHE.lookup(ProviderId::Openrouter, model_id) {
        return Some(answer);
    }

    match fetch_openrouter_models(api_key).await {
        Ok(support) => {
            let answer = support.get(model_id).copied();
            CAPABILITY_CACHE.install(ProviderId::Openrouter, support);
            answer
        }
        Err(err) => {
            debug!("capability fetch failed: {err:#}");
            None
        }
    }
}

async fn fetch_openrouter_models(api_key: &str) -> Result<HashMap<String, bool>> {
    let resp = reqwest::Client::new()
        .get(OPENROUTER_MODELS_URL)
        .bearer_auth(api_key)
        .send()
        .await
        .context("models request failed")?;
    let body: Value = resp.json().await.context("failed to parse models response")?;

    let mut support = HashMap::new();
    if let Some(entries) = body["data"].as_array() {
        for entry in entries {
            let Some(id) = entry["id"].as_str() else {
                continue;
            };
            support.insert(id.to_string(), entry_supports_tools(entry));
        }
    }
    Ok(support)
}

/// Decide tool support from an OpenRouter model entry. Checks
/// `supported_parameters`, `top_provider.supported_parameters`, and the
/// boolean `capabilities.{tools,function_calling,functions}` flags.
fn entry_supports_tools(entry: &Value) -> bool {
    if has_toolish(&entry["supported_parameters"]) {
        return true;
    }
    if has_toolish(&entry["top_provider"]["supported_parameters"]) {
        return true;
    }
    if let Some(caps) = entry["capabilities"].as_object() {
        for key in ["tools", "function_calling", "functions"] {
            if caps.get(key).and_then(Value::as_bool) == Some(true) {
                return true;
            }
        }
    }
    false
}

fn has_toolish(value: &Value) -> bool {
    let Some(items) = value.as_array() else {
        return false;
    };
    items.iter().any(|item| {
        item.as_str()
            .map(|s| {
                let s = s.to_lowercase();
                s.contains("tool") || s.contains("function")
            })
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_supported_parameters_detection() {
        let entry = json!({"id": "a/b", "supported_parameters": ["temperature", "tools"]});
        assert!(entry_supports_tools(&entry));

        let entry = json!({"id": "a/b", "supported_parameters": ["temperature"]});
        assert!(!entry_supports_tools(&entry));
    }

    #[test]
    fn test_top_provider_and_capabilities_fallbacks() {
        let entry = json!({
            "id": "a/b",
            "top_provider": {"supported_parameters": ["function_calling"]}
        });
        assert!(entry_supports_tools(&entry));

        let entry = json!({"id": "a/b", "capabilities": {"tools": true}});
        assert!(entry_supports_tools(&entry));

        let entry = json!({"id": "a/b", "capabilities": {"tools": false}});
        assert!(!entry_supports_tools(&entry));
    }

    #[test]
    fn test_cache_install_and_ttl_lookup() {
        let cache = CapabilityCache::new();
        assert_eq!(cache.lookup(ProviderId::Openrouter, "a/b"), None);

        let mut support = HashMap::new();
        support.insert("a/b".to_string(), true);
        support.insert("c/d".to_string(), false);
        cache.install(ProviderId::Openrouter, support);

        assert_eq!(cache.lookup(ProviderId::Openrouter, "a/b"), Some(true));
        assert_eq!(cache.lookup(ProviderId::Openrouter, "c/d"), Some(false));
        assert_eq!(cache.lookup(ProviderId::Openrouter, "e/f"), None);
    }
}
