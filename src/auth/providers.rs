//! Provider authentication metadata
//!
//! Which auth methods each provider offers, and the OAuth app configuration
//! for those that support browser sign-in.

use crate::llm::ProviderId;

use super::oauth::OAuthConfig;

/// A way to authenticate against a provider.
#[derive(Clone, Debug)]
pub struct AuthMethod {
    pub kind: AuthMethodKind,
    pub label: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethodKind {
    ApiKey,
    Oauth,
}

/// Auth methods available for a provider, most preferred first.
pub fn auth_methods(id: ProviderId) -> Vec<AuthMethod> {
    let api = |description| AuthMethod {
        kind: AuthMethodKind::ApiKey,
        label: "API Key",
        description,
    };

    match id {
        ProviderId::Anthropic => vec![api("Get your API key from console.anthropic.com")],
        ProviderId::Openai => vec![api("Get your API key from platform.openai.com/api-keys")],
        ProviderId::Gemini => vec![api("Get your API key from aistudio.google.com/apikey")],
        ProviderId::Venice => vec![api("Get your API key from venice.ai")],
        ProviderId::Openrouter => vec![api("Get your API key from openrouter.ai/settings/keys")],
        ProviderId::Copilot => vec![
            AuthMethod {
                kind: AuthMethodKind::ApiKey,
                label: "GitHub Token",
                description: "Use GITHUB_TOKEN from your environment",
            },
            AuthMethod {
                kind: AuthMethodKind::Oauth,
                label: "GitHub Login",
                description: "Sign in with GitHub (opens browser)",
            },
        ],
    }
}

/// OAuth app configuration, when the provider supports browser sign-in.
pub fn oauth_config(id: ProviderId) -> Option<OAuthConfig> {
    match id {
        ProviderId::Copilot => Some(OAuthConfig {
            provider_name: "GitHub Copilot".into(),
            auth_url: "https://github.com/login/oauth/authorize".into(),
            token_url: "https://github.com/login/oauth/access_token".into(),
            // GitHub's public OAuth app for Copilot CLI.
            client_id: "Iv1.b507a08c87ecfe98".into(),
            client_secret: String::new(),
            scopes: vec!["read:user".into()],
            redirect_uri: String::new(),
        }),
        _ => None,
    }
}

pub fn supports_oauth(id: ProviderId) -> bool {
    oauth_config(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_copilot_supports_oauth() {
        for id in ProviderId::all() {
            assert_eq!(supports_oauth(id), id == ProviderId::Copilot);
        }
    }

    #[test]
    fn test_every_provider_offers_an_api_method() {
        for id in ProviderId::all() {
            let methods = auth_methods(id);
            assert!(methods.iter().any(|m| m.kind == AuthMethodKind::ApiKey));
        }
    }
}
