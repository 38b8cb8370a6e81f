//! OAuth authorization-code flow
//!
//! Runs the browser dance: generate a CSRF state token, bind a loopback
//! callback server, open the authorization URL, wait for exactly one
//! callback, then exchange the code at the token endpoint. The whole flow is
//! bounded by a five-minute timeout; timing out or failing shuts the server
//! down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use rand::RngCore;
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

/// Port for the local OAuth callback server. Matches the port other
/// terminal agents register with OAuth apps, so shared client ids work.
pub const OAUTH_CALLBACK_PORT: u16 = 19876;

/// Maximum time to wait for the browser callback.
pub const OAUTH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Configuration for one provider's OAuth app.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub provider_name: String,
    pub auth_url: String,
    pub token_url: String,
    pub client_id: String,
    /// Optional; public clients leave it empty.
    pub client_secret: String,
    pub scopes: Vec<String>,
    /// Defaults to the loopback callback when empty.
    pub redirect_uri: String,
}

impl OAuthConfig {
    fn effective_redirect_uri(&self) -> String {
        if self.redirect_uri.is_empty() {
            format!("http://127.0.0.1:{OAUTH_CALLBACK_PORT}/callback")
        } else {
            self.redirect_uri.clone()
        }
    }
}

/// Tokens obtained from a successful flow.
#[derive(Clone, Debug)]
pub struct OAuthResult {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until expiry; zero when the endpoint did not say.
    pub expires_in: i64,
    pub token_type: String,
}

struct CallbackState {
    expected_state: String,
    code_tx: Mutex<Option<oneshot::Sender<Result<String>>>>,
}

/// Run the authorization-code flow end to end and return the tokens.
pub async fn start_oauth_flow(config: &OAuthConfig) -> Result<OAuthResult> {
    let state = generate_state();
    let redirect_uri = config.effective_redirect_uri();
    let auth_url = build_auth_url(config, &state, &redirect_uri)?;

    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let callback_state = Arc::new(CallbackState {
        expected_state: state,
        code_tx: Mutex::new(Some(code_tx)),
    });

    let app = Router::new()
        .route("/callback", get(callback_handler))
        .with_state(callback_state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", OAUTH_CALLBACK_PORT))
        .await
        .with_context(|| format!("failed to listen on port {OAUTH_CALLBACK_PORT}"))?;

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    info!("opening browser for {} authentication", config.provider_name);
    println!("Opening browser for {} authentication...", config.provider_name);
    println!("If the browser doesn't open, visit: {auth_url}\n");
    if webbrowser::open(&auth_url).is_err() {
        println!("Could not open browser automatically. Please visit the URL above.");
    }

    let outcome = tokio::time::timeout(OAUTH_TIMEOUT, code_rx).await;

    // Stop accepting connections regardless of how we got here.
    let _ = shutdown_tx.send(());
    let _ = server.await;

    let code = match outcome {
        Ok(Ok(result)) => result?,
        Ok(Err(_)) => bail!("OAuth callback channel closed unexpectedly"),
        Err(_) => bail!("OAuth flow timed out after {} seconds", OAUTH_TIMEOUT.as_secs()),
    };

    exchange_code_for_tokens(config, &code, &redirect_uri).await
}

async fn callback_handler(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let Some(tx) = state.code_tx.lock().await.take() else {
        // A second request after the flow completed.
        return Html(html_error("Authentication already completed"));
    };

    let got_state = params.get("state").map(String::as_str).unwrap_or_default();
    if got_state != state.expected_state {
        let _ = tx.send(Err(anyhow::anyhow!(
            "invalid state parameter - potential CSRF attack"
        )));
        return Html(html_error("Authentication failed: invalid state parameter"));
    }

    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(String::as_str)
            .unwrap_or("");
        let _ = tx.send(Err(anyhow::anyhow!("OAuth error: {error} - {description}")));
        return Html(html_error(&format!("Authentication failed: {error}")));
    }

    match params.get("code") {
        Some(code) if !code.is_empty() => {
            let _ = tx.send(Ok(code.clone()));
            Html(html_success())
        }
        _ => {
            let _ = tx.send(Err(anyhow::anyhow!("no authorization code in callback")));
            Html(html_error("Authentication failed: no authorization code"))
        }
    }
}

/// Exchange an authorization code for tokens.
async fn exchange_code_for_tokens(
    config: &OAuthConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<OAuthResult> {
    let mut form = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", redirect_uri.to_string()),
        ("client_id", config.client_id.clone()),
    ];
    if !config.client_secret.is_empty() {
        form.push(("client_secret", config.client_secret.clone()));
    }

    post_token_request(&config.token_url, &form).await
}

/// Use a refresh token to obtain a fresh access token.
pub async fn refresh_access_token(config: &OAuthConfig, refresh_token: &str) -> Result<OAuthResult> {
    let mut form = vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.to_string()),
        ("client_id", config.client_id.clone()),
    ];
    if !config.client_secret.is_empty() {
        form.push(("client_secret", config.client_secret.clone()));
    }

    post_token_request(&config.token_url, &form).await
}

async fn post_token_request(token_url: &str, form: &[(&str, String)]) -> Result<OAuthResult> {
    #[derive(Deserialize)]
    struct TokenResponse {
        #[serde(default)]
        access_token: String,
        #[serde(default)]
        refresh_token: String,
        #[serde(default)]
        expires_in: i64,
        #[serde(default)]
        token_type: String,
        #[serde(default)]
        error: String,
        #[serde(default)]
        error_description: String,
    }

    let resp = reqwest::Client::new()
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .context("token request failed")?;

    let status = resp.status();
    if !status.is_success() {
        bail!("token endpoint returned status {}", status.as_u16());
    }

    let body: TokenResponse = resp.json().await.context("failed to parse token response")?;

    if !body.error.is_empty() {
        bail!("token error: {} - {}", body.error, body.error_description);
    }
    if body.access_token.is_empty() {
        bail!("no access token in response");
    }

    Ok(OAuthResult {
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        expires_in: body.expires_in,
        token_type: body.token_type,
    })
}

/// 32 random bytes, hex-encoded, as the CSRF state token.
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Construct the authorization URL with the standard query parameters.
fn build_auth_url(config: &OAuthConfig, state: &str, redirect_uri: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(&config.auth_url)
        .with_context(|| format!("invalid auth URL: {}", config.auth_url))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("response_type", "code");
        query.append_pair("state", state);
        if !config.scopes.is_empty() {
            query.append_pair("scope", &config.scopes.join(" "));
        }
    }
    Ok(url.to_string())
}

fn html_success() -> String {
    "<!DOCTYPE html>\n<html><head><title>Authentication Successful</title></head>\
     <body style=\"font-family: sans-serif; text-align: center; padding-top: 20vh;\">\
     <h1>&#10003; Authentication Successful</h1>\
     <p>You can close this window and return to the terminal.</p>\
     </body></html>"
        .to_string()
}

fn html_error(message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>Authentication Failed</title></head>\
         <body style=\"font-family: sans-serif; text-align: center; padding-top: 20vh;\">\
         <h1>&#10007; Authentication Failed</h1><p>{message}</p>\
         </body></html>"
    )
}
