//! Terminal interface
//!
//! The REPL and the auth/wallet command implementations. Everything here is
//! a thin layer over `agent`, `auth`, and `wallet`.

pub mod repl;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use dialoguer::Password;

use crate::auth::providers::{auth_methods, AuthMethodKind};
use crate::auth::Manager;
use crate::config;
use crate::llm::ProviderId;
use crate::wallet::KeystoreManager;

/// `clifi auth connect <provider>`: store an API key or run OAuth.
pub async fn auth_connect(provider: &str, oauth: bool) -> Result<()> {
    let id: ProviderId = provider.parse()?;
    let manager = Manager::new(&config::data_dir())?;

    if oauth {
        let supports_oauth = auth_methods(id)
            .iter()
            .any(|m| m.kind == AuthMethodKind::Oauth);
        if !supports_oauth {
            bail!("provider {id} does not support OAuth; use an API key");
        }
        manager.connect_with_oauth(id).await?;
        println!("{} Connected {id} via OAuth.", "ok:".green());
        return Ok(());
    }

    let key: String = Password::new()
        .with_prompt(format!("API key for {id}"))
        .interact()
        .context("failed to read API key")?;
    if key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    manager.set_api_key(id, key.trim().to_string())?;
    println!("{} Stored API key for {id}.", "ok:".green());
    Ok(())
}

/// `clifi auth status`: list providers and their credential sources.
pub fn auth_status() -> Result<()> {
    let manager = Manager::new(&config::data_dir())?;
    let default = manager.default_provider();

    println!("{}", "Providers:".bold());
    for id in ProviderId::all() {
        let connected = manager.has_credential(id);
        let marker = if connected { "connected".green() } else { "-".dimmed() };
        let default_marker = if id == default { " (default)" } else { "" };
        println!("  {id:<12} {marker}{default_marker}");
    }
    Ok(())
}

/// `clifi auth disconnect <provider>`: drop stored credentials.
pub fn auth_disconnect(provider: &str) -> Result<()> {
    let id: ProviderId = provider.parse()?;
    let manager = Manager::new(&config::data_dir())?;
    manager.remove_credential(id)?;
    println!("{} Removed stored credentials for {id}.", "ok:".green());
    Ok(())
}

/// `clifi wallet create`: generate a new keystore account.
pub fn wallet_create() -> Result<()> {
    let km = KeystoreManager::new(&config::data_dir())?;
    let password = Password::new()
        .with_prompt("New wallet password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("failed to read password")?;

    let account = km.create_account(&password)?;
    println!("{} Created wallet {}", "ok:".green(), account.address);
    Ok(())
}

/// `clifi wallet import`: import a raw private key.
pub fn wallet_import() -> Result<()> {
    let km = KeystoreManager::new(&config::data_dir())?;
    let key: String = Password::new()
        .with_prompt("Private key (hex)")
        .interact()
        .context("failed to read private key")?;
    let password = Password::new()
        .with_prompt("New wallet password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("failed to read password")?;

    let account = km.import_key(key.trim(), &password)?;
    println!("{} Imported wallet {}", "ok:".green(), account.address);
    Ok(())
}

/// `clifi wallet list`: print keystore accounts in default order.
pub fn wallet_list() -> Result<()> {
    let km = KeystoreManager::new(&config::data_dir())?;
    let accounts = km.list_accounts();
    if accounts.is_empty() {
        println!("No wallets found. Use 'clifi wallet create' to create one.");
        return Ok(());
    }

    println!("{}", "Wallets:".bold());
    for (i, account) in accounts.iter().enumerate() {
        let default_marker = if i == 0 { " (default)" } else { "" };
        println!("  {}. {}{default_marker}", i + 1, account.address);
    }
    Ok(())
}

/// `clifi auth default <provider>`: select the default provider.
pub fn auth_set_default(provider: &str) -> Result<()> {
    let id: ProviderId = provider.parse()?;
    let manager = Manager::new(&config::data_dir())?;
    manager.set_default_provider(id)?;
    println!("{} Default provider set to {id}.", "ok:".green());
    Ok(())
}
