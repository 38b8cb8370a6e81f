//! clifi entry point
//!
//! Parses the command line and hands off: the bare command starts the REPL,
//! `auth` and `wallet` manage credentials and keys.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clifi::agent::Agent;
use clifi::cli;
use clifi::llm::ProviderId;

/// clifi - terminal-first crypto operator agent
#[derive(Parser, Debug)]
#[command(name = "clifi", version, about = "Terminal-first crypto operator agent")]
struct Cli {
    /// LLM provider to use for this session (defaults to the stored
    /// default)
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage LLM provider credentials
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Manage keystore wallets
    Wallet {
        #[command(subcommand)]
        command: WalletCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Connect a provider (API key prompt, or --oauth where supported)
    Connect {
        provider: String,
        #[arg(long)]
        oauth: bool,
    },
    /// Show connected providers
    Status,
    /// Remove stored credentials for a provider
    Disconnect { provider: String },
    /// Set the default provider
    Default { provider: String },
}

#[derive(Subcommand, Debug)]
enum WalletCommand {
    /// Create a new wallet
    Create,
    /// Import a private key
    Import,
    /// List wallets
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    match args.command {
        Some(Command::Auth { command }) => match command {
            AuthCommand::Connect { provider, oauth } => cli::auth_connect(&provider, oauth).await,
            AuthCommand::Status => cli::auth_status(),
            AuthCommand::Disconnect { provider } => cli::auth_disconnect(&provider),
            AuthCommand::Default { provider } => cli::auth_set_default(&provider),
        },
        Some(Command::Wallet { command }) => match command {
            WalletCommand::Create => cli::wallet_create(),
            WalletCommand::Import => cli::wallet_import(),
            WalletCommand::List => cli::wallet_list(),
        },
        None => {
            let provider_id = match args.provider.as_deref() {
                Some(raw) => Some(raw.parse::<ProviderId>()?),
                None => None,
            };
            let agent = Agent::new(provider_id)?;
            cli::repl::run(agent).await
        }
    }
}
