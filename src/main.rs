//! atlasctl - command-line client for the Atlas control plane.
//!
//! `atlasctl login` authenticates against the identity service of the
//! environment currently selected in the layered configuration and caches
//! the granted token for later calls.

mod api;
mod auth;
mod config;
mod ui;
mod vault;

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use api::IdentityClient;
use auth::{LoginFlow, LoginOutcome, LoginTarget};
use config::ConfigStore;
use ui::TerminalPrompts;
use vault::Vault;

#[derive(Parser)]
#[command(name = "atlasctl", version, about = "Command-line client for the Atlas control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate against the current environment
    Login {
        /// Identity endpoint override, bypassing the configured one
        #[arg(short = 'u', long)]
        url: Option<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

async fn login(url: Option<String>) -> anyhow::Result<()> {
    let store = ConfigStore::new()?;
    let vault = Vault::new(&store);
    let mut prompts = TerminalPrompts;
    let mut flow = LoginFlow::new(&store, &vault, &mut prompts, url);

    let outcome = match flow.target()? {
        LoginTarget::App { environment } => flow.app_login(&environment)?,
        LoginTarget::User {
            environment,
            endpoint,
        } => {
            let gateway = IdentityClient::new(&endpoint)?;
            flow.user_login(&environment, &gateway).await?
        }
    };

    match outcome {
        LoginOutcome::AppTokenSaved { added: true } => println!("App token saved."),
        LoginOutcome::AppTokenSaved { added: false } => {
            println!("App token already present, nothing to do.")
        }
        LoginOutcome::LoggedIn {
            user_id,
            workspace_id: Some(workspace_id),
            ..
        } => println!("Logged in as {} (workspace {}).", user_id, workspace_id),
        LoginOutcome::LoggedIn { user_id, .. } => {
            println!("Logged in as {} with domain scope.", user_id)
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Login { url } => {
            info!("starting login");
            login(url).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
