//! `cybertrain` command-line client.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cybertrain_auth::Role;
use cybertrain_observability::LogFormat;
use cybertrain_session::{
    AuthContext, FileSlot, GuardDecision, LoginMethod, QueuedNavigator, SessionConfig, SystemClock,
};

#[derive(Debug, Parser)]
#[command(name = "cybertrain", about = "Session client for the cybersecurity training platform")]
struct Cli {
    /// Backend base URL (overrides CYBERTRAIN_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and persist the issued credential.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "email")]
        method: LoginMethod,
    },
    /// Forget the persisted credential.
    Logout,
    /// Show the current session.
    Status,
    /// Authorized GET against a backend path.
    Get { path: String },
    /// Evaluate the route guard for a view.
    Guard {
        path: String,
        #[arg(long)]
        role: Option<Role>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    cybertrain_observability::tracing::init(LogFormat::Pretty);

    let cli = Cli::parse();

    let mut config = SessionConfig::from_env();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    let slot = FileSlot::in_data_dir(&config.storage_key)
        .context("failed to locate credential storage")?;
    tracing::debug!(path = ?slot.path(), "using credential slot");

    let navigator = Arc::new(QueuedNavigator::new());
    let ctx = AuthContext::start(
        config,
        Arc::new(slot),
        Arc::new(SystemClock),
        navigator.clone(),
    );

    let outcome = run(&ctx, cli.command).await;

    for redirect in navigator.drain() {
        println!("redirect -> {}", redirect.to);
    }
    ctx.shutdown();

    outcome
}

async fn run(ctx: &AuthContext, command: Command) -> Result<()> {
    match command {
        Command::Login {
            email,
            password,
            method,
        } => {
            let view = ctx
                .login(email, password, method)
                .await
                .context("login failed")?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            if let Some(dashboard) = ctx.landing_view() {
                println!("landing: {dashboard:?}");
            }
        }
        Command::Logout => {
            ctx.logout();
            println!("logged out");
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&ctx.current_session())?);
        }
        Command::Get { path } => {
            let client = ctx.http();
            let response = client
                .send(client.get(&path))
                .await
                .with_context(|| format!("GET {path} failed"))?;
            let status = response.status();
            let body = response.text().await.context("failed to read body")?;
            println!("{status}");
            println!("{body}");
        }
        Command::Guard { path, role } => match ctx.evaluate(&path, role) {
            GuardDecision::Render => println!("render {path}"),
            GuardDecision::Redirect { redirect, reason } => {
                println!("{reason:?}: redirect -> {}", redirect.to);
                if let Some(return_to) = redirect.return_to {
                    println!("return to {return_to} after login");
                }
            }
        },
    }

    Ok(())
}
