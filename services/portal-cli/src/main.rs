//! Portal command-line client
//!
//! Thin driver over `portal-session`:
//! 1. Loads config and restores the stored session
//! 2. Runs one command (login, whoami, authenticated request, ...)
//! 3. Prints results as JSON on stdout; logs go to stderr

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use portal_auth::CredentialStore;
use portal_session::SessionContext;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::HttpTransport;

use crate::cli::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs to stderr with LOG_LEVEL / RUST_LOG support; stdout is for results
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    info!(path = %cli.config.display(), "loading configuration");
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let ctx = build_context(&config).await?;
    ctx.restore().await;

    run(&ctx, &config, cli.command).await
}

async fn build_context(config: &Config) -> Result<SessionContext> {
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = Arc::new(HttpTransport::new(
        client,
        config.api.base_url.clone(),
        config.timeout(),
    ));
    let store = Arc::new(CredentialStore::open(config.session.state_file.clone()).await);
    Ok(SessionContext::new(store, transport, config.session_config()))
}

async fn run(ctx: &SessionContext, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Login => {
            let email = config
                .account
                .email
                .as_deref()
                .context("account.email is not configured")?;
            let password = config
                .account
                .password
                .as_ref()
                .context("no password: set PORTAL_PASSWORD or account.password_file")?;
            let session = ctx.login(email, password.as_str()).await?;
            print_json(&session)
        }
        Command::Logout => {
            ctx.logout().await;
            Ok(())
        }
        Command::Whoami => {
            if !ctx.session().current().is_authenticated() {
                bail!("not logged in");
            }
            // Renew now so the printed session reflects current claims
            if let Err(e) = ctx.ensure_fresh().await {
                warn!(error = %e, "session could not be renewed");
                bail!("session expired, please log in again");
            }
            print_json(&ctx.session().current())
        }
        Command::SelectTenant { tenant_id } => {
            let tenant = ctx
                .select_tenant(&tenant_id)
                .await
                .with_context(|| format!("tenant {tenant_id} is not available to this account"))?;
            print_json(&tenant)
        }
        Command::Get { url } => {
            let value: serde_json::Value = ctx.gateway().get(&url).await?;
            print_json(&value)
        }
        Command::Delete { url } => {
            let value: serde_json::Value = ctx.gateway().delete(&url).await?;
            print_json(&value)
        }
        Command::Post { url, body } => {
            let value: serde_json::Value = ctx.gateway().post(&url, &body).await?;
            print_json(&value)
        }
        Command::Put { url, body } => {
            let value: serde_json::Value = ctx.gateway().put(&url, &body).await?;
            print_json(&value)
        }
        Command::ChangePassword { new_password } => {
            let current = config
                .account
                .password
                .as_ref()
                .context("no current password: set PORTAL_PASSWORD or account.password_file")?;
            ctx.gateway()
                .change_password(current.as_str(), &new_password)
                .await?;
            info!("password changed");
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
