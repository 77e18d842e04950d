// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use serde_json::Value;
use tracing::{error, info};

use reauth::config::{Cli, Command};
use reauth::{ApiRequest, LoginRequest, ReauthCoordinator};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli);
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdout carries only response bodies.
    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let coordinator = ReauthCoordinator::new(&cli.session)?;
    coordinator.set_region(cli.session.region.clone());

    let state = coordinator.bootstrap().await;
    info!(authenticated = state.is_authenticated, base_url = %cli.session.base_url, "ready");

    if let (Some(email), Some(password)) = (cli.email, cli.password) {
        if !state.is_authenticated || matches!(cli.command, Command::Login) {
            coordinator.login(&LoginRequest { email, password }).await?;
        }
    }

    let output = match cli.command {
        Command::Get { path } => coordinator.execute(ApiRequest::get(path)).await?.body,
        Command::Post { path, body } => {
            let request = match body {
                Some(raw) => ApiRequest::post(path, serde_json::from_str::<Value>(&raw)?),
                None => ApiRequest::post_empty(path),
            };
            coordinator.execute(request).await?.body
        }
        Command::Login | Command::Status => serde_json::to_value(coordinator.session())?,
        Command::Logout => {
            coordinator.logout().await?;
            serde_json::to_value(coordinator.session())?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
