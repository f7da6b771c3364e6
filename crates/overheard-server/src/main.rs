mod config;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use overheard_crypto::deeplink::DeeplinkCodec;
use overheard_crypto::policy::Policy;
use overheard_db::Database;
use overheard_engine::Engine;
use overheard_gateway::dispatcher::{DEFAULT_IDLE, Dispatcher};
use overheard_gateway::{BotApi, UpdateHandler, poller};

use crate::config::Config;

/// Every workspace crate at info unless `RUST_LOG` says otherwise.
const DEFAULT_LOG_FILTER: &str = "overheard=info,overheard_engine=info,overheard_gateway=info,\
                                  overheard_db=info,overheard_crypto=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    // Config
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}.", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Storage and policy
    let db = Arc::new(Database::open(&config.db_path)?);
    let policy = Policy::load(&config.policy_path)?;

    // Platform
    let api = Arc::new(BotApi::connect(&config.api_url, &config.bot_token, config.http_timeout).await?);

    let engine = Arc::new(Engine::new(
        db,
        api.clone(),
        policy,
        DeeplinkCodec::new(&config.deeplink_salt),
        config.operator_chat,
    ));
    if config.operator_chat.is_none() {
        info!("No operator chat configured; events go to the log only");
    }

    let handler = Arc::new(UpdateHandler::new(engine, api.clone()));
    let dispatcher = Dispatcher::new(handler, DEFAULT_IDLE);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let polling = tokio::spawn(poller::run(
        api,
        dispatcher,
        config.poll_timeout_secs,
        shutdown_rx,
    ));
    info!("Overheard relay started");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    polling.await?;

    info!("Overheard relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_every_crate() {
        for target in [
            "overheard",
            "overheard_engine",
            "overheard_gateway",
            "overheard_db",
            "overheard_crypto",
        ] {
            assert!(
                DEFAULT_LOG_FILTER.split(',').any(|d| d == format!("{}=info", target)),
                "{} missing",
                target
            );
        }
        let _ = tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).unwrap();
    }
}
