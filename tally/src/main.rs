// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{env, process, str::FromStr, sync::Arc};

use core_types::{StoreBackend, config::StoreConfig};
use ledger::{LedgerConfig, LedgerController, SystemClock};
use log::{error, info, warn};
use metrics::Metrics;
use realtime::{ChannelHub, StatePublisher};
use storage::{KvStore, MemoryStore, RedisStore, StoreError};
use tally::{AdminSessions, AppState, ConfigError, Environment, RuntimeConfig};
use thiserror::Error;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run().await {
        eprintln!("tally failed: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = {
        let env = parse_environment()?;
        RuntimeConfig::load(env)?
    };
    let settings = &config.settings;

    let metrics = Arc::new(Metrics::new()?);
    let store = open_store(&settings.store).await?;
    let hub = Arc::new(ChannelHub::new(
        settings.realtime.channel_name.clone(),
        settings.realtime.channel_capacity,
    ));
    let ledger = Arc::new(LedgerController::new(
        LedgerConfig::from_settings(settings),
        store,
        Arc::new(SystemClock),
        StatePublisher::new(hub.clone(), metrics.clone()),
        metrics.clone(),
    ));
    let sessions = AdminSessions::new(config.admin_password.clone(), settings.admin.session_ttl());
    let state = Arc::new(AppState::new(
        ledger,
        hub.clone(),
        sessions,
        config.secure_cookies(),
    ));

    let metrics_listener = TcpListener::bind(config.metrics_addr()?).await?;
    tokio::spawn(async move {
        if let Err(err) = metrics.serve(metrics_listener).await {
            error!("metrics server stopped: {err}");
        }
    });

    let bind_addr = config.bind_addr()?;
    let listener = TcpListener::bind(bind_addr).await?;
    info!(
        "tally booted in {} mode on {bind_addr}; metrics on {}; {:?} store; broadcasting on '{}'; daily vote limit {}",
        config.env.label(),
        settings.server.metrics_addr,
        settings.store.backend,
        hub.name(),
        settings.ledger.daily_vote_limit
    );

    tokio::select! {
        result = tally::serve(state, listener) => result.map_err(AppError::Serve)?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received");
        }
    }
    Ok(())
}

async fn open_store(settings: &StoreConfig) -> Result<Arc<dyn KvStore>, AppError> {
    match settings.backend {
        StoreBackend::Memory => {
            warn!("using the in-process store; ledger state is lost on restart and not shared");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(&settings.redis_url).await?)),
    }
}

fn parse_environment() -> Result<Environment, AppError> {
    let arg = env::args().nth(1).ok_or(AppError::Usage)?;
    Environment::from_str(&arg).map_err(AppError::from)
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: tally <dev|prod>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server stopped: {0}")]
    Serve(Box<dyn std::error::Error + Send + Sync>),
}
