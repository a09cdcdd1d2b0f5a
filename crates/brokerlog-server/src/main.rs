//! Broker log binary: listens for broker hook events and records them.
//!
//! Starts the hook listener with structured logging, database
//! initialization, and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;

use brokerlog_server::config::{self, Config, LoadedConfig};
use brokerlog_server::{build_adapter, ingress};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("BROKERLOG_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Warnings are held until tracing is up; a broken file degrades to
    // defaults plus environment overrides.
    let (loaded, config_error) = match config::load_config(selected_config_path) {
        Ok(loaded) => (loaded, None),
        Err(e) => {
            let mut config = Config::default();
            let warnings = config::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            (LoadedConfig { config, warnings }, Some(e))
        }
    };
    let LoadedConfig { config, warnings } = loaded;

    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "invalid configuration file, using defaults");
    }
    for warning in &warnings {
        warning.log();
    }

    let pool = brokerlog_db::create_pool(
        &config.database.path,
        config.database.runtime_settings(),
    )?;

    match pool.get() {
        Ok(conn) => match brokerlog_db::run_migrations(&conn) {
            Ok(applied) if applied > 0 => {
                tracing::info!(count = applied, "applied database migrations");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "database migrations failed, publish records will fall back or drop");
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "cannot reach database at startup, publish records will fall back or drop");
        }
    }

    let adapter = build_adapter(&config, pool);
    let addr = SocketAddr::new(config.hook.host, config.hook.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "broker hook listener started");
    adapter.broker_started(&addr.to_string());

    ingress::serve(listener, adapter.clone(), shutdown_signal()).await?;

    adapter.broker_stopped();
    drop(adapter);
    tracing::info!("broker log shut down");
    Ok(())
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
