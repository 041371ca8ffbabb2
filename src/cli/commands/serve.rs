use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use crate::cli::OutputFormat;
use crate::config::CONFIG;
use crate::database::{DataStore, DatabaseManager, MemoryStore, PgStore};
use crate::rls::{PolicyRegistry, RegistryHandle};
use crate::server::{app, AppState};

const DEFAULT_FIXTURES: &str = "fixtures/field_service.json";

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, help = "Serve from an in-memory store seeded with fixtures instead of Postgres")]
    pub memory: bool,

    #[arg(long, help = "Fixture file for the in-memory store (implies --memory)")]
    pub fixtures: Option<PathBuf>,

    #[arg(long, help = "Policy file (defaults to RLS_POLICY_FILE, then the built-in table)")]
    pub policies: Option<PathBuf>,

    #[arg(long, help = "Port to listen on (defaults to the configured api.port)")]
    pub port: Option<u16>,
}

pub async fn handle(args: ServeArgs, _output_format: OutputFormat) -> anyhow::Result<()> {
    CONFIG.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    tracing::info!("Starting Field Ops API in {:?} mode", CONFIG.environment);

    let registry = Arc::new(load_registry(args.policies.clone())?);
    let store = open_store(&args).await?;

    #[cfg(unix)]
    {
        if CONFIG.rls.reload_on_sighup {
            spawn_sighup_reload(registry.clone())?;
        }
    }

    let port = args.port.unwrap_or(CONFIG.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Field Ops API listening on http://{} ({} store)", bind_addr, store.backend());

    axum::serve(listener, app(AppState::new(registry, store)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn load_registry(path: Option<PathBuf>) -> anyhow::Result<RegistryHandle> {
    match path.or_else(|| CONFIG.rls.policy_file.clone()) {
        Some(path) => RegistryHandle::from_path(&path)
            .with_context(|| format!("failed to load policies from {}", path.display())),
        None => {
            let registry = PolicyRegistry::builtin().context("built-in policy table is invalid")?;
            tracing::info!("Using built-in policy table ({} entries)", registry.len());
            Ok(RegistryHandle::new(registry))
        }
    }
}

async fn open_store(args: &ServeArgs) -> anyhow::Result<Arc<dyn DataStore>> {
    if args.memory || args.fixtures.is_some() {
        let path = args
            .fixtures
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURES));
        let store = MemoryStore::from_fixture_path(&path)
            .with_context(|| format!("failed to load fixtures from {}", path.display()))?;
        return Ok(Arc::new(store));
    }

    let manager = DatabaseManager::from_env().await.context("failed to connect to database")?;
    Ok(Arc::new(PgStore::new(manager)))
}

/// Swap in a freshly parsed policy table on every SIGHUP. A table that
/// fails to load is logged and the running one stays in place.
#[cfg(unix)]
fn spawn_sighup_reload(registry: Arc<RegistryHandle>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match registry.reload() {
                Ok(count) => tracing::info!("SIGHUP: reloaded {} policies", count),
                Err(e) => tracing::error!("SIGHUP: policy reload failed, keeping previous table: {}", e),
            }
        }
    });
    tracing::info!("Policy reload on SIGHUP enabled");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
