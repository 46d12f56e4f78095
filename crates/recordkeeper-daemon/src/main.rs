//! RecordKeeper Daemon - background retention service
//!
//! This binary runs as a system service and:
//! - Opens the record store named in the configuration
//! - Sweeps for records past their scheduled deletion and erases them
//! - Shuts down gracefully on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the lifecycle components over the SQLite store and runs
//! the `RetentionScheduler` until a `CancellationToken` is triggered by a
//! shutdown signal. Cancellation never interrupts an erasure mid-commit.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use recordkeeper_audit::AuditLedger;
use recordkeeper_core::{
    config::Config,
    ports::{IClock, IRecordRepository, SystemClock},
};
use recordkeeper_lifecycle::{ConsentGate, ErasureEngine, RecordStore, RetentionScheduler};
use recordkeeper_store::{DatabasePool, SqliteRecordRepository};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "RECORDKEEPER_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the store and the shutdown token for the lifetime of the process
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    clock: Arc<dyn IClock>,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Validates the configuration and opens the database it names
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            for e in &errors {
                error!(field = %e.field, message = %e.message, "Invalid configuration");
            }
            anyhow::bail!("configuration has {} error(s)", errors.len());
        }

        let db_path = &config.storage.database_path;
        let db_pool = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        Ok(Self::with_pool(config, db_pool, Arc::new(SystemClock), shutdown))
    }

    fn with_pool(
        config: Config,
        db_pool: DatabasePool,
        clock: Arc<dyn IClock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            db_pool,
            clock,
            shutdown,
        }
    }

    /// Wires repository, ledger, store and erasure engine into a scheduler
    fn scheduler(&self) -> RetentionScheduler {
        let repo: Arc<dyn IRecordRepository> =
            Arc::new(SqliteRecordRepository::new(self.db_pool.pool().clone()));
        let defaults = self.config.record_defaults();

        let ledger = Arc::new(AuditLedger::new(repo.clone()));
        let store = Arc::new(RecordStore::new(
            repo.clone(),
            ledger.clone(),
            ConsentGate::new(defaults.clone(), self.clock.clone()),
            self.clock.clone(),
            defaults,
        ));
        let erasure = Arc::new(ErasureEngine::new(store, ledger, self.clock.clone()));

        RetentionScheduler::new(repo, erasure, self.clock.clone(), self.config.sweep_interval())
            .with_cancellation(self.shutdown.child_token())
    }

    /// Runs the retention scheduler until the shutdown token is cancelled
    async fn run(&self) -> Result<()> {
        info!(
            database = %self.config.storage.database_path.display(),
            sweep_interval_secs = self.config.retention.sweep_interval_seconds,
            default_retention_days = self.config.retention.default_retention_period_days,
            "Starting retention service"
        );

        let scheduler = Arc::new(self.scheduler());
        let handle = scheduler.start();

        handle.await.context("Retention scheduler task failed")?;

        self.db_pool.pool().close().await;
        info!("Record store closed");
        Ok(())
    }
}

// ============================================================================
// Startup helpers
// ============================================================================

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = Config::load_or_default(&config_path);

    init_tracing(&config);
    info!(config_path = %config_path.display(), "RecordKeeper daemon starting (recordkeeperd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("RecordKeeper daemon shut down gracefully"),
        Err(e) => error!(error = %e, "RecordKeeper daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
