//! CLI command implementations
//!
//! Every command receives a [`CommandContext`] carrying the loaded
//! configuration and the operator identity. Commands that touch records
//! open [`Services`], which wires the lifecycle components over the SQLite
//! store the same way the daemon does.

pub mod audit;
pub mod config;
pub mod create;
pub mod erase;
pub mod export;
pub mod rectify;
pub mod show;
pub mod sweep;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use recordkeeper_audit::AuditLedger;
use recordkeeper_core::{
    config::Config,
    domain::{PiiField, RequestContext},
    ports::{IClock, IRecordRepository, SystemClock},
};
use recordkeeper_lifecycle::{
    ConsentGate, ErasureEngine, ExportCompiler, RecordStore, RetentionScheduler,
};
use recordkeeper_store::{DatabasePool, SqliteRecordRepository};

const USER_AGENT: &str = concat!("recordkeeper-cli/", env!("CARGO_PKG_VERSION"));

/// Invocation-wide state shared by all commands
pub struct CommandContext {
    pub config_path: PathBuf,
    pub config: Config,
    pub actor: String,
}

impl CommandContext {
    pub fn new(config_path: PathBuf, config: Config, actor: String) -> Self {
        Self {
            config_path,
            config,
            actor,
        }
    }

    /// Request context stamped on audit entries written by this invocation
    pub fn request(&self) -> RequestContext {
        RequestContext::new(self.actor.clone()).with_user_agent(USER_AGENT)
    }

    /// Opens the configured database and wires the lifecycle components
    pub async fn open(&self) -> Result<Services> {
        let db_path = &self.config.storage.database_path;
        let pool = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Ok(Services::wire(&self.config, pool, Arc::new(SystemClock)))
    }
}

/// Lifecycle components over one database pool
pub struct Services {
    pub pool: DatabasePool,
    pub repo: Arc<dyn IRecordRepository>,
    pub clock: Arc<dyn IClock>,
    pub ledger: Arc<AuditLedger>,
    pub store: Arc<RecordStore>,
    pub erasure: Arc<ErasureEngine>,
    pub export: ExportCompiler,
    sweep_interval: std::time::Duration,
}

impl Services {
    pub fn wire(config: &Config, pool: DatabasePool, clock: Arc<dyn IClock>) -> Self {
        let repo: Arc<dyn IRecordRepository> =
            Arc::new(SqliteRecordRepository::new(pool.pool().clone()));
        let defaults = config.record_defaults();

        let ledger = Arc::new(AuditLedger::new(repo.clone()));
        let store = Arc::new(RecordStore::new(
            repo.clone(),
            ledger.clone(),
            ConsentGate::new(defaults.clone(), clock.clone()),
            clock.clone(),
            defaults,
        ));
        let erasure = Arc::new(ErasureEngine::new(
            store.clone(),
            ledger.clone(),
            clock.clone(),
        ));
        let export = ExportCompiler::new(store.clone(), ledger.clone(), clock.clone());

        Self {
            pool,
            repo,
            clock,
            ledger,
            store,
            erasure,
            export,
            sweep_interval: config.sweep_interval(),
        }
    }

    /// A scheduler sharing this wiring, for one-shot sweeps
    pub fn scheduler(&self) -> RetentionScheduler {
        RetentionScheduler::new(
            self.repo.clone(),
            self.erasure.clone(),
            self.clock.clone(),
            self.sweep_interval,
        )
    }

    pub async fn close(self) {
        self.pool.pool().close().await;
    }
}

/// Parses a `field=value` assignment such as `email=ada@example.com`
pub fn parse_assignment(input: &str) -> Result<(PiiField, String), String> {
    let (field, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", input))?;
    let field = field.parse::<PiiField>().map_err(|e| e.to_string())?;
    Ok((field, value.to_string()))
}

/// Parses a bare field name
pub fn parse_field(input: &str) -> Result<PiiField, String> {
    input.parse::<PiiField>().map_err(|e| e.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("email=ada@example.com").unwrap(),
            (PiiField::Email, "ada@example.com".to_string())
        );
        assert_eq!(
            parse_assignment("address=1 Main St, a=b").unwrap(),
            (PiiField::Address, "1 Main St, a=b".to_string())
        );
    }

    #[test]
    fn test_parse_assignment_rejects_bad_input() {
        assert!(parse_assignment("email").is_err());
        assert!(parse_assignment("shoe_size=44").is_err());
    }

    #[test]
    fn test_parse_field_aliases() {
        assert_eq!(parse_field("dob").unwrap(), PiiField::DateOfBirth);
        assert!(parse_field("nickname").is_err());
    }

    #[test]
    fn test_request_carries_actor_and_agent() {
        let ctx = CommandContext::new(PathBuf::from("/tmp/x.yaml"), Config::default(), "dpo".into());
        let request = ctx.request();
        assert_eq!(request.actor, "dpo");
        assert_eq!(request.user_agent.as_deref(), Some(USER_AGENT));
    }
}
