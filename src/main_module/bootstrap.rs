//! Application state construction from configuration.

use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::auth::AuthService;
use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{self, create_conn, redact_database_url};
use crate::crm::recommend::RecommendationEngine;
use crate::drive::init_drive;
use crate::llm::{LLMProvider, OpenAIClient};
use crate::security::password::PasswordHasher2;
use crate::storage::{CrmStore, MemoryStore, PgStore, UserStore};

type Stores = (Arc<dyn CrmStore>, Arc<dyn UserStore>);

fn init_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match &config.database.url {
        Some(url) => {
            info!("Connecting to database {}", redact_database_url(url));
            let pool = create_conn(url, config.database.max_connections)
                .context("Failed to create database pool")?;
            if config.database.run_migrations {
                info!("Running database migrations...");
                utils::run_migrations(&pool)?;
            }
            let store = Arc::new(PgStore::new(pool));
            Ok((store.clone(), store))
        }
        None => {
            warn!("No database URL configured; using the in-memory store (data is lost on exit)");
            let store = Arc::new(MemoryStore::new());
            Ok((store.clone(), store))
        }
    }
}

fn init_recommender(config: &AppConfig) -> anyhow::Result<RecommendationEngine> {
    if !config.llm.enabled {
        info!("LLM disabled; lead insights use the built-in rules");
        return Ok(RecommendationEngine::rules_only());
    }
    let client = OpenAIClient::new(&config.llm).context("Failed to build LLM client")?;
    info!("LLM insights enabled with model {}", client.model());
    Ok(RecommendationEngine::with_llm(
        Arc::new(client) as Arc<dyn LLMProvider>,
        Duration::from_secs(config.llm.timeout_secs.max(1)),
    ))
}

pub async fn create_app_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let (crm, users) = init_stores(&config)?;

    let hasher = PasswordHasher2::with_defaults().context("Failed to configure password hashing")?;
    let auth = Arc::new(AuthService::new(
        users,
        hasher,
        config.auth.session_ttl_hours,
    ));

    let drive = init_drive(&config)
        .await
        .context("Failed to initialize drive")?;
    let recommender = init_recommender(&config)?;

    Ok(Arc::new(AppState {
        config,
        crm,
        auth,
        drive,
        recommender,
    }))
}

/// Logs auth events until the service is dropped.
pub fn spawn_auth_event_logger(auth: &AuthService) -> tokio::task::JoinHandle<()> {
    let mut rx = auth.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!("Auth event {} for user {}", event.kind.as_str(), event.user_id),
                Err(RecvError::Lagged(skipped)) => warn!("Auth event logger skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Applies pending migrations and exits; used by the `migrate` command.
pub fn run_migrate(config: &AppConfig) -> anyhow::Result<()> {
    let url = config
        .database
        .url
        .as_deref()
        .context("No database URL configured (set DATABASE_URL or LEADPILOT_DATABASE__URL)")?;
    info!("Migrating {}", redact_database_url(url));
    let pool = create_conn(url, 1).context("Failed to create database pool")?;
    utils::run_migrations(&pool)
}
