use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use wexu_core::catalog::{CatalogSyncJob, ItemCatalog, NoopItemCatalog};
use wexu_core::config::{AppConfig, ConfigError, LoadOptions};
use wexu_core::experience::{DrainJob, ExperienceQueue};
use wexu_core::scheduler::{PeriodicScheduler, SchedulerError};
use wexu_db::{connect_with_config, migrations, DbPool, SqlTransactionRepository, SqlUserRepository};
use wexu_slack::socket::{ReconnectPolicy, SocketModeRunner};
use wexu_slack::{default_dispatcher, SlackSocketTransport, SlackWebClient};

use crate::catalog::NotionCatalog;

pub const DRAIN_JOB: &str = "experience.drain";
pub const CATALOG_SYNC_JOB: &str = "catalog.sync";

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub queue: Arc<ExperienceQueue>,
    pub ledger: Arc<SqlUserRepository>,
    pub drain_job: Arc<DrainJob>,
    pub scheduler: PeriodicScheduler,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let http = reqwest::Client::new();
    let queue = Arc::new(ExperienceQueue::new());
    let ledger = Arc::new(SqlUserRepository::new(db_pool.clone(), config.experience.leveling_rule()));
    let slack = Arc::new(SlackWebClient::new(
        http.clone(),
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
    ));

    let drain_job = Arc::new(DrainJob::new(
        Arc::clone(&queue),
        ledger.clone(),
        slack.clone(),
        slack.clone(),
        config.experience.drain_settings(),
    ));

    let mut scheduler = PeriodicScheduler::new();
    scheduler.register(DRAIN_JOB, config.experience.drain_interval(), drain_job.clone())?;

    let catalog: Arc<dyn ItemCatalog> =
        match (config.catalog.enabled, &config.catalog.api_key, &config.catalog.database_id) {
            (true, Some(api_key), Some(database_id)) => Arc::new(NotionCatalog::new(
                http.clone(),
                config.catalog.base_url.clone(),
                api_key.clone(),
                database_id.clone(),
            )),
            _ => Arc::new(NoopItemCatalog),
        };
    if config.catalog.enabled {
        let counter = Arc::new(SqlTransactionRepository::new(db_pool.clone()));
        let sync_job = Arc::new(CatalogSyncJob::new(catalog, counter));
        scheduler.register(CATALOG_SYNC_JOB, config.catalog.sync_interval(), sync_job)?;
    }
    info!(
        event_name = "system.bootstrap.jobs_registered",
        correlation_id = "bootstrap",
        jobs = scheduler.job_count(),
        catalog_enabled = config.catalog.enabled,
        "background jobs registered"
    );

    let transport = Arc::new(SlackSocketTransport::new(
        http,
        config.slack.api_base_url.clone(),
        config.slack.app_token.clone(),
    ));
    let dispatcher =
        default_dispatcher(Arc::clone(&queue), config.experience.rewards, ledger.clone());
    let slack_runner = SocketModeRunner::new(transport, dispatcher, ReconnectPolicy::default())
        .with_responder(slack);

    Ok(Application { config, db_pool, queue, ledger, drain_job, scheduler, slack_runner })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use axum::{routing::post, Form, Json, Router};
    use chrono::Utc;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use wexu_core::config::{ConfigOverrides, LoadOptions};
    use wexu_core::domain::user::{ChannelId, UserId};
    use wexu_core::experience::{ExpDelta, RewardSource};
    use wexu_core::ledger::UserLedger;

    use crate::bootstrap::bootstrap;

    fn options(database_path: &Path, config_path: Option<&Path>) -> LoadOptions {
        LoadOptions {
            config_path: config_path.map(Path::to_path_buf),
            overrides: ConfigOverrides {
                database_url: Some(format!("sqlite://{}?mode=rwc", database_path.display())),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                slack_app_token: Some("invalid-token".to_string()),
                slack_bot_token: Some("xoxb-valid".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_registers_the_drain_job() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap(options(&dir.path().join("wexu.db"), None))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('user', 'transaction_log')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("ledger tables");
        assert_eq!(table_count, 2);
        assert_eq!(app.scheduler.job_count(), 1);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn enabling_the_catalog_registers_its_sync_job() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("wexu.toml");
        std::fs::write(
            &config_path,
            r#"
[catalog]
enabled = true
api_key = "secret_test"
database_id = "db-1"
sync_interval_secs = 120
"#,
        )
        .expect("write config");

        let app = bootstrap(options(&dir.path().join("wexu.db"), Some(&config_path)))
            .await
            .expect("bootstrap");

        assert_eq!(app.scheduler.job_count(), 2);
        app.db_pool.close().await;
    }

    type Posts = Arc<Mutex<Vec<Value>>>;

    async fn spawn_fake_slack() -> (String, Posts) {
        let posts: Posts = Arc::default();
        let recorded = Arc::clone(&posts);
        let router = Router::new()
            .route(
                "/users.info",
                post(|Form(form): Form<Vec<(String, String)>>| async move {
                    let user = form
                        .into_iter()
                        .find(|(key, _)| key == "user")
                        .map(|(_, value)| value)
                        .unwrap_or_default();
                    Json(json!({
                        "ok": true,
                        "user": {
                            "id": user,
                            "is_bot": false,
                            "deleted": false,
                            "profile": { "real_name": "Linh Tran", "display_name": "linh" }
                        }
                    }))
                }),
            )
            .route(
                "/chat.postMessage",
                post(move |Json(body): Json<Value>| {
                    let recorded = Arc::clone(&recorded);
                    async move {
                        recorded.lock().await.push(body);
                        Json(json!({ "ok": true }))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("fake slack server");
        });

        (format!("http://{address}"), posts)
    }

    #[tokio::test]
    async fn queued_chat_activity_reaches_the_ledger_and_announces_level_ups() {
        let (slack_url, posts) = spawn_fake_slack().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("wexu.toml");
        std::fs::write(
            &config_path,
            format!(
                "[slack]\napi_base_url = \"{slack_url}\"\n\n[experience]\npause_between_entries_ms = 0\n"
            ),
        )
        .expect("write config");
        let app = bootstrap(options(&dir.path().join("wexu.db"), Some(&config_path)))
            .await
            .expect("bootstrap");

        for delta in [60, 60, 5] {
            app.queue.enqueue(ExpDelta {
                user_id: UserId::from("U1"),
                delta,
                channel_id: Some(ChannelId::from("C1")),
                enqueued_at: Utc::now(),
                source: RewardSource::Message,
            });
        }
        let report = app.drain_job.drain_once().await.expect("no overlapping pass");

        assert_eq!(report.applied, 3);
        assert_eq!(report.level_ups, 1);
        let user = app.ledger.find(&UserId::from("U1")).await.expect("find").expect("user row");
        assert_eq!((user.exp, user.level), (125, 2));
        assert_eq!(user.profile.display_name.as_deref(), Some("linh"));

        let posts = posts.lock().await.clone();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["channel"], "C1");
        assert_eq!(posts[0]["text"], "<@U1> is now level 2! :tada:");

        app.db_pool.close().await;
    }
}
