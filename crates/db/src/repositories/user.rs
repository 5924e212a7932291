use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use wexu_core::domain::user::{ProfileMetadata, User, UserId};
use wexu_core::experience::LevelingRule;
use wexu_core::ledger::{LedgerError, LedgerUpdate, UserLedger};

use super::RepositoryError;
use crate::DbPool;

/// Compare-and-set attempts before `apply_delta` reports contention.
pub const MAX_APPLY_ATTEMPTS: u32 = 32;

const USER_COLUMNS: &str = "id,
                is_admin,
                exp,
                level,
                balance,
                github_username,
                first_name,
                last_name,
                real_name,
                display_name,
                tz,
                image_original,
                slack_email,
                created_at,
                updated_at";

pub struct SqlUserRepository {
    pool: DbPool,
    rule: LevelingRule,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool, rule: LevelingRule) -> Self {
        Self { pool, rule }
    }

    async fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM user WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(user_from_row).transpose()
    }

    async fn ensure_row(&self, id: &UserId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user (id, created_at, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&id.0)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// One optimistic attempt. `Ok(None)` means another writer changed the row
    /// between the read and the write.
    async fn try_apply(
        &self,
        id: &UserId,
        delta: i64,
    ) -> Result<Option<LedgerUpdate>, RepositoryError> {
        let row = sqlx::query("SELECT exp, level FROM user WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        let exp: i64 = row.try_get("exp")?;
        let level: i64 = row.try_get("level")?;

        let outcome = self.rule.apply(exp, level, delta);
        let written = sqlx::query(
            "UPDATE user
             SET exp = ?, level = ?, updated_at = ?
             WHERE id = ? AND exp = ? AND level = ?",
        )
        .bind(outcome.exp)
        .bind(outcome.level)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(exp)
        .bind(level)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if written == 0 {
            return Ok(None);
        }

        let user = self.fetch(id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("user `{id}` disappeared after experience update"))
        })?;
        Ok(Some(LedgerUpdate { user, leveled_up: outcome.leveled_up }))
    }
}

#[async_trait::async_trait]
impl UserLedger for SqlUserRepository {
    async fn find(&self, id: &UserId) -> Result<Option<User>, LedgerError> {
        Ok(self.fetch(id).await?)
    }

    async fn sync_profile(
        &self,
        id: &UserId,
        profile: &ProfileMetadata,
    ) -> Result<User, LedgerError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO user (
                id,
                first_name,
                last_name,
                real_name,
                display_name,
                tz,
                image_original,
                slack_email,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                real_name = excluded.real_name,
                display_name = excluded.display_name,
                tz = excluded.tz,
                image_original = excluded.image_original,
                slack_email = excluded.slack_email,
                updated_at = excluded.updated_at",
        )
        .bind(&id.0)
        .bind(profile.first_name.as_deref())
        .bind(profile.last_name.as_deref())
        .bind(profile.real_name.as_deref())
        .bind(profile.display_name.as_deref())
        .bind(profile.tz.as_deref())
        .bind(profile.image_original.as_deref())
        .bind(profile.slack_email.as_deref())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let user = self.fetch(id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("user `{id}` missing after profile upsert"))
        })?;
        Ok(user)
    }

    async fn apply_delta(&self, id: &UserId, delta: i64) -> Result<LedgerUpdate, LedgerError> {
        self.ensure_row(id, Utc::now()).await?;

        for attempt in 1..=MAX_APPLY_ATTEMPTS {
            if let Some(update) = self.try_apply(id, delta).await? {
                return Ok(update);
            }
            debug!(
                event_name = "db.user.apply_delta.conflict",
                user_id = %id,
                attempt,
                "experience row changed concurrently; retrying"
            );
            tokio::task::yield_now().await;
        }

        Err(LedgerError::Contention { user_id: id.clone(), attempts: MAX_APPLY_ATTEMPTS })
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM user ORDER BY exp DESC, id ASC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let users = rows.into_iter().map(user_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.try_get("id")?),
        is_admin: row.try_get("is_admin")?,
        exp: row.try_get("exp")?,
        level: row.try_get("level")?,
        balance: parse_decimal("balance", row.try_get("balance")?)?,
        github_username: row.try_get("github_username")?,
        profile: ProfileMetadata {
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            real_name: row.try_get("real_name")?,
            display_name: row.try_get("display_name")?,
            tz: row.try_get("tz")?,
            image_original: row.try_get("image_original")?,
            slack_email: row.try_get("slack_email")?,
        },
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use wexu_core::domain::user::{ProfileMetadata, UserId};
    use wexu_core::experience::LevelingRule;
    use wexu_core::ledger::UserLedger;

    use super::SqlUserRepository;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn apply_delta_creates_row_and_levels_up_once() {
        let repo = SqlUserRepository::new(setup_pool().await, LevelingRule::default());
        let id = UserId::from("U1");

        let first = repo.apply_delta(&id, 60).await.expect("first delta");
        let second = repo.apply_delta(&id, 60).await.expect("second delta");
        let third = repo.apply_delta(&id, 5).await.expect("third delta");

        assert!(!first.leveled_up);
        assert!(second.leveled_up);
        assert!(!third.leveled_up);
        assert_eq!((third.user.exp, third.user.level), (125, 2));
        assert_eq!(third.user.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn negative_delta_keeps_level() {
        let repo = SqlUserRepository::new(setup_pool().await, LevelingRule::default());
        let id = UserId::from("U1");
        repo.apply_delta(&id, 150).await.expect("level up");

        let update = repo.apply_delta(&id, -100).await.expect("penalty");

        assert_eq!((update.user.exp, update.user.level), (50, 2));
        assert!(!update.leveled_up);
    }

    #[tokio::test]
    async fn sync_profile_upserts_metadata_without_touching_experience() {
        let repo = SqlUserRepository::new(setup_pool().await, LevelingRule::default());
        let id = UserId::from("U7");
        repo.apply_delta(&id, 42).await.expect("seed exp");

        let profile = ProfileMetadata {
            real_name: Some("Ada Lovelace".to_owned()),
            display_name: Some("ada".to_owned()),
            tz: Some("Europe/London".to_owned()),
            ..ProfileMetadata::default()
        };
        let user = repo.sync_profile(&id, &profile).await.expect("sync");

        assert_eq!(user.exp, 42);
        assert_eq!(user.profile, profile);
        assert_eq!(repo.find(&id).await.expect("find"), Some(user));
    }

    #[tokio::test]
    async fn sync_profile_creates_missing_user_at_starting_level() {
        let repo = SqlUserRepository::new(setup_pool().await, LevelingRule::default());

        let user = repo
            .sync_profile(&UserId::from("U9"), &ProfileMetadata::default())
            .await
            .expect("sync");

        assert_eq!((user.exp, user.level), (0, 1));
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn find_unknown_user_returns_none() {
        let repo = SqlUserRepository::new(setup_pool().await, LevelingRule::default());
        assert_eq!(repo.find(&UserId::from("nobody")).await.expect("find"), None);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_experience_and_honours_limit() {
        let repo = SqlUserRepository::new(setup_pool().await, LevelingRule::default());
        for (id, exp) in [("U1", 10), ("U2", 300), ("U3", 45), ("U4", 45)] {
            repo.apply_delta(&UserId::from(id), exp).await.expect("seed");
        }

        let top = repo.leaderboard(3).await.expect("leaderboard");

        let ids: Vec<&str> = top.iter().map(|user| user.id.as_str()).collect();
        assert_eq!(ids, vec!["U2", "U3", "U4"]);
    }

    #[tokio::test]
    async fn concurrent_deltas_on_one_user_are_not_lost() {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = Arc::new(SqlUserRepository::new(pool, LevelingRule::default()));
        let id = UserId::from("U1");

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let id = id.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        repo.apply_delta(&id, 5).await.expect("apply delta");
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.expect("writer task");
        }

        let user = repo.find(&id).await.expect("find").expect("user exists");
        assert_eq!(user.exp, 200);
        assert_eq!(user.level, 3);
    }
}
