use sqlx::Row;

use wexu_core::catalog::{CatalogError, RedemptionCounter};
use wexu_core::domain::item::ItemId;

use super::RepositoryError;
use crate::DbPool;

/// Read side of the redemption log. Rows are written outside this service.
pub struct SqlTransactionRepository {
    pool: DbPool,
}

impl SqlTransactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn count_rows(&self, item_id: &ItemId) -> Result<u32, RepositoryError> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM transaction_log WHERE item_id = ?")
                .bind(&item_id.0)
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;

        u32::try_from(count).map_err(|_| {
            RepositoryError::Decode(format!("transaction count out of range for `{item_id}`"))
        })
    }
}

#[async_trait::async_trait]
impl RedemptionCounter for SqlTransactionRepository {
    async fn count_for_item(&self, item_id: &ItemId) -> Result<u32, CatalogError> {
        Ok(self.count_rows(item_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use wexu_core::catalog::RedemptionCounter;
    use wexu_core::domain::item::ItemId;
    use wexu_core::domain::user::UserId;
    use wexu_core::experience::LevelingRule;
    use wexu_core::ledger::UserLedger;

    use super::SqlTransactionRepository;
    use crate::migrations;
    use crate::repositories::SqlUserRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let users = SqlUserRepository::new(pool.clone(), LevelingRule::default());
        for id in ["U1", "U2"] {
            users.apply_delta(&UserId::from(id), 1).await.expect("seed user");
        }
        pool
    }

    async fn seed_redemption(pool: &DbPool, id: &str, user: &str, item: &str) {
        sqlx::query(
            "INSERT INTO transaction_log (id, user_id, item_id, price, created_at)
             VALUES (?, ?, ?, '12.50', '2024-03-01T10:00:00+00:00')",
        )
        .bind(id)
        .bind(user)
        .bind(item)
        .execute(pool)
        .await
        .expect("seed redemption");
    }

    #[tokio::test]
    async fn counts_redemptions_per_item() {
        let pool = setup_pool().await;
        seed_redemption(&pool, "T1", "U1", "mug").await;
        seed_redemption(&pool, "T2", "U2", "mug").await;
        seed_redemption(&pool, "T3", "U2", "shirt").await;
        let repo = SqlTransactionRepository::new(pool);

        assert_eq!(repo.count_for_item(&ItemId::from("mug")).await, Ok(2));
        assert_eq!(repo.count_for_item(&ItemId::from("shirt")).await, Ok(1));
    }

    #[tokio::test]
    async fn unredeemed_item_counts_zero() {
        let repo = SqlTransactionRepository::new(setup_pool().await);

        assert_eq!(repo.count_for_item(&ItemId::from("stickers")).await, Ok(0));
    }

    #[tokio::test]
    async fn closed_pool_surfaces_as_counter_error() {
        let pool = setup_pool().await;
        pool.close().await;
        let repo = SqlTransactionRepository::new(pool);

        let result = repo.count_for_item(&ItemId::from("mug")).await;

        assert!(matches!(result, Err(wexu_core::catalog::CatalogError::Counter(_))));
    }
}
