use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use wexu_core::domain::user::{ProfileMetadata, User, UserId};
use wexu_core::experience::LevelingRule;
use wexu_core::ledger::{LedgerError, LedgerUpdate, UserLedger};

/// Ledger backed by a map. The write lock spans the read-modify-write, so
/// `apply_delta` is atomic per user.
#[derive(Default)]
pub struct InMemoryUserRepository {
    rule: LevelingRule,
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new(rule: LevelingRule) -> Self {
        Self { rule, users: RwLock::default() }
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id.0.clone(), user);
    }
}

#[async_trait::async_trait]
impl UserLedger for InMemoryUserRepository {
    async fn find(&self, id: &UserId) -> Result<Option<User>, LedgerError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn sync_profile(
        &self,
        id: &UserId,
        profile: &ProfileMetadata,
    ) -> Result<User, LedgerError> {
        let now = Utc::now();
        let mut users = self.users.write().await;
        let user = users.entry(id.0.clone()).or_insert_with(|| User::new(id.clone(), now));
        user.profile = profile.clone();
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn apply_delta(&self, id: &UserId, delta: i64) -> Result<LedgerUpdate, LedgerError> {
        let now = Utc::now();
        let mut users = self.users.write().await;
        let user = users.entry(id.0.clone()).or_insert_with(|| User::new(id.clone(), now));

        let outcome = self.rule.apply(user.exp, user.level, delta);
        user.exp = outcome.exp;
        user.level = outcome.level;
        user.updated_at = now;

        Ok(LedgerUpdate { user: user.clone(), leveled_up: outcome.leveled_up })
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, LedgerError> {
        let users = self.users.read().await;
        let mut ranked: Vec<User> = users.values().cloned().collect();
        ranked.sort_by(|left, right| right.exp.cmp(&left.exp).then_with(|| left.id.cmp(&right.id)));
        ranked.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(ranked)
    }
}
