use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Level every member starts at.
pub const STARTING_LEVEL: i64 = 1;

/// Durable ledger record for one community member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub is_admin: bool,
    pub exp: i64,
    pub level: i64,
    pub balance: Decimal,
    pub github_username: Option<String>,
    pub profile: ProfileMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            is_admin: false,
            exp: 0,
            level: STARTING_LEVEL,
            balance: Decimal::ZERO,
            github_username: None,
            profile: ProfileMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Name shown on leaderboards: linked GitHub login first, then Slack names.
    pub fn display_label(&self) -> String {
        let candidates = [
            self.github_username.as_deref(),
            self.profile.display_name.as_deref(),
            self.profile.real_name.as_deref(),
        ];
        candidates
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("<@{}>", self.id))
    }
}

/// Slack profile fields copied onto the ledger row on every drain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub real_name: Option<String>,
    pub display_name: Option<String>,
    pub tz: Option<String>,
    pub image_original: Option<String>,
    pub slack_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ProfileMetadata, User, UserId, STARTING_LEVEL};

    #[test]
    fn new_user_starts_at_level_one_with_no_exp() {
        let user = User::new(UserId::from("U1"), Utc::now());

        assert_eq!(user.level, STARTING_LEVEL);
        assert_eq!(user.exp, 0);
        assert!(!user.is_admin);
    }

    #[test]
    fn display_label_prefers_github_then_slack_names() {
        let mut user = User::new(UserId::from("U1"), Utc::now());
        assert_eq!(user.display_label(), "<@U1>");

        user.profile = ProfileMetadata {
            real_name: Some("Linh Tran".to_owned()),
            display_name: Some("  ".to_owned()),
            ..ProfileMetadata::default()
        };
        assert_eq!(user.display_label(), "Linh Tran");

        user.github_username = Some("linhtran".to_owned());
        assert_eq!(user.display_label(), "linhtran");
    }
}
