use serde::Serialize;

use wexu_core::domain::user::User;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
    Divider { block_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn divider(mut self, block_id: impl Into<String>) -> Self {
        self.blocks.push(Block::Divider { block_id: block_id.into() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn profile_message(user: &User) -> MessageTemplate {
    let summary = format!("Exp: `{}`, level: {}", user.exp, user.level);
    MessageBuilder::new(summary.clone())
        .section("profile.summary.v1", |section| {
            section.mrkdwn(summary);
        })
        .build()
}

pub const NO_EXPERIENCE_TEXT: &str =
    "You have no experience yet. Chat and react in the channels to earn some.";

/// Reply to `$profile` from a member the ledger has never seen.
pub fn no_experience_message() -> MessageTemplate {
    MessageBuilder::new(NO_EXPERIENCE_TEXT)
        .section("profile.no_experience.v1", |section| {
            section.plain(NO_EXPERIENCE_TEXT);
        })
        .build()
}

pub fn leaderboard_message(users: &[User]) -> MessageTemplate {
    if users.is_empty() {
        return MessageBuilder::new("No users reached the top")
            .section("leaderboard.empty.v1", |section| {
                section.plain("No users reached the top");
            })
            .build();
    }

    let rows = users
        .iter()
        .enumerate()
        .map(|(index, user)| {
            format!(
                "{rank}. {label} | level {level} | balance {balance}",
                rank = index + 1,
                label = user.display_label(),
                level = user.level,
                balance = user.balance,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new(format!("Top {} members", users.len()))
        .section("leaderboard.header.v1", |section| {
            section.mrkdwn("*Top members*");
        })
        .divider("leaderboard.divider.v1")
        .section("leaderboard.rows.v1", |section| {
            section.mrkdwn(rows);
        })
        .build()
}

pub fn command_unavailable_message(command: &str) -> MessageTemplate {
    let summary = format!("`{command}` is not available in this workspace yet.");
    MessageBuilder::new(summary.clone())
        .section("command.unavailable.v1", |section| {
            section.mrkdwn(summary);
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("command.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("command.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}
