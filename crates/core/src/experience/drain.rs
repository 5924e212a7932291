use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directory::ProfileDirectory;
use crate::domain::user::User;
use crate::experience::{ExpDelta, ExperienceQueue, QueueEntry};
use crate::ledger::UserLedger;
use crate::notify::{Destination, Notifier};
use crate::scheduler::PeriodicJob;

pub const DEFAULT_PAUSE_BETWEEN_ENTRIES: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainSettings {
    /// Delay between consecutive entries of one pass; none before the first.
    pub pause_between_entries: Duration,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self { pause_between_entries: DEFAULT_PAUSE_BETWEEN_ENTRIES }
    }
}

/// Tally of one drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub level_ups: usize,
    pub notifications_failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryOutcome {
    Applied { leveled_up: bool, notified: bool },
    Skipped,
    Failed,
}

/// Batch consumer of the experience queue.
///
/// Each pass takes exclusive draining rights, merges every queued delta into
/// the ledger in arrival order and announces level-ups. Entries are processed
/// at most once: failures are logged and dropped, never re-enqueued.
pub struct DrainJob {
    queue: Arc<ExperienceQueue>,
    ledger: Arc<dyn UserLedger>,
    directory: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn Notifier>,
    settings: DrainSettings,
}

impl DrainJob {
    pub fn new(
        queue: Arc<ExperienceQueue>,
        ledger: Arc<dyn UserLedger>,
        directory: Arc<dyn ProfileDirectory>,
        notifier: Arc<dyn Notifier>,
        settings: DrainSettings,
    ) -> Self {
        Self { queue, ledger, directory, notifier, settings }
    }

    /// Drains the queue until it is observed empty. Returns `None` without
    /// touching the queue when another pass already holds draining rights.
    pub async fn drain_once(&self) -> Option<DrainReport> {
        let Some(guard) = self.queue.try_begin_drain() else {
            debug!(
                event_name = "experience.drain.skipped",
                queued = self.queue.len(),
                "previous drain pass still running; skipping tick"
            );
            return None;
        };

        let pass_id = Uuid::new_v4().to_string();
        info!(
            event_name = "experience.drain.start",
            correlation_id = %pass_id,
            queued = self.queue.len(),
            "draining experience queue"
        );

        let mut report = DrainReport::default();
        while let Some(entry) = guard.next_entry() {
            if report.processed > 0 && !self.settings.pause_between_entries.is_zero() {
                tokio::time::sleep(self.settings.pause_between_entries).await;
            }

            report.processed += 1;
            match self.process_entry(entry, &pass_id).await {
                EntryOutcome::Applied { leveled_up, notified } => {
                    report.applied += 1;
                    if leveled_up {
                        report.level_ups += 1;
                        if !notified {
                            report.notifications_failed += 1;
                        }
                    }
                }
                EntryOutcome::Skipped => report.skipped += 1,
                EntryOutcome::Failed => report.failed += 1,
            }
        }
        drop(guard);

        info!(
            event_name = "experience.drain.finished",
            correlation_id = %pass_id,
            processed = report.processed,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            level_ups = report.level_ups,
            "experience queue drained"
        );
        Some(report)
    }

    async fn process_entry(&self, entry: QueueEntry, pass_id: &str) -> EntryOutcome {
        let QueueEntry::UserExpDelta(delta) = entry;

        let profile = match self.directory.lookup(&delta.user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!(
                    event_name = "experience.entry.unknown_user",
                    correlation_id = %pass_id,
                    user_id = %delta.user_id,
                    "slack does not know this user; dropping entry"
                );
                return EntryOutcome::Skipped;
            }
            Err(error) => {
                warn!(
                    event_name = "experience.entry.profile_lookup_failed",
                    correlation_id = %pass_id,
                    user_id = %delta.user_id,
                    error = %error,
                    "cannot get slack user info; dropping entry"
                );
                return EntryOutcome::Failed;
            }
        };

        if !profile.is_member() {
            debug!(
                event_name = "experience.entry.not_member",
                correlation_id = %pass_id,
                user_id = %delta.user_id,
                is_bot = profile.is_bot,
                deleted = profile.deleted,
                "entry belongs to a bot or deactivated account; dropping entry"
            );
            return EntryOutcome::Skipped;
        }

        if let Err(error) = self.ledger.sync_profile(&delta.user_id, &profile.metadata).await {
            warn!(
                event_name = "experience.entry.profile_sync_failed",
                correlation_id = %pass_id,
                user_id = %delta.user_id,
                error = %error,
                "cannot sync user profile; dropping entry"
            );
            return EntryOutcome::Failed;
        }

        let update = match self.ledger.apply_delta(&delta.user_id, delta.delta).await {
            Ok(update) => update,
            Err(error) => {
                warn!(
                    event_name = "experience.entry.apply_failed",
                    correlation_id = %pass_id,
                    user_id = %delta.user_id,
                    delta = delta.delta,
                    source = delta.source.as_str(),
                    error = %error,
                    "cannot update user exp; dropping entry"
                );
                return EntryOutcome::Failed;
            }
        };

        debug!(
            event_name = "experience.entry.applied",
            correlation_id = %pass_id,
            user_id = %delta.user_id,
            delta = delta.delta,
            source = delta.source.as_str(),
            exp = update.user.exp,
            level = update.user.level,
            "experience applied"
        );

        if !update.leveled_up {
            return EntryOutcome::Applied { leveled_up: false, notified: false };
        }

        let notified = self.announce_level_up(&delta, &update.user, pass_id).await;
        EntryOutcome::Applied { leveled_up: true, notified }
    }

    async fn announce_level_up(&self, delta: &ExpDelta, user: &User, pass_id: &str) -> bool {
        let destination = match &delta.channel_id {
            Some(channel) => Destination::Channel(channel.clone()),
            None => Destination::DirectMessage(user.id.clone()),
        };
        let message = level_up_message(user);

        info!(
            event_name = "experience.level_up",
            correlation_id = %pass_id,
            user_id = %user.id,
            level = user.level,
            destination = %destination,
            "user leveled up"
        );

        match self.notifier.notify(&destination, &message).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "experience.level_up.notify_failed",
                    correlation_id = %pass_id,
                    user_id = %user.id,
                    destination = %destination,
                    error = %error,
                    "level-up notification failed; ledger already updated"
                );
                false
            }
        }
    }
}

#[async_trait]
impl PeriodicJob for DrainJob {
    async fn run(&self) {
        self.drain_once().await;
    }
}

pub fn level_up_message(user: &User) -> String {
    format!("<@{}> is now level {}! :tada:", user.id, user.level)
}
