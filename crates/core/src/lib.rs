pub mod catalog;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod experience;
pub mod ledger;
pub mod notify;
pub mod scheduler;

pub use catalog::{
    CatalogError, CatalogSyncJob, CatalogSyncReport, ItemCatalog, NoopItemCatalog,
    RedemptionCounter,
};
pub use directory::{ProfileDirectory, ProfileLookupError, SlackProfile};
pub use domain::item::{CatalogItem, ItemId};
pub use domain::user::{ChannelId, ProfileMetadata, User, UserId};
pub use errors::{ApplicationError, InterfaceError};
pub use experience::{
    ChatSignal, DrainJob, DrainReport, DrainSettings, ExpDelta, ExperienceQueue, LevelOutcome,
    LevelingRule, QueueEntry, RewardPolicy, RewardSource,
};
pub use ledger::{LedgerError, LedgerUpdate, UserLedger};
pub use notify::{Destination, NoopNotifier, Notifier, NotifyError};
pub use scheduler::{PeriodicJob, PeriodicScheduler, SchedulerError, SchedulerHandle};
