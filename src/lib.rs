//! On-device cycle tracking: an encrypted vault of period logs and settings,
//! and a pure engine that turns them into next-period, ovulation and
//! fertile-window predictions.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod models;
pub mod prediction;
pub mod reminders;
pub mod storage;
pub mod tracker;

use tracing_subscriber::EnvFilter;

pub use clock::{Clock, FixedClock, SystemClock};
pub use models::{
    CycleConfiguration, CycleStats, FlowIntensity, NewPeriod, PeriodLog, PredictionBasis,
    PredictionSnapshot, Reminder, ReminderKind, ReminderSettings, SettingsUpdate,
};
pub use prediction::{predict, PredictionError};
pub use storage::{PeriodStore, SettingsStore, StorageError, Vault};
pub use tracker::{Tracker, TrackerError};

/// Install a fmt subscriber filtered by `RUST_LOG`, or the crate default.
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
    tracing::debug!("{} v{} tracing ready", config::APP_NAME, config::APP_VERSION);
}
