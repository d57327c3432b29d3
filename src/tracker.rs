use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::crypto::CryptoError;
use crate::models::*;
use crate::prediction::{self, PredictionError};
use crate::reminders;
use crate::storage::{StorageError, Vault};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("app is locked")]
    Locked,
    #[error("app is already set up")]
    AlreadySetUp,
    #[error("end date {end} cannot be before start date {start}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },
    #[error("period log {0} not found")]
    PeriodNotFound(Uuid),
    #[error("invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("tracker state poisoned")]
    Poisoned,
}

/// Decrypted data and the passphrase that unlocked it.
struct Session {
    passphrase: Zeroizing<String>,
    data: AppData,
}

struct CachedSnapshot {
    today: NaiveDate,
    snapshot: PredictionSnapshot,
}

/// Entry point for the UI layer: owns the unlocked session, persists every
/// write to the vault and serves predictions for the injected clock's date.
pub struct Tracker {
    vault: Vault,
    clock: Box<dyn Clock>,
    session: Mutex<Option<Session>>,
    /// Cleared on every write, lock and unlock.
    cache: Mutex<Option<CachedSnapshot>>,
}

impl Tracker {
    pub fn new(vault: Vault, clock: impl Clock + 'static) -> Self {
        Self {
            vault,
            clock: Box::new(clock),
            session: Mutex::new(None),
            cache: Mutex::new(None),
        }
    }

    pub fn is_setup(&self) -> bool {
        self.vault.exists()
    }

    pub fn is_unlocked(&self) -> bool {
        self.session().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Create an empty vault and unlock it.
    pub fn setup(&self, passphrase: String) -> Result<(), TrackerError> {
        if self.vault.exists() {
            return Err(TrackerError::AlreadySetUp);
        }
        let passphrase = Zeroizing::new(passphrase);
        let data = AppData::default();
        self.vault.save(&passphrase, &data)?;

        *self.session()? = Some(Session { passphrase, data });
        self.invalidate();
        info!("vault created");
        Ok(())
    }

    /// Returns `false` for a wrong passphrase. Any other failure is an error.
    pub fn unlock(&self, passphrase: String) -> Result<bool, TrackerError> {
        let passphrase = Zeroizing::new(passphrase);
        match self.vault.load(&passphrase) {
            Ok(data) => {
                *self.session()? = Some(Session { passphrase, data });
                self.invalidate();
                info!("unlocked");
                Ok(true)
            }
            Err(StorageError::Crypto(CryptoError::Decryption)) => {
                warn!("unlock rejected");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the decrypted data and zeroize the passphrase.
    pub fn lock(&self) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.invalidate();
        info!("locked");
    }

    pub fn log_period(&self, period: NewPeriod) -> Result<PeriodLog, TrackerError> {
        if period.end_date < period.start_date {
            return Err(TrackerError::InvalidPeriod {
                start: period.start_date,
                end: period.end_date,
            });
        }
        let log = PeriodLog {
            id: Uuid::new_v4(),
            start_date: period.start_date,
            end_date: period.end_date,
            flow_intensity: period.flow_intensity,
            excluded_from_stats: period.excluded_from_stats,
        };
        self.write(|data| {
            data.periods.push(log.clone());
            Ok(log)
        })
    }

    /// Include a log in, or exclude it from, averages and prediction.
    pub fn set_excluded(&self, id: Uuid, excluded: bool) -> Result<PeriodLog, TrackerError> {
        self.write(|data| {
            let log = data
                .periods
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(TrackerError::PeriodNotFound(id))?;
            log.excluded_from_stats = excluded;
            Ok(log.clone())
        })
    }

    pub fn remove_period(&self, id: Uuid) -> Result<PeriodLog, TrackerError> {
        self.write(|data| {
            let idx = data
                .periods
                .iter()
                .position(|p| p.id == id)
                .ok_or(TrackerError::PeriodNotFound(id))?;
            Ok(data.periods.remove(idx))
        })
    }

    /// All logs, oldest first.
    pub fn periods(&self) -> Result<Vec<PeriodLog>, TrackerError> {
        self.read(|data| {
            let mut periods = data.periods.clone();
            periods.sort_by_key(|p| (p.start_date, p.end_date));
            Ok(periods)
        })
    }

    pub fn cycle_history(&self) -> Result<Vec<CycleHistoryItem>, TrackerError> {
        self.read(|data| Ok(prediction::cycle_history(&data.periods)))
    }

    pub fn settings(&self) -> Result<CycleConfiguration, TrackerError> {
        self.read(|data| Ok(data.settings.clone()))
    }

    /// Merge the update onto the current settings and persist them if valid.
    pub fn update_settings(
        &self,
        update: &SettingsUpdate,
    ) -> Result<CycleConfiguration, TrackerError> {
        self.write(|data| {
            let merged = data.settings.merged(update);
            prediction::validate_configuration(&merged)?;
            data.settings = merged.clone();
            Ok(merged)
        })
    }

    pub fn predictions(&self) -> Result<PredictionSnapshot, TrackerError> {
        self.read(|data| self.cached_prediction(data))
    }

    pub fn stats(&self) -> Result<CycleStats, TrackerError> {
        self.read(|data| Ok(prediction::cycle_stats(&data.periods)))
    }

    pub fn month(&self, year: i32, month: u32) -> Result<MonthView, TrackerError> {
        let invalid = || TrackerError::InvalidMonth { year, month };
        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let last_day = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?
            - Duration::days(1);

        self.read(|data| {
            let mut periods: Vec<PeriodLog> = data
                .periods
                .iter()
                .filter(|p| p.overlaps(first_day, last_day))
                .cloned()
                .collect();
            periods.sort_by_key(|p| p.start_date);

            let snapshot = match self.cached_prediction(data) {
                Ok(snapshot) => Some(snapshot),
                Err(TrackerError::Prediction(PredictionError::InsufficientData)) => None,
                Err(e) => return Err(e),
            };

            Ok(MonthView {
                year,
                month,
                periods,
                prediction: snapshot,
                stats: prediction::cycle_stats(&data.periods),
            })
        })
    }

    pub fn reminder_settings(&self) -> Result<ReminderSettings, TrackerError> {
        self.read(|data| Ok(data.reminders.clone()))
    }

    pub fn update_reminders(
        &self,
        mut settings: ReminderSettings,
    ) -> Result<ReminderSettings, TrackerError> {
        settings.period_reminder_days_before = settings
            .period_reminder_days_before
            .min(reminders::MAX_DAYS_BEFORE);
        self.write(|data| {
            data.reminders = settings.clone();
            Ok(settings)
        })
    }

    /// Reminders from today on, derived from the current prediction.
    pub fn reminders(&self) -> Result<Vec<Reminder>, TrackerError> {
        let today = self.clock.today();
        self.read(|data| {
            let snapshot = self.cached_prediction(data)?;
            Ok(reminders::upcoming(&snapshot, &data.reminders, today))
        })
    }

    /// Every stored record as pretty JSON.
    pub fn export_data(&self) -> Result<String, TrackerError> {
        self.read(|data| Ok(serde_json::to_string_pretty(data).map_err(StorageError::from)?))
    }

    pub fn wipe_all_data(&self) -> Result<(), TrackerError> {
        self.lock();
        self.vault.wipe()?;
        Ok(())
    }

    fn session(&self) -> Result<MutexGuard<'_, Option<Session>>, TrackerError> {
        self.session.lock().map_err(|_| TrackerError::Poisoned)
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&AppData) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let guard = self.session()?;
        let session = guard.as_ref().ok_or(TrackerError::Locked)?;
        f(&session.data)
    }

    /// Apply `f` to a copy of the data, persist it, then swap it in.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut AppData) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut guard = self.session()?;
        let session = guard.as_mut().ok_or(TrackerError::Locked)?;

        let mut draft = session.data.clone();
        let out = f(&mut draft)?;
        self.vault.save(&session.passphrase, &draft)?;
        session.data = draft;

        self.invalidate();
        Ok(out)
    }

    /// Caller must hold the session lock so `data` cannot change underneath.
    fn cached_prediction(&self, data: &AppData) -> Result<PredictionSnapshot, TrackerError> {
        let today = self.clock.today();
        let mut cache = self.cache.lock().map_err(|_| TrackerError::Poisoned)?;
        if let Some(cached) = cache.as_ref().filter(|c| c.today == today) {
            return Ok(cached.snapshot.clone());
        }

        let snapshot = prediction::predict_from(data, today)?;
        *cache = Some(CachedSnapshot {
            today,
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
