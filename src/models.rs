use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlowIntensity {
    Light,
    Medium,
    Heavy,
}

/// One user-reported menstruation episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodLog {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub flow_intensity: Option<FlowIntensity>,
    /// Shown in history but ignored by averages and prediction.
    #[serde(default, alias = "exclude_from_stats")]
    pub excluded_from_stats: bool,
}

impl PeriodLog {
    /// Inclusive length in days.
    pub fn period_length_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn overlaps(&self, first: NaiveDate, last: NaiveDate) -> bool {
        self.start_date <= last && self.end_date >= first
    }
}

/// Input for a new period log, before it gets an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub flow_intensity: Option<FlowIntensity>,
    #[serde(default)]
    pub excluded_from_stats: bool,
}

/// Per-user cycle tunables. Missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CycleConfiguration {
    pub average_cycle_length: u32,
    pub average_period_length: u32,
    /// Only consulted when there is no usable period history.
    pub first_period_start_date: Option<NaiveDate>,
    pub uses_hormonal_contraceptives: bool,
    pub show_fertile_window: bool,
    pub irregular_cycle_mode: bool,
    pub pregnancy_mode: bool,
    pub lactation_mode: bool,
}

impl Default for CycleConfiguration {
    fn default() -> Self {
        Self {
            average_cycle_length: 28,
            average_period_length: 5,
            first_period_start_date: None,
            uses_hormonal_contraceptives: false,
            show_fertile_window: true,
            irregular_cycle_mode: false,
            pregnancy_mode: false,
            lactation_mode: false,
        }
    }
}

impl CycleConfiguration {
    /// Apply a partial update. Fields left as `None` keep their current value.
    ///
    /// `first_period_start_date` is doubly optional so callers can clear it:
    /// `Some(None)` removes the date, `None` leaves it alone.
    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        Self {
            average_cycle_length: update
                .average_cycle_length
                .unwrap_or(self.average_cycle_length),
            average_period_length: update
                .average_period_length
                .unwrap_or(self.average_period_length),
            first_period_start_date: update
                .first_period_start_date
                .unwrap_or(self.first_period_start_date),
            uses_hormonal_contraceptives: update
                .uses_hormonal_contraceptives
                .unwrap_or(self.uses_hormonal_contraceptives),
            show_fertile_window: update
                .show_fertile_window
                .unwrap_or(self.show_fertile_window),
            irregular_cycle_mode: update
                .irregular_cycle_mode
                .unwrap_or(self.irregular_cycle_mode),
            pregnancy_mode: update.pregnancy_mode.unwrap_or(self.pregnancy_mode),
            lactation_mode: update.lactation_mode.unwrap_or(self.lactation_mode),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub average_cycle_length: Option<u32>,
    pub average_period_length: Option<u32>,
    /// Absent leaves the date alone, `null` clears it.
    #[serde(
        default,
        deserialize_with = "present_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_period_start_date: Option<Option<NaiveDate>>,
    pub uses_hormonal_contraceptives: Option<bool>,
    pub show_fertile_window: Option<bool>,
    pub irregular_cycle_mode: Option<bool>,
    pub pregnancy_mode: Option<bool>,
    pub lactation_mode: Option<bool>,
}

/// Wraps any value that is present in the input, `null` included, in `Some`.
/// Absent fields never reach this and fall back to `default`.
fn present_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Which reminders the user wants, and how early.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReminderSettings {
    pub notify_period: bool,
    pub period_reminder_days_before: u32,
    pub notify_period_end: bool,
    pub notify_fertile_window: bool,
    pub notify_ovulation: bool,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            notify_period: true,
            period_reminder_days_before: 2,
            notify_period_end: false,
            notify_fertile_window: true,
            notify_ovulation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    PeriodSoon,
    PeriodEnd,
    FertileWindow,
    Ovulation,
}

/// A date on which the UI should remind the user of something.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    pub date: NaiveDate,
    pub kind: ReminderKind,
}

/// Where the snapshot's lengths came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredictionBasis {
    /// Two or more non-excluded logs; lengths are observed averages.
    History,
    /// One non-excluded log; lengths come from configuration.
    SingleLog,
    /// No usable logs; anchored on `first_period_start_date`.
    FirstPeriodSetting,
}

/// Forward-looking prediction for one (history, configuration, today) input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionSnapshot {
    pub cycle_day_today: u32,
    pub next_period_start: NaiveDate,
    pub next_period_end: NaiveDate,
    pub period_length_used: u32,
    pub cycle_length_used: u32,
    pub fertile_window_start: NaiveDate,
    pub fertile_window_end: NaiveDate,
    pub ovulation_day: NaiveDate,
    pub anchor_date: NaiveDate,
    pub basis: PredictionBasis,
    /// At least one projected onset passed without a new log.
    pub is_overdue: bool,
    pub skipped_cycles: u32,
    pub low_confidence: bool,
    pub irregular_cycle_mode: bool,
    pub pregnancy_mode: bool,
    pub lactation_mode: bool,
    pub show_fertile_window: bool,
    pub uses_hormonal_contraceptives: bool,
}

impl PredictionSnapshot {
    pub fn fertile_window_visible(&self) -> bool {
        self.show_fertile_window && !self.uses_hormonal_contraceptives
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStats {
    pub total_periods: usize,
    pub avg_cycle_length: Option<f32>,
    pub avg_period_length: Option<f32>,
    pub shortest_cycle: Option<i64>,
    pub longest_cycle: Option<i64>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleHistoryItem {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_length: i64,
    /// Days until the next logged start; `None` for the latest log.
    pub cycle_length: Option<i64>,
    pub excluded_from_stats: bool,
}

/// Everything persisted in the vault.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppData {
    #[serde(default)]
    pub periods: Vec<PeriodLog>,
    #[serde(default)]
    pub settings: CycleConfiguration,
    #[serde(default)]
    pub reminders: ReminderSettings,
}

/// Data returned to the UI for a month view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub periods: Vec<PeriodLog>,
    /// `None` while there is not enough data to predict.
    pub prediction: Option<PredictionSnapshot>,
    pub stats: CycleStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn period_length_is_inclusive() {
        let log = PeriodLog {
            id: Uuid::new_v4(),
            start_date: date("2024-01-01"),
            end_date: date("2024-01-05"),
            flow_intensity: Some(FlowIntensity::Medium),
            excluded_from_stats: false,
        };
        assert_eq!(log.period_length_days(), 5);
        assert!(log.overlaps(date("2024-01-05"), date("2024-01-31")));
        assert!(!log.overlaps(date("2024-01-06"), date("2024-01-31")));
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let current = CycleConfiguration {
            first_period_start_date: Some(date("2024-03-01")),
            ..CycleConfiguration::default()
        };
        let update = SettingsUpdate {
            average_cycle_length: Some(31),
            irregular_cycle_mode: Some(true),
            ..SettingsUpdate::default()
        };
        let merged = current.merged(&update);
        assert_eq!(merged.average_cycle_length, 31);
        assert_eq!(merged.average_period_length, 5);
        assert!(merged.irregular_cycle_mode);
        assert_eq!(merged.first_period_start_date, Some(date("2024-03-01")));
    }

    #[test]
    fn merge_can_clear_first_period_date() {
        let current = CycleConfiguration {
            first_period_start_date: Some(date("2024-03-01")),
            ..CycleConfiguration::default()
        };
        let update = SettingsUpdate {
            first_period_start_date: Some(None),
            ..SettingsUpdate::default()
        };
        assert_eq!(current.merged(&update).first_period_start_date, None);
    }

    #[test]
    fn json_null_clears_first_period_date() {
        let current = CycleConfiguration {
            first_period_start_date: Some(date("2024-03-01")),
            ..CycleConfiguration::default()
        };

        let clear: SettingsUpdate =
            serde_json::from_str(r#"{"first_period_start_date": null}"#).unwrap();
        assert_eq!(clear.first_period_start_date, Some(None));
        assert_eq!(current.merged(&clear).first_period_start_date, None);

        let untouched: SettingsUpdate =
            serde_json::from_str(r#"{"average_cycle_length": 30}"#).unwrap();
        assert_eq!(untouched.first_period_start_date, None);
        assert_eq!(
            current.merged(&untouched).first_period_start_date,
            Some(date("2024-03-01"))
        );

        let set: SettingsUpdate =
            serde_json::from_str(r#"{"first_period_start_date": "2024-04-02"}"#).unwrap();
        assert_eq!(set.first_period_start_date, Some(Some(date("2024-04-02"))));
    }

    #[test]
    fn reminder_settings_default_for_old_vaults() {
        let data: AppData = serde_json::from_str(r#"{"periods": []}"#).unwrap();
        assert_eq!(data.reminders, ReminderSettings::default());
        assert_eq!(data.reminders.period_reminder_days_before, 2);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let cfg: CycleConfiguration =
            serde_json::from_str(r#"{"average_cycle_length": 30}"#).unwrap();
        assert_eq!(cfg.average_cycle_length, 30);
        assert_eq!(cfg.average_period_length, 5);
        assert!(cfg.show_fertile_window);
    }

    #[test]
    fn period_log_accepts_legacy_exclusion_field() {
        let json = format!(
            r#"{{"id":"{}","start_date":"2024-01-01","end_date":"2024-01-04","flow_intensity":"heavy","exclude_from_stats":true}}"#,
            Uuid::new_v4()
        );
        let log: PeriodLog = serde_json::from_str(&json).unwrap();
        assert!(log.excluded_from_stats);
        assert_eq!(log.flow_intensity, Some(FlowIntensity::Heavy));
    }
}
