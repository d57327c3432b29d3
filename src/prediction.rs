use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::models::{
    CycleConfiguration, CycleHistoryItem, CycleStats, PeriodLog, PredictionBasis,
    PredictionSnapshot,
};
use crate::storage::{PeriodStore, SettingsStore};

pub const MIN_CYCLE_LENGTH: u32 = 15;
pub const MAX_CYCLE_LENGTH: u32 = 60;
pub const MIN_PERIOD_LENGTH: u32 = 2;
pub const MAX_PERIOD_LENGTH: u32 = 15;
/// Most recent non-excluded logs that feed the observed averages.
pub const STATS_WINDOW: usize = 6;
/// Ovulation is placed this many days before the next onset, whatever the
/// cycle length. Standard luteal-phase approximation.
pub const LUTEAL_PHASE_DAYS: i64 = 14;
const FERTILE_DAYS_BEFORE_OVULATION: i64 = 5;
const FERTILE_DAYS_AFTER_OVULATION: i64 = 1;
const IRREGULAR_WIDENING_DAYS: i64 = 2;
/// A period due yesterday is still reported as the next one.
const GRACE_DAYS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    #[error("{field} must be between {min} and {max} days, got {value}")]
    Configuration {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("not enough data yet: log a period or set a first period start date")]
    InsufficientData,
    #[error("projection from {0} leaves the supported calendar range")]
    DateOutOfRange(NaiveDate),
}

/// Reject tunables outside their documented domains.
pub fn validate_configuration(config: &CycleConfiguration) -> Result<(), PredictionError> {
    check_range(
        "average_cycle_length",
        config.average_cycle_length,
        MIN_CYCLE_LENGTH,
        MAX_CYCLE_LENGTH,
    )?;
    check_range(
        "average_period_length",
        config.average_period_length,
        MIN_PERIOD_LENGTH,
        MAX_PERIOD_LENGTH,
    )
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), PredictionError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PredictionError::Configuration {
            field,
            value,
            min,
            max,
        })
    }
}

/// Compute the prediction snapshot for a history, a configuration and a date.
///
/// Pure: the result depends only on the non-excluded logs (in any input
/// order), the configuration and `today`.
///
/// Anchor is the latest non-excluded start, or `first_period_start_date` when
/// there is none. Cycle and period lengths are observed averages over the last
/// [`STATS_WINDOW`] logs once at least two exist, configured averages otherwise.
/// The next onset is the first `anchor + k * cycle` (k >= 1) on or after
/// yesterday; skipping past any projected onset marks the snapshot overdue.
/// Ovulation sits [`LUTEAL_PHASE_DAYS`] before that onset and the fertile
/// window runs from five days before ovulation to the day after, never
/// starting before the anchor.
pub fn predict(
    logs: &[PeriodLog],
    config: &CycleConfiguration,
    today: NaiveDate,
) -> Result<PredictionSnapshot, PredictionError> {
    validate_configuration(config)?;

    let history = included_history(logs);

    let (anchor_date, basis) = match history.last() {
        Some(latest) if history.len() >= 2 => (latest.start_date, PredictionBasis::History),
        Some(latest) => (latest.start_date, PredictionBasis::SingleLog),
        None => {
            let first = config
                .first_period_start_date
                .ok_or(PredictionError::InsufficientData)?;
            debug!("no usable period logs, anchoring on first period start date");
            (first, PredictionBasis::FirstPeriodSetting)
        }
    };

    let (cycle_length_used, period_length_used) = match observed_lengths(&history) {
        Some(lengths) => lengths,
        None => {
            debug!("fewer than two usable period logs, using configured averages");
            (config.average_cycle_length, config.average_period_length)
        }
    };
    let cycle = i64::from(cycle_length_used);

    let (next_period_start, skipped_cycles) = project_next_onset(anchor_date, cycle, today)?;
    if skipped_cycles > 0 {
        info!(skipped_cycles, "projected period passed without a new log");
    }
    let next_period_end = shift(next_period_start, i64::from(period_length_used) - 1)?;

    let current_cycle_start = if next_period_start > today {
        shift(next_period_start, -cycle)?
    } else {
        next_period_start
    };
    let cycle_day_today = (today - current_cycle_start).num_days().rem_euclid(cycle) as u32 + 1;

    let ovulation_day = shift(next_period_start, -LUTEAL_PHASE_DAYS)?;
    let widening = if config.irregular_cycle_mode {
        IRREGULAR_WIDENING_DAYS
    } else {
        0
    };
    let fertile_window_start =
        shift(ovulation_day, -(FERTILE_DAYS_BEFORE_OVULATION + widening))?.max(anchor_date);
    let fertile_window_end = shift(ovulation_day, FERTILE_DAYS_AFTER_OVULATION + widening)?;

    let low_confidence = config.irregular_cycle_mode
        || config.pregnancy_mode
        || config.lactation_mode
        || basis != PredictionBasis::History;

    Ok(PredictionSnapshot {
        cycle_day_today,
        next_period_start,
        next_period_end,
        period_length_used,
        cycle_length_used,
        fertile_window_start,
        fertile_window_end,
        ovulation_day,
        anchor_date,
        basis,
        is_overdue: skipped_cycles > 0,
        skipped_cycles,
        low_confidence,
        irregular_cycle_mode: config.irregular_cycle_mode,
        pregnancy_mode: config.pregnancy_mode,
        lactation_mode: config.lactation_mode,
        show_fertile_window: config.show_fertile_window,
        uses_hormonal_contraceptives: config.uses_hormonal_contraceptives,
    })
}

/// Predict straight from the period and settings collaborators.
pub fn predict_from<S>(store: &S, today: NaiveDate) -> Result<PredictionSnapshot, PredictionError>
where
    S: PeriodStore + SettingsStore,
{
    predict(&store.period_logs(), &store.cycle_configuration(), today)
}

/// Compute cycle statistics for the stats view. Excluded logs are ignored.
pub fn cycle_stats(logs: &[PeriodLog]) -> CycleStats {
    let history = included_history(logs);

    let Some(last) = history.last() else {
        return CycleStats {
            total_periods: 0,
            avg_cycle_length: None,
            avg_period_length: None,
            shortest_cycle: None,
            longest_cycle: None,
            last_period_start: None,
            last_period_end: None,
        };
    };

    let period_lengths: Vec<f64> = history
        .iter()
        .map(|log| log.period_length_days() as f64)
        .collect();

    let cycle_lengths: Vec<i64> = history
        .windows(2)
        .map(|w| (w[1].start_date - w[0].start_date).num_days())
        .collect();

    CycleStats {
        total_periods: history.len(),
        avg_cycle_length: if cycle_lengths.is_empty() {
            None
        } else {
            Some(cycle_lengths.iter().sum::<i64>() as f32 / cycle_lengths.len() as f32)
        },
        avg_period_length: Some(mean(&period_lengths) as f32),
        shortest_cycle: cycle_lengths.iter().copied().min(),
        longest_cycle: cycle_lengths.iter().copied().max(),
        last_period_start: Some(last.start_date),
        last_period_end: Some(last.end_date),
    }
}

/// Every log, excluded ones included, with the gap to the following start.
pub fn cycle_history(logs: &[PeriodLog]) -> Vec<CycleHistoryItem> {
    let mut sorted: Vec<&PeriodLog> = logs.iter().collect();
    sorted.sort_by_key(|log| (log.start_date, log.end_date));

    sorted
        .iter()
        .enumerate()
        .map(|(idx, log)| CycleHistoryItem {
            id: log.id,
            start_date: log.start_date,
            end_date: log.end_date,
            period_length: log.period_length_days(),
            cycle_length: sorted
                .get(idx + 1)
                .map(|next| (next.start_date - log.start_date).num_days()),
            excluded_from_stats: log.excluded_from_stats,
        })
        .collect()
}

/// Non-excluded logs, oldest first.
fn included_history(logs: &[PeriodLog]) -> Vec<&PeriodLog> {
    let mut included: Vec<&PeriodLog> = logs.iter().filter(|l| !l.excluded_from_stats).collect();
    included.sort_by_key(|log| (log.start_date, log.end_date));
    included
}

/// Observed (cycle, period) lengths over the recent window, or `None` when
/// there is no start-to-start gap to measure.
fn observed_lengths(history: &[&PeriodLog]) -> Option<(u32, u32)> {
    if history.len() < 2 {
        return None;
    }

    let recent = &history[history.len().saturating_sub(STATS_WINDOW)..];

    let gaps: Vec<f64> = recent
        .windows(2)
        .map(|w| (w[1].start_date - w[0].start_date).num_days() as f64)
        .collect();
    let period_lengths: Vec<f64> = recent
        .iter()
        .map(|log| log.period_length_days() as f64)
        .collect();

    Some((
        round_clamped(mean(&gaps), MIN_CYCLE_LENGTH, MAX_CYCLE_LENGTH),
        round_clamped(mean(&period_lengths), MIN_PERIOD_LENGTH, MAX_PERIOD_LENGTH),
    ))
}

/// First `anchor + k * cycle_length` (k >= 1) that is not before yesterday,
/// together with the number of projected onsets skipped to get there.
fn project_next_onset(
    anchor: NaiveDate,
    cycle_length: i64,
    today: NaiveDate,
) -> Result<(NaiveDate, u32), PredictionError> {
    let earliest = shift(today, -GRACE_DAYS)?;
    let first = shift(anchor, cycle_length)?;

    if first >= earliest {
        return Ok((first, 0));
    }

    let behind = (earliest - first).num_days();
    let skipped = (behind + cycle_length - 1) / cycle_length;
    Ok((shift(first, skipped * cycle_length)?, skipped as u32))
}

fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, PredictionError> {
    date.checked_add_signed(Duration::days(days))
        .ok_or(PredictionError::DateOutOfRange(date))
}

fn round_clamped(value: f64, min: u32, max: u32) -> u32 {
    value.round().clamp(f64::from(min), f64::from(max)) as u32
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
