use chrono::{Duration, NaiveDate};

use crate::models::{PredictionSnapshot, Reminder, ReminderKind, ReminderSettings};

/// Longest lead time accepted for the "period soon" reminder.
pub const MAX_DAYS_BEFORE: u32 = 14;

/// Reminder dates implied by a snapshot, ordered by date.
///
/// Fertility reminders follow the same gate as the calendar: nothing is
/// produced while the fertile window is hidden or contraceptives are in use.
pub fn reminders(snapshot: &PredictionSnapshot, settings: &ReminderSettings) -> Vec<Reminder> {
    let mut out = Vec::new();

    if settings.notify_period {
        let days_before = settings.period_reminder_days_before.min(MAX_DAYS_BEFORE);
        let lead = Duration::days(i64::from(days_before));
        if let Some(date) = snapshot.next_period_start.checked_sub_signed(lead) {
            out.push(Reminder {
                date,
                kind: ReminderKind::PeriodSoon,
            });
        }
    }
    if settings.notify_period_end {
        out.push(Reminder {
            date: snapshot.next_period_end,
            kind: ReminderKind::PeriodEnd,
        });
    }
    if snapshot.fertile_window_visible() {
        if settings.notify_fertile_window {
            out.push(Reminder {
                date: snapshot.fertile_window_start,
                kind: ReminderKind::FertileWindow,
            });
        }
        if settings.notify_ovulation {
            out.push(Reminder {
                date: snapshot.ovulation_day,
                kind: ReminderKind::Ovulation,
            });
        }
    }

    out.sort_by_key(|r| (r.date, r.kind));
    out
}

/// Reminders due today or later.
pub fn upcoming(
    snapshot: &PredictionSnapshot,
    settings: &ReminderSettings,
    today: NaiveDate,
) -> Vec<Reminder> {
    reminders(snapshot, settings)
        .into_iter()
        .filter(|r| r.date >= today)
        .collect()
}
