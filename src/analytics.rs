// src/analytics.rs

//! Statistics derived from the reading log. Nothing here is stored; every
//! value is recomputed from the log and target on each call.

use crate::models::{KhatamTarget, ReadingLogEntry};
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KhatamAnalytics {
    pub avg_pages_per_day: f64,
    pub total_days_active: i64,
    pub estimated_days_left: i64,
    pub estimated_completion_date: DateTime<Utc>,
    pub total_pages_read: u64,
    pub streak: u32,
}

/// Pace and projection for `target`, counting only log entries on or after
/// the day the target was started.
pub fn calculate_khatam_analytics(
    target: &KhatamTarget,
    log: &[ReadingLogEntry],
    now: DateTime<Utc>,
) -> KhatamAnalytics {
    let elapsed_ms = (now - target.start_date).num_milliseconds();
    let total_days_active = ceil_div(elapsed_ms, DAY_MS).max(1);

    let start_day = target.start_date.with_timezone(&Local).date_naive();
    let total_pages_read: u64 = log
        .iter()
        .filter(|e| e.date >= start_day)
        .map(|e| u64::from(e.pages_read))
        .sum();

    let mut avg_pages_per_day = total_pages_read as f64 / total_days_active as f64;
    if avg_pages_per_day == 0.0 {
        avg_pages_per_day = 1.0;
    }

    let remaining = f64::from(target.remaining_pages());
    let estimated_days_left = (remaining / avg_pages_per_day).ceil() as i64;

    KhatamAnalytics {
        avg_pages_per_day,
        total_days_active,
        estimated_days_left,
        estimated_completion_date: now + Duration::days(estimated_days_left),
        total_pages_read,
        streak: calculate_streak(log, now.with_timezone(&Local).date_naive()),
    }
}

fn ceil_div(n: i64, d: i64) -> i64 {
    let q = n / d;
    if n % d > 0 {
        q + 1
    } else {
        q
    }
}

/// Consecutive reading days ending at the most recent log entry.
///
/// The streak is 0 unless that entry is from `today` or the day before.
/// Walking back from it, any entry at most one day before the previous one
/// continues the walk; only entries with pages read add to the count. A gap
/// of more than one day ends it.
///
/// A zero-page entry still moves the cursor to its date, so it bridges the
/// days on either side without counting itself.
pub fn calculate_streak(log: &[ReadingLogEntry], today: NaiveDate) -> u32 {
    let mut sorted: Vec<&ReadingLogEntry> = log.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    let Some(latest) = sorted.first() else {
        return 0;
    };
    let yesterday = today - Duration::days(1);
    if latest.date != today && latest.date != yesterday {
        return 0;
    }

    let mut streak = 0;
    let mut cursor = latest.date;
    for entry in sorted {
        let gap = (cursor - entry.date).num_days();
        if gap > 1 {
            break;
        }
        if entry.pages_read > 0 {
            streak += 1;
        }
        cursor = entry.date;
    }
    streak
}

/// One day of the reading heatmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapCell {
    pub date: NaiveDate,
    pub pages_read: u32,
    /// 0 (nothing) to 4 (heaviest).
    pub level: u8,
}

pub fn intensity(pages_read: u32) -> u8 {
    match pages_read {
        0 => 0,
        1..=4 => 1,
        5..=9 => 2,
        10..=19 => 3,
        _ => 4,
    }
}

/// A cell for every day in `from..=to`, including days with no entry.
pub fn heatmap(log: &[ReadingLogEntry], from: NaiveDate, to: NaiveDate) -> Vec<HeatmapCell> {
    let by_day: HashMap<NaiveDate, u32> = log.iter().map(|e| (e.date, e.pages_read)).collect();
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|date| {
            let pages_read = by_day.get(&date).copied().unwrap_or(0);
            HeatmapCell {
                date,
                pages_read,
                level: intensity(pages_read),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn ceil_div_rounds_up_positive_only() {
        assert_eq!(ceil_div(10 * DAY_MS, DAY_MS), 10);
        assert_eq!(ceil_div(10 * DAY_MS + 1, DAY_MS), 11);
        assert_eq!(ceil_div(0, DAY_MS), 0);
        assert_eq!(ceil_div(-5, DAY_MS), 0);
    }

    #[test]
    fn empty_log_has_no_streak() {
        assert_eq!(calculate_streak(&[], day(2025, 1, 1)), 0);
    }

    #[test]
    fn zero_page_entry_keeps_walk_alive_without_counting() {
        let today = day(2025, 3, 10);
        let log = vec![
            ReadingLogEntry::new(day(2025, 3, 10), 2),
            ReadingLogEntry::new(day(2025, 3, 9), 0),
            ReadingLogEntry::new(day(2025, 3, 8), 5),
        ];
        assert_eq!(calculate_streak(&log, today), 2);
    }

    #[test]
    fn huge_daily_counts_do_not_overflow_total() {
        let now = Utc::now();
        let target = KhatamTarget::new("amina".into(), 1, now - Duration::days(2));
        let today = now.with_timezone(&Local).date_naive();
        let log = vec![
            ReadingLogEntry::new(today, u32::MAX),
            ReadingLogEntry::new(today - Duration::days(1), 1),
        ];

        let stats = calculate_khatam_analytics(&target, &log, now);
        assert_eq!(stats.total_pages_read, u64::from(u32::MAX) + 1);
        assert_eq!(stats.estimated_days_left, 1);
    }

    #[test]
    fn heatmap_fills_missing_days() {
        let log = vec![
            ReadingLogEntry::new(day(2025, 2, 27), 3),
            ReadingLogEntry::new(day(2025, 3, 1), 25),
        ];
        let cells = heatmap(&log, day(2025, 2, 27), day(2025, 3, 2));
        let levels: Vec<_> = cells.iter().map(|c| (c.pages_read, c.level)).collect();
        assert_eq!(levels, vec![(3, 1), (0, 0), (25, 4), (0, 0)]);
        assert_eq!(cells[1].date, day(2025, 2, 28));
    }

    #[test]
    fn heatmap_with_inverted_range_is_empty() {
        assert!(heatmap(&[], day(2025, 3, 2), day(2025, 3, 1)).is_empty());
    }

    #[test]
    fn intensity_bands() {
        assert_eq!(intensity(0), 0);
        assert_eq!(intensity(4), 1);
        assert_eq!(intensity(5), 2);
        assert_eq!(intensity(19), 3);
        assert_eq!(intensity(20), 4);
    }
}
