use chrono::{Duration, NaiveDate};

use crate::models::{NormalizedPoint, PeriodAggregate, SeverityBreakdown};

/// Half-open date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// The previous and current windows of `days` length ending at `end`.
///
/// `None` when either window would start outside the representable calendar.
pub fn trailing_windows(end: NaiveDate, days: i64) -> Option<(Window, Window)> {
    let length = Duration::try_days(days.max(1))?;
    let current = Window {
        start: end.checked_sub_signed(length)?,
        end,
    };
    let previous = Window {
        start: current.start.checked_sub_signed(length)?,
        end: current.start,
    };
    Some((previous, current))
}

/// Explicit `fail_rate` wins; otherwise derive it from pass/fail counts.
pub fn point_fail_rate(point: &NormalizedPoint) -> Option<f64> {
    point.fail_rate.or_else(|| {
        let pass = point.pass_count?;
        let total = point.fail_count.saturating_add(pass);
        (total > 0).then(|| point.fail_count as f64 / total as f64 * 100.0)
    })
}

pub fn aggregate_window(
    points: &[NormalizedPoint],
    label: impl Into<String>,
    window: Window,
) -> PeriodAggregate {
    let in_window: Vec<&NormalizedPoint> =
        points.iter().filter(|p| window.contains(p.period)).collect();

    let total_fail_count = in_window
        .iter()
        .fold(0u64, |acc, p| acc.saturating_add(p.fail_count));
    let rates: Vec<f64> = in_window.iter().filter_map(|p| point_fail_rate(p)).collect();
    let avg_fail_rate = if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    };

    PeriodAggregate {
        label: label.into(),
        total_fail_count,
        avg_fail_rate,
        start: Some(window.start),
        end: Some(window.end),
    }
}

pub fn severity_totals(points: &[NormalizedPoint]) -> SeverityBreakdown {
    points
        .iter()
        .filter_map(|p| p.by_severity)
        .fold(SeverityBreakdown::default(), |acc, s| SeverityBreakdown {
            critical: acc.critical.saturating_add(s.critical),
            high: acc.high.saturating_add(s.high),
            medium: acc.medium.saturating_add(s.medium),
            low: acc.low.saturating_add(s.low),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_point(period: NaiveDate, fail_count: u64) -> NormalizedPoint {
        NormalizedPoint {
            period,
            fail_count,
            pass_count: None,
            fail_rate: None,
            by_severity: None,
        }
    }

    #[test]
    fn trailing_windows_are_adjacent() {
        let (previous, current) = trailing_windows(date(2024, 3, 1), 7).unwrap();
        assert_eq!(current.start, date(2024, 2, 23));
        assert_eq!(current.end, date(2024, 3, 1));
        assert_eq!(previous.start, date(2024, 2, 16));
        assert_eq!(previous.end, current.start);
    }

    #[test]
    fn window_length_is_at_least_one_day() {
        let (_, current) = trailing_windows(date(2024, 3, 1), 0).unwrap();
        assert_eq!(current.start, date(2024, 2, 29));
    }

    #[test]
    fn out_of_calendar_windows_are_none() {
        assert_eq!(trailing_windows(date(2024, 1, 1), 100_000_000), None);
        assert_eq!(trailing_windows(date(2024, 1, 1), i64::MAX), None);
        assert_eq!(trailing_windows(NaiveDate::MIN, 1), None);
    }

    #[test]
    fn huge_counts_saturate() {
        let mut a = sample_point(date(2024, 1, 1), u64::MAX);
        a.pass_count = Some(1);
        a.by_severity = Some(SeverityBreakdown {
            critical: u64::MAX,
            high: 1,
            medium: 0,
            low: 0,
        });
        let mut b = sample_point(date(2024, 1, 2), 5);
        b.by_severity = a.by_severity;
        let window = Window {
            start: date(2024, 1, 1),
            end: date(2024, 2, 1),
        };

        let aggregate = aggregate_window(&[a.clone(), b.clone()], "jan", window);
        assert_eq!(aggregate.total_fail_count, u64::MAX);
        assert!(point_fail_rate(&a).is_some());

        let totals = severity_totals(&[a, b]);
        assert_eq!(totals.critical, u64::MAX);
        assert_eq!(totals.high, 2);
        assert_eq!(totals.total(), u64::MAX);
    }

    #[test]
    fn aggregates_only_points_inside_window() {
        let points = vec![
            sample_point(date(2024, 1, 1), 5),
            sample_point(date(2024, 1, 5), 7),
            sample_point(date(2024, 1, 8), 100),
        ];
        let window = Window {
            start: date(2024, 1, 1),
            end: date(2024, 1, 8),
        };

        let aggregate = aggregate_window(&points, "week 1", window);
        assert_eq!(aggregate.total_fail_count, 12);
        assert_eq!(aggregate.label, "week 1");
        assert_eq!(aggregate.start, Some(window.start));
    }

    #[test]
    fn fail_rate_prefers_explicit_then_derives() {
        let mut explicit = sample_point(date(2024, 1, 1), 10);
        explicit.fail_rate = Some(4.0);
        explicit.pass_count = Some(10);
        assert_eq!(point_fail_rate(&explicit), Some(4.0));

        let mut derived = sample_point(date(2024, 1, 2), 5);
        derived.pass_count = Some(15);
        assert_eq!(point_fail_rate(&derived), Some(25.0));

        assert_eq!(point_fail_rate(&sample_point(date(2024, 1, 3), 5)), None);
    }

    #[test]
    fn average_skips_points_without_rate() {
        let mut a = sample_point(date(2024, 1, 1), 1);
        a.fail_rate = Some(2.0);
        let mut b = sample_point(date(2024, 1, 2), 1);
        b.fail_rate = Some(6.0);
        let c = sample_point(date(2024, 1, 3), 1);
        let window = Window {
            start: date(2024, 1, 1),
            end: date(2024, 2, 1),
        };

        let aggregate = aggregate_window(&[a, b, c], "jan", window);
        assert!((aggregate.avg_fail_rate - 4.0).abs() < 0.001);
    }

    #[test]
    fn severity_totals_sum_buckets() {
        let mut a = sample_point(date(2024, 1, 1), 6);
        a.by_severity = Some(SeverityBreakdown {
            critical: 1,
            high: 2,
            medium: 3,
            low: 0,
        });
        let mut b = sample_point(date(2024, 1, 2), 4);
        b.by_severity = Some(SeverityBreakdown {
            critical: 0,
            high: 1,
            medium: 1,
            low: 2,
        });
        let c = sample_point(date(2024, 1, 3), 9);

        let totals = severity_totals(&[a, b, c]);
        assert_eq!(totals.critical, 1);
        assert_eq!(totals.high, 3);
        assert_eq!(totals.medium, 4);
        assert_eq!(totals.low, 2);
        assert_eq!(totals.total(), 10);
    }
}
