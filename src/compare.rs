use std::cmp::Ordering;

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{DeltaTrend, PeriodAggregate, PeriodDelta};

/// Period-over-period delta. More fails in `period2` is worsening.
///
/// Fails only when the windows are known to overlap or run backwards; zero
/// totals are a valid state and produce an "N/A" or zero percentage.
pub fn compare(period1: &PeriodAggregate, period2: &PeriodAggregate) -> PipelineResult<PeriodDelta> {
    ensure_ordered(period1, period2)?;

    let before = period1.total_fail_count;
    let after = period2.total_fail_count;
    let change = i128::from(after) - i128::from(before);
    let fail_count_change =
        i64::try_from(change).unwrap_or(if change > 0 { i64::MAX } else { i64::MIN });

    let percent_change = if before == 0 {
        (after == 0).then_some(0.0)
    } else {
        Some(change as f64 * 100.0 / before as f64)
    };

    let trend = match after.cmp(&before) {
        Ordering::Greater => DeltaTrend::Worsening,
        Ordering::Less => DeltaTrend::Improving,
        Ordering::Equal => DeltaTrend::Unchanged,
    };

    debug!(
        first = %period1.label,
        second = %period2.label,
        fail_count_change,
        ?trend,
        "compared periods"
    );

    Ok(PeriodDelta {
        fail_count_change,
        percent_change,
        fail_rate_change: period2.avg_fail_rate - period1.avg_fail_rate,
        trend,
    })
}

/// Compare possibly-missing aggregates; a missing side is insufficient data.
pub fn compare_optional(
    period1: Option<&PeriodAggregate>,
    period2: Option<&PeriodAggregate>,
) -> PipelineResult<PeriodDelta> {
    match (period1, period2) {
        (Some(first), Some(second)) => compare(first, second),
        (None, None) => Err(PipelineError::InsufficientData(
            "both periods are missing".to_string(),
        )),
        (None, Some(second)) => Err(PipelineError::InsufficientData(format!(
            "no period to compare '{}' against",
            second.label
        ))),
        (Some(first), None) => Err(PipelineError::InsufficientData(format!(
            "no period to compare '{}' with",
            first.label
        ))),
    }
}

fn ensure_ordered(period1: &PeriodAggregate, period2: &PeriodAggregate) -> PipelineResult<()> {
    let overlaps = matches!((period1.end, period2.start), (Some(end), Some(start)) if start < end);
    let reversed =
        matches!((period1.start, period2.start), (Some(first), Some(second)) if second < first);

    if overlaps || reversed {
        return Err(PipelineError::IncomparablePeriods {
            first: period1.label.clone(),
            second: period2.label.clone(),
        });
    }
    Ok(())
}
