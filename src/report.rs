use std::fmt::Write;

use chrono::NaiveDate;

use crate::error::PipelineResult;
use crate::models::{
    AssembledPrediction, DeltaTrend, KeyDate, MergedSeries, PeriodAggregate, PeriodDelta,
    SeverityBreakdown, TrendDescriptor, TrendDirection,
};

pub struct ReportInput<'a> {
    pub scope: Option<&'a str>,
    pub window_days: i64,
    pub end: NaiveDate,
    pub previous: &'a PeriodAggregate,
    pub current: &'a PeriodAggregate,
    pub delta: &'a PipelineResult<PeriodDelta>,
    pub severity: SeverityBreakdown,
    pub trend: TrendDescriptor,
    pub series: &'a MergedSeries,
    pub prediction: Option<&'a AssembledPrediction>,
}

pub fn verdict(trend: DeltaTrend) -> &'static str {
    match trend {
        DeltaTrend::Worsening => "worsening",
        DeltaTrend::Improving => "improving",
        DeltaTrend::Unchanged => "unchanged",
    }
}

pub fn direction_label(trend: &TrendDescriptor) -> String {
    let direction = match trend.direction {
        TrendDirection::Increasing => "increasing",
        TrendDirection::Decreasing => "decreasing",
        TrendDirection::Stable => "stable",
    };
    match trend.magnitude_percent {
        Some(percent) => format!("{direction} ({percent:+.1}%)"),
        None => format!("{direction} (N/A)"),
    }
}

fn key_date_label(date: &Option<KeyDate>) -> String {
    match date {
        Some(KeyDate::DateTime(dt)) => dt.to_rfc3339(),
        Some(KeyDate::Naive(dt)) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        Some(KeyDate::Date(d)) => d.to_string(),
        None => "not estimated".to_string(),
    }
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();
    let scope_label = input.scope.unwrap_or("all migrations");

    let _ = writeln!(output, "# Migration Quality Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}-day windows ending {})",
        scope_label, input.window_days, input.end
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Period Comparison");

    match input.delta {
        Ok(delta) => {
            for period in [input.previous, input.current] {
                let _ = writeln!(
                    output,
                    "- {}: {} fails (avg fail rate {:.1}%)",
                    period.label, period.total_fail_count, period.avg_fail_rate
                );
            }
            let _ = writeln!(
                output,
                "- Change: {:+} fails ({}), {}",
                delta.fail_count_change,
                delta.percent_label(),
                verdict(delta.trend)
            );
        }
        Err(err) => {
            let _ = writeln!(output, "Cannot compare periods: {err}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Severity Mix");

    if input.severity.total() == 0 {
        let _ = writeln!(output, "No severity breakdown recorded for this window.");
    } else {
        let s = input.severity;
        let _ = writeln!(output, "- critical: {}", s.critical);
        let _ = writeln!(output, "- high: {}", s.high);
        let _ = writeln!(output, "- medium: {}", s.medium);
        let _ = writeln!(output, "- low: {}", s.low);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");
    let _ = writeln!(output, "Fail counts are {}.", direction_label(&input.trend));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Forecast");

    match input.prediction {
        Some(prediction) => {
            if let Some(trend) = &prediction.forecast_trend {
                let _ = writeln!(output, "Forecast is {}.", direction_label(trend));
            }
            let _ = writeln!(
                output,
                "- Critical date: {}",
                key_date_label(&prediction.key_dates.critical_date)
            );
            let _ = writeln!(
                output,
                "- Resolution date: {}",
                key_date_label(&prediction.key_dates.resolution_date)
            );
            for insight in &prediction.insights {
                let _ = writeln!(output, "- Insight: {insight}");
            }
            for recommendation in &prediction.recommendations {
                let _ = writeln!(output, "- Recommendation: {recommendation}");
            }
        }
        None => {
            let _ = writeln!(output, "No forecast available.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Series");

    if input.series.is_empty() {
        let _ = writeln!(output, "No data for this window.");
    } else {
        let _ = writeln!(output, "| period | actual | predicted |");
        let _ = writeln!(output, "|---|---|---|");
        for point in &input.series.points {
            let actual = point.actual.map(|v| v.to_string()).unwrap_or_default();
            let predicted = point
                .predicted
                .map(|v| format!("{v:.1}"))
                .unwrap_or_default();
            let _ = writeln!(output, "| {} | {} | {} |", point.period, actual, predicted);
        }
    }

    if !input.series.rejected.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Dropped Points");
        for err in &input.series.rejected {
            let _ = writeln!(output, "- {err}");
        }
    }

    output
}
