use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::{PipelineError, PipelineResult, SeriesKind};
use crate::models::{
    NormalizedPoint, NormalizedPrediction, PredictionPoint, RawPeriod, SparkInput, SparkPoint,
    TimeSeriesPoint,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Survivors of a series-level normalization plus the points that were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub points: Vec<T>,
    pub rejected: Vec<PipelineError>,
}

/// Reduce a period to its calendar date. Date-time strings are truncated at
/// the `T` separator without timezone conversion.
pub fn normalize_period(raw: &RawPeriod) -> Result<NaiveDate, String> {
    match raw {
        RawPeriod::Text(text) => {
            let text = text.trim();
            let date_part = match text.split_once('T') {
                Some((date, _)) => {
                    if !is_date_time(text) {
                        return Err(format!("unparsable date-time '{text}'"));
                    }
                    date
                }
                None => text,
            };
            NaiveDate::parse_from_str(date_part, DATE_FORMAT)
                .map_err(|e| format!("unparsable date '{text}': {e}"))
        }
        RawPeriod::Timestamp(millis) => DateTime::<Utc>::from_timestamp_millis(*millis)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| format!("timestamp {millis} out of range")),
        RawPeriod::Other(value) => Err(format!("unsupported period value {value}")),
    }
}

fn is_date_time(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M").is_ok()
}

pub fn normalize(point: &TimeSeriesPoint, index: usize) -> PipelineResult<NormalizedPoint> {
    let series = SeriesKind::Historical;
    let period =
        normalize_period(&point.period).map_err(|e| PipelineError::malformed(series, index, e))?;

    if let Some(rate) = point.fail_rate {
        if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
            return Err(PipelineError::malformed(
                series,
                index,
                format!("fail_rate {rate} outside [0, 100]"),
            ));
        }
    }

    Ok(NormalizedPoint {
        period,
        fail_count: point.fail_count,
        pass_count: point.pass_count,
        fail_rate: point.fail_rate,
        by_severity: point.by_severity,
    })
}

pub fn normalize_prediction(
    point: &PredictionPoint,
    index: usize,
) -> PipelineResult<NormalizedPrediction> {
    let series = SeriesKind::Predicted;
    let reject = |reason: String| PipelineError::malformed(series, index, reason);
    let period = normalize_period(&point.period).map_err(reject)?;

    let value = point.predicted_fail_count;
    if !value.is_finite() || value < 0.0 {
        return Err(reject(format!("predicted_fail_count {value} is not a non-negative number")));
    }
    let confidence = point.confidence;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(reject(format!("confidence {confidence} outside [0, 1]")));
    }
    if let Some(range) = point.range {
        if !(range.low <= value && value <= range.high) {
            return Err(reject(format!(
                "range [{}, {}] does not contain {value}",
                range.low, range.high
            )));
        }
    }

    Ok(NormalizedPrediction {
        period,
        predicted_fail_count: value,
        confidence,
        range: point.range,
    })
}

fn normalize_all<I, T>(
    items: &[I],
    series: SeriesKind,
    normalize_one: impl Fn(&I, usize) -> PipelineResult<T>,
    period_of: impl Fn(&T) -> NaiveDate,
) -> Normalized<T> {
    let mut seen = HashSet::new();
    let mut points = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let outcome = normalize_one(item, index).and_then(|point| {
            let period = period_of(&point);
            if seen.insert(period) {
                Ok(point)
            } else {
                Err(PipelineError::malformed(
                    series,
                    index,
                    format!("duplicate period {period}"),
                ))
            }
        });

        match outcome {
            Ok(point) => points.push(point),
            Err(err) => {
                warn!(%series, index, error = %err, "dropping point");
                rejected.push(err);
            }
        }
    }

    Normalized { points, rejected }
}

/// Normalize a historical series, dropping malformed or duplicate points.
pub fn normalize_series(points: &[TimeSeriesPoint]) -> Normalized<NormalizedPoint> {
    normalize_all(points, SeriesKind::Historical, normalize, |p| p.period)
}

pub fn normalize_predictions(points: &[PredictionPoint]) -> Normalized<NormalizedPrediction> {
    normalize_all(points, SeriesKind::Predicted, normalize_prediction, |p| {
        p.period
    })
}

/// Map mixed sparkline input onto one point shape. `index` is the position in
/// the input, so gaps show where a value was dropped.
pub fn normalize_spark(inputs: &[SparkInput]) -> Normalized<SparkPoint> {
    let mut points = Vec::with_capacity(inputs.len());
    let mut rejected = Vec::new();

    for (index, input) in inputs.iter().enumerate() {
        let value = match input {
            SparkInput::Number(n) => Some(*n),
            SparkInput::Record(record) => record
                .value
                .or_else(|| record.fail_count.map(|count| count as f64)),
        };

        match value {
            Some(value) if value.is_finite() => points.push(SparkPoint { index, value }),
            Some(value) => rejected.push(PipelineError::malformed(
                SeriesKind::Sparkline,
                index,
                format!("value {value} is not finite"),
            )),
            None => rejected.push(PipelineError::malformed(
                SeriesKind::Sparkline,
                index,
                "record has neither value nor fail_count",
            )),
        }
    }

    Normalized { points, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredictionRange, SparkRecord};

    fn point(period: &str, fail_count: u64) -> TimeSeriesPoint {
        TimeSeriesPoint {
            period: period.into(),
            fail_count,
            pass_count: None,
            fail_rate: None,
            by_severity: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn truncates_date_time_to_date() {
        let raw = RawPeriod::from("2024-01-01T00:00:00Z");
        assert_eq!(normalize_period(&raw).unwrap(), date(2024, 1, 1));
    }

    #[test]
    fn truncation_keeps_written_date_regardless_of_offset() {
        let raw = RawPeriod::from("2024-01-01T23:30:00-05:00");
        assert_eq!(normalize_period(&raw).unwrap(), date(2024, 1, 1));
    }

    #[test]
    fn accepts_naive_date_time() {
        let raw = RawPeriod::from("2024-02-29T12:00:00");
        assert_eq!(normalize_period(&raw).unwrap(), date(2024, 2, 29));
    }

    #[test]
    fn plain_date_passes_through() {
        assert_eq!(
            normalize_period(&RawPeriod::from("2024-03-15")).unwrap(),
            date(2024, 3, 15)
        );
    }

    #[test]
    fn epoch_millis_become_utc_date() {
        let raw = RawPeriod::Timestamp(1_704_067_200_000);
        assert_eq!(normalize_period(&raw).unwrap(), date(2024, 1, 1));
    }

    #[test]
    fn rejects_garbage_periods() {
        assert!(normalize_period(&RawPeriod::from("last tuesday")).is_err());
        assert!(normalize_period(&RawPeriod::from("2024-01-01Tnoon")).is_err());
        assert!(normalize_period(&RawPeriod::Other(serde_json::json!(true))).is_err());
    }

    #[test]
    fn missing_fields_stay_absent() {
        let normalized = normalize(&point("2024-01-01", 0), 0).unwrap();
        assert_eq!(normalized.fail_count, 0);
        assert_eq!(normalized.pass_count, None);
        assert_eq!(normalized.fail_rate, None);
        assert_eq!(normalized.by_severity, None);
    }

    #[test]
    fn rejects_out_of_range_fail_rate() {
        let mut raw = point("2024-01-01", 3);
        raw.fail_rate = Some(120.0);
        let err = normalize(&raw, 4).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MalformedPoint { series: SeriesKind::Historical, index: 4, .. }
        ));
    }

    #[test]
    fn prediction_range_must_contain_value() {
        let raw = PredictionPoint {
            period: "2024-01-08".into(),
            predicted_fail_count: 15.0,
            confidence: 0.8,
            range: Some(PredictionRange { low: 16.0, high: 20.0 }),
        };
        assert!(normalize_prediction(&raw, 0).is_err());
    }

    #[test]
    fn prediction_confidence_is_bounded() {
        let raw = PredictionPoint {
            period: "2024-01-08".into(),
            predicted_fail_count: 15.0,
            confidence: 1.5,
            range: None,
        };
        assert!(normalize_prediction(&raw, 0).is_err());
    }

    #[test]
    fn series_drops_bad_points_and_keeps_the_rest() {
        let raw = vec![
            point("2024-01-01", 1),
            point("not-a-date", 2),
            point("2024-01-03T10:00:00Z", 3),
        ];
        let normalized = normalize_series(&raw);

        assert_eq!(normalized.points.len(), 2);
        assert_eq!(normalized.points[1].fail_count, 3);
        assert_eq!(normalized.rejected.len(), 1);
        assert!(matches!(
            normalized.rejected[0],
            PipelineError::MalformedPoint { index: 1, .. }
        ));
    }

    #[test]
    fn series_rejects_periods_that_collapse_to_the_same_date() {
        let raw = vec![
            point("2024-01-01T08:00:00Z", 1),
            point("2024-01-01T20:00:00Z", 2),
        ];
        let normalized = normalize_series(&raw);

        assert_eq!(normalized.points.len(), 1);
        assert_eq!(normalized.points[0].fail_count, 1);
        assert_eq!(normalized.rejected.len(), 1);
    }

    #[test]
    fn sparkline_accepts_numbers_and_records() {
        let inputs = vec![
            SparkInput::Number(4.0),
            SparkInput::Record(SparkRecord { value: Some(2.5), fail_count: None }),
            SparkInput::Record(SparkRecord { value: None, fail_count: Some(7) }),
            SparkInput::Record(SparkRecord { value: None, fail_count: None }),
        ];
        let normalized = normalize_spark(&inputs);

        let values: Vec<f64> = normalized.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![4.0, 2.5, 7.0]);
        assert_eq!(normalized.rejected.len(), 1);
    }

    #[test]
    fn sparkline_deserializes_mixed_json() {
        let inputs: Vec<SparkInput> =
            serde_json::from_str(r#"[3, {"value": 1.5}, {"fail_count": 9}]"#).unwrap();
        let normalized = normalize_spark(&inputs);
        assert_eq!(normalized.points.len(), 3);
        assert_eq!(normalized.points[2], SparkPoint { index: 2, value: 9.0 });
    }
}
