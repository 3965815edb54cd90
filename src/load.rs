use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult, SeriesKind};
use crate::models::{
    PeriodAggregate, PredictionResponse, RawPeriod, SeverityBreakdown, SparkInput,
    TimeSeriesPoint,
};
use crate::workflow::PredictionSource;

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// A historical series as read from disk. Points that failed to parse are
/// rejected under their input index and the rest are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedSeries {
    pub points: Vec<TimeSeriesPoint>,
    pub rejected: Vec<PipelineError>,
    /// Input index of each kept point.
    kept: Vec<usize>,
}

impl LoadedSeries {
    fn keep(&mut self, index: usize, point: TimeSeriesPoint) {
        self.points.push(point);
        self.kept.push(index);
    }

    fn reject(&mut self, index: usize, reason: impl Into<String>) {
        let err = PipelineError::malformed(SeriesKind::Historical, index, reason);
        warn!(error = %err, "dropping unreadable point");
        self.rejected.push(err);
    }

    /// Load rejections followed by `later`, with historical point indices
    /// rewritten from positions in `points` to positions in the input file.
    pub fn attribute(&self, later: Vec<PipelineError>) -> Vec<PipelineError> {
        let mut all = self.rejected.clone();
        all.extend(later.into_iter().map(|err| match err {
            PipelineError::MalformedPoint {
                series: SeriesKind::Historical,
                index,
                reason,
            } => PipelineError::MalformedPoint {
                series: SeriesKind::Historical,
                index: self.kept.get(index).copied().unwrap_or(index),
                reason,
            },
            other => other,
        }));
        all
    }
}

/// Load a historical series from a JSON array or a CSV export.
pub fn load_series(path: &Path) -> anyhow::Result<LoadedSeries> {
    let series = if is_csv(path) {
        load_series_csv(path)?
    } else {
        load_series_json(path)?
    };
    debug!(
        path = %path.display(),
        count = series.points.len(),
        rejected = series.rejected.len(),
        "loaded historical series"
    );
    Ok(series)
}

fn load_series_json(path: &Path) -> anyhow::Result<LoadedSeries> {
    let values: Vec<serde_json::Value> = read_json(path)?;
    let mut series = LoadedSeries::default();

    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<TimeSeriesPoint>(value) {
            Ok(point) => series.keep(index, point),
            Err(err) => series.reject(index, err.to_string()),
        }
    }

    Ok(series)
}

fn load_series_csv(path: &Path) -> anyhow::Result<LoadedSeries> {
    #[derive(Deserialize)]
    struct CsvRow {
        period: String,
        fail_count: u64,
        pass_count: Option<u64>,
        fail_rate: Option<f64>,
        critical: Option<u64>,
        high: Option<u64>,
        medium: Option<u64>,
        low: Option<u64>,
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut series = LoadedSeries::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) if matches!(err.kind(), csv::ErrorKind::Deserialize { .. }) => {
                series.reject(index, err.to_string());
                continue;
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("bad CSV row #{index} in {}", path.display()));
            }
        };

        let period = match row.period.trim().parse::<i64>() {
            Ok(millis) => RawPeriod::Timestamp(millis),
            Err(_) => RawPeriod::Text(row.period),
        };
        let buckets = [row.critical, row.high, row.medium, row.low];
        let by_severity = buckets.iter().any(Option::is_some).then(|| SeverityBreakdown {
            critical: row.critical.unwrap_or(0),
            high: row.high.unwrap_or(0),
            medium: row.medium.unwrap_or(0),
            low: row.low.unwrap_or(0),
        });

        series.keep(
            index,
            TimeSeriesPoint {
                period,
                fail_count: row.fail_count,
                pass_count: row.pass_count,
                fail_rate: row.fail_rate,
                by_severity,
            },
        );
    }

    Ok(series)
}

/// Two period aggregates as delivered by the reporting backend. Either side
/// may be `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatePair {
    #[serde(default)]
    pub period1: Option<PeriodAggregate>,
    #[serde(default)]
    pub period2: Option<PeriodAggregate>,
}

pub fn load_aggregates(path: &Path) -> anyhow::Result<AggregatePair> {
    read_json(path)
}

pub fn load_prediction_response(path: &Path) -> anyhow::Result<PredictionResponse> {
    read_json(path)
}

pub fn load_spark(path: &Path) -> anyhow::Result<Vec<SparkInput>> {
    read_json(path)
}

/// A prediction service stand-in that reads a saved response from disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PredictionSource for FileSource {
    async fn fetch(&self, historical: &[TimeSeriesPoint]) -> PipelineResult<PredictionResponse> {
        debug!(path = %self.path.display(), history = historical.len(), "reading prediction response");
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::UpstreamPrediction(format!("{}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            PipelineError::UpstreamPrediction(format!("malformed response: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_json_series() {
        let file = write_file(
            ".json",
            r#"[
                {"period": "2024-01-01T00:00:00Z", "fail_count": 10, "by_severity": {"critical": 2, "low": 8}},
                {"period": 1704672000000, "fail_count": 4, "pass_count": 96}
            ]"#,
        );

        let series = load_series(file.path()).unwrap();
        let points = &series.points;
        assert_eq!(points.len(), 2);
        assert!(series.rejected.is_empty());
        assert_eq!(points[0].by_severity.unwrap().critical, 2);
        assert_eq!(points[0].by_severity.unwrap().high, 0);
        assert_eq!(points[1].period, RawPeriod::Timestamp(1_704_672_000_000));
        assert_eq!(points[1].fail_rate, None);
    }

    #[test]
    fn loads_csv_series() {
        let file = write_file(
            ".csv",
            "period,fail_count,pass_count,fail_rate,critical,high,medium,low\n\
             2024-01-01,10,90,10.0,1,2,3,4\n\
             2024-01-08,5,,,,,,\n",
        );

        let points = load_series(file.path()).unwrap().points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].pass_count, Some(90));
        assert_eq!(points[0].by_severity.unwrap().total(), 10);
        assert_eq!(points[1].pass_count, None);
        assert_eq!(points[1].by_severity, None);
        assert_eq!(points[1].period, RawPeriod::from("2024-01-08"));
    }

    #[test]
    fn bad_json_point_is_dropped_and_the_rest_kept() {
        let file = write_file(
            ".json",
            r#"[
                {"period": "2024-01-01", "fail_count": 10},
                {"period": "2024-01-08", "fail_count": -3},
                {"period": "2024-01-15", "fail_count": 4}
            ]"#,
        );

        let series = load_series(file.path()).unwrap();
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[1].fail_count, 4);
        assert_eq!(series.rejected.len(), 1);
        assert!(matches!(
            series.rejected[0],
            PipelineError::MalformedPoint {
                series: SeriesKind::Historical,
                index: 1,
                ..
            }
        ));
    }

    #[test]
    fn bad_csv_row_is_dropped_and_the_rest_kept() {
        let file = write_file(
            ".csv",
            "period,fail_count\n2024-01-01,ten\n2024-01-08,3\n",
        );

        let series = load_series(file.path()).unwrap();
        assert_eq!(series.points.len(), 1);
        assert_eq!(series.points[0].fail_count, 3);
        assert!(matches!(
            series.rejected.as_slice(),
            [PipelineError::MalformedPoint { index: 0, .. }]
        ));
    }

    #[test]
    fn later_rejections_use_input_indices() {
        let file = write_file(
            ".json",
            r#"[
                {"period": "2024-01-01", "fail_count": "many"},
                {"period": "2024-01-08", "fail_count": 2},
                {"period": "not a date", "fail_count": 5}
            ]"#,
        );
        let series = load_series(file.path()).unwrap();
        let normalized = crate::normalize::normalize_series(&series.points);

        let rejected = series.attribute(normalized.rejected);
        let indices: Vec<usize> = rejected
            .iter()
            .filter_map(|err| match err {
                PipelineError::MalformedPoint { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn non_array_json_is_still_an_error() {
        let file = write_file(".json", r#"{"period": "2024-01-01"}"#);
        assert!(load_series(file.path()).is_err());
    }

    #[test]
    fn aggregates_allow_null_sides() {
        let file = write_file(
            ".json",
            r#"{"period1": {"label": "last week", "total_fail_count": 100, "avg_fail_rate": 5.0},
                "period2": null}"#,
        );
        let pair = load_aggregates(file.path()).unwrap();
        assert_eq!(pair.period1.unwrap().total_fail_count, 100);
        assert!(pair.period2.is_none());
    }

    #[tokio::test]
    async fn file_source_reads_response() {
        let file = write_file(
            ".json",
            r#"{"predictions": [{"period": "2024-01-08", "predicted_fail_count": 3.0, "confidence": 0.9}]}"#,
        );
        let response = FileSource::new(file.path()).fetch(&[]).await.unwrap();
        assert_eq!(response.predictions.len(), 1);
        assert!(response.analysis.key_insights.is_none());
    }

    #[tokio::test]
    async fn file_source_reports_missing_file_as_upstream_error() {
        let err = FileSource::new("/nonexistent/prediction.json")
            .fetch(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamPrediction(_)));
    }
}
