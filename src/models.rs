use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A period key as delivered by the metrics backend, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPeriod {
    Text(String),
    /// Epoch milliseconds.
    Timestamp(i64),
    /// Anything else; always rejected by the normalizer.
    Other(serde_json::Value),
}

impl From<&str> for RawPeriod {
    fn from(value: &str) -> Self {
        RawPeriod::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    #[serde(default)]
    pub critical: u64,
    #[serde(default)]
    pub high: u64,
    #[serde(default)]
    pub medium: u64,
    #[serde(default)]
    pub low: u64,
}

impl SeverityBreakdown {
    pub fn total(&self) -> u64 {
        [self.critical, self.high, self.medium, self.low]
            .into_iter()
            .fold(0, u64::saturating_add)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub period: RawPeriod,
    pub fail_count: u64,
    #[serde(default)]
    pub pass_count: Option<u64>,
    #[serde(default)]
    pub fail_rate: Option<f64>,
    #[serde(default)]
    pub by_severity: Option<SeverityBreakdown>,
}

/// A historical point with a canonical date key. Absent fields stay absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPoint {
    pub period: NaiveDate,
    pub fail_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_severity: Option<SeverityBreakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRange {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub period: RawPeriod,
    pub predicted_fail_count: f64,
    pub confidence: f64,
    #[serde(default)]
    pub range: Option<PredictionRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPrediction {
    pub period: NaiveDate,
    pub predicted_fail_count: f64,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<PredictionRange>,
}

/// One chart-ready point. Historical points carry `actual`, forecast points
/// carry `predicted`; only the connector carries both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedSeriesPoint {
    pub period: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<PredictionRange>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub connector: bool,
}

impl MergedSeriesPoint {
    pub fn historical(point: &NormalizedPoint) -> Self {
        Self {
            period: point.period,
            actual: Some(point.fail_count),
            predicted: None,
            confidence: None,
            range: None,
            connector: false,
        }
    }

    pub fn forecast(point: &NormalizedPrediction) -> Self {
        Self {
            period: point.period,
            actual: None,
            predicted: Some(point.predicted_fail_count),
            confidence: Some(point.confidence),
            range: point.range,
            connector: false,
        }
    }

    pub fn connector(point: &NormalizedPoint) -> Self {
        Self {
            period: point.period,
            actual: Some(point.fail_count),
            predicted: Some(point.fail_count as f64),
            confidence: None,
            range: None,
            connector: true,
        }
    }
}

/// Merge output: the chart sequence plus every input point that was dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedSeries {
    pub points: Vec<MergedSeriesPoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<PipelineError>,
}

impl MergedSeries {
    /// An empty series means the consumer shows a "no data" state.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn connector(&self) -> Option<&MergedSeriesPoint> {
        self.points.iter().find(|point| point.connector)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAggregate {
    pub label: String,
    pub total_fail_count: u64,
    pub avg_fail_rate: f64,
    /// Inclusive window start, when the reporting backend supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    /// Exclusive window end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaTrend {
    Worsening,
    Improving,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodDelta {
    pub fail_count_change: i64,
    /// `None` when the first period has zero fails and the second does not.
    pub percent_change: Option<f64>,
    pub fail_rate_change: f64,
    pub trend: DeltaTrend,
}

impl PeriodDelta {
    pub fn percent_label(&self) -> String {
        match self.percent_change {
            Some(value) => format!("{value:+.1}%"),
            None => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Display coloring for a direction. Rising fail counts are always bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Bad,
    Good,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendBadge {
    pub direction: TrendDirection,
    pub polarity: Polarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendDescriptor {
    pub direction: TrendDirection,
    pub magnitude_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionAnalysis {
    #[serde(default)]
    pub estimated_critical_date: Option<String>,
    #[serde(default)]
    pub estimated_resolution_date: Option<String>,
    #[serde(default)]
    pub key_insights: Option<Vec<String>>,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(default)]
    pub predictions: Vec<PredictionPoint>,
    #[serde(default)]
    pub analysis: PredictionAnalysis,
    /// Set by the prediction service when generation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A key date exactly as the prediction service expressed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KeyDate {
    DateTime(DateTime<FixedOffset>),
    /// Wall-clock time with no offset; the consumer picks the zone.
    Naive(NaiveDateTime),
    Date(NaiveDate),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyDates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_date: Option<KeyDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_date: Option<KeyDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledPrediction {
    pub series: MergedSeries,
    pub key_dates: KeyDates,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_trend: Option<TrendDescriptor>,
}

/// Sparkline input: a bare number or a shaped record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SparkInput {
    Number(f64),
    Record(SparkRecord),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SparkRecord {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub fail_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SparkPoint {
    pub index: usize,
    pub value: f64,
}
