use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::merge::merge;
use crate::models::{
    AssembledPrediction, KeyDate, KeyDates, PredictionPoint, PredictionResponse, TimeSeriesPoint,
};
use crate::trend::describe_endpoints;

pub fn assemble(
    historical: &[TimeSeriesPoint],
    response: &PredictionResponse,
    config: &PipelineConfig,
) -> PipelineResult<AssembledPrediction> {
    let predictions = forecast_points(response)?;

    let analysis = &response.analysis;
    let key_dates = KeyDates {
        critical_date: parse_key_date("estimated_critical_date", &analysis.estimated_critical_date)?,
        resolution_date: parse_key_date(
            "estimated_resolution_date",
            &analysis.estimated_resolution_date,
        )?,
    };

    let series = merge(historical, predictions);

    let last_actual = series
        .points
        .iter()
        .rev()
        .find_map(|p| p.actual.filter(|_| !p.connector));
    let last_predicted = series
        .points
        .iter()
        .rev()
        .find_map(|p| p.predicted.filter(|_| !p.connector));
    let forecast_trend = match (last_actual, last_predicted) {
        (Some(actual), Some(predicted)) => {
            Some(describe_endpoints(actual as f64, predicted, config))
        }
        _ => None,
    };

    Ok(AssembledPrediction {
        series,
        key_dates,
        insights: analysis.key_insights.clone().unwrap_or_default(),
        recommendations: analysis.recommendations.clone().unwrap_or_default(),
        forecast_trend,
    })
}

/// The forecast points of a response, or the error the service reported.
pub fn forecast_points(response: &PredictionResponse) -> PipelineResult<&[PredictionPoint]> {
    match &response.error {
        Some(message) => Err(PipelineError::UpstreamPrediction(message.clone())),
        None => Ok(&response.predictions),
    }
}

/// Keeps the offset the service wrote; the consumer decides how to display it.
fn parse_key_date(field: &str, raw: &Option<String>) -> PipelineResult<Option<KeyDate>> {
    let Some(text) = raw.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(KeyDate::DateTime(datetime)));
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(KeyDate::Naive(datetime)));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| Some(KeyDate::Date(date)))
        .map_err(|_| PipelineError::UpstreamPrediction(format!("{field} '{text}' is not a date")))
}
