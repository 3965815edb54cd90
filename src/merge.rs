use tracing::{debug, warn};

use crate::error::{PipelineError, SeriesKind};
use crate::models::{MergedSeries, MergedSeriesPoint, PredictionPoint, TimeSeriesPoint};
use crate::normalize::{normalize_predictions, normalize_series};

/// Historical block, optional connector, then the forecast block. Neither
/// block is re-sorted.
pub fn merge(historical: &[TimeSeriesPoint], predicted: &[PredictionPoint]) -> MergedSeries {
    let history = normalize_series(historical);
    let forecast = normalize_predictions(predicted);

    let mut rejected = history.rejected;
    rejected.extend(forecast.rejected);

    let last_historical = history.points.last();

    // Forecast points dated before the last observation would run the chart
    // backwards; they are truncated and reported.
    let forecast: Vec<_> = match last_historical {
        Some(last) => forecast
            .points
            .into_iter()
            .enumerate()
            .filter_map(|(position, point)| {
                if point.period < last.period {
                    let err = PipelineError::OverlappingPrediction {
                        index: original_index(predicted, position, &rejected),
                        period: point.period,
                        last_historical: last.period,
                    };
                    warn!(error = %err, "truncating overlapping prediction");
                    rejected.push(err);
                    None
                } else {
                    Some(point)
                }
            })
            .collect(),
        None => forecast.points,
    };

    let mut points = Vec::with_capacity(history.points.len() + forecast.len() + 1);
    points.extend(history.points.iter().map(MergedSeriesPoint::historical));

    if let (Some(last), Some(first_forecast)) = (last_historical, forecast.first()) {
        if first_forecast.period == last.period {
            debug!(period = %last.period, "forecast starts at last observation, no connector");
        } else {
            points.push(MergedSeriesPoint::connector(last));
        }
    }

    points.extend(forecast.iter().map(MergedSeriesPoint::forecast));

    MergedSeries { points, rejected }
}

/// Map a position among surviving predictions back to its input index.
fn original_index(
    predicted: &[PredictionPoint],
    position: usize,
    rejected: &[PipelineError],
) -> usize {
    let dropped: Vec<usize> = rejected
        .iter()
        .filter_map(|err| match err {
            PipelineError::MalformedPoint {
                series: SeriesKind::Predicted,
                index,
                ..
            } => Some(*index),
            _ => None,
        })
        .collect();

    (0..predicted.len())
        .filter(|index| !dropped.contains(index))
        .nth(position)
        .unwrap_or(position)
}
