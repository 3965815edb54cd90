use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Which input sequence a point came from, so every error names its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Historical,
    Predicted,
    Sparkline,
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeriesKind::Historical => "historical",
            SeriesKind::Predicted => "predicted",
            SeriesKind::Sparkline => "sparkline",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("malformed {series} point #{index}: {reason}")]
    MalformedPoint {
        series: SeriesKind,
        index: usize,
        reason: String,
    },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("prediction failed: {0}")]
    UpstreamPrediction(String),

    #[error("predicted point #{index} ({period}) precedes last historical period {last_historical}")]
    OverlappingPrediction {
        index: usize,
        period: NaiveDate,
        last_historical: NaiveDate,
    },

    #[error("periods '{first}' and '{second}' overlap or are out of order")]
    IncomparablePeriods { first: String, second: String },

    #[error("cannot {event} while {from}")]
    InvalidTransition { from: String, event: String },
}

impl PipelineError {
    pub fn malformed(series: SeriesKind, index: usize, reason: impl Into<String>) -> Self {
        PipelineError::MalformedPoint {
            series,
            index,
            reason: reason.into(),
        }
    }
}

// Rejected points travel inside JSON output as their display message.
impl Serialize for PipelineError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
