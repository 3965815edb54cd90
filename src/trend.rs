use crate::config::PipelineConfig;
use crate::models::{Polarity, TrendBadge, TrendDescriptor, TrendDirection};

/// Either a direction already computed upstream or a raw delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendSignal<'a> {
    Label(&'a str),
    Delta(f64),
}

/// Rising fail counts are bad, falling ones good. Fixed for this domain.
pub fn polarity(direction: TrendDirection) -> Polarity {
    match direction {
        TrendDirection::Increasing => Polarity::Bad,
        TrendDirection::Decreasing => Polarity::Good,
        TrendDirection::Stable => Polarity::Neutral,
    }
}

/// Total: unknown labels and NaN deltas are `stable`.
pub fn classify(signal: TrendSignal<'_>) -> TrendBadge {
    let direction = match signal {
        TrendSignal::Label("increasing") => TrendDirection::Increasing,
        TrendSignal::Label("decreasing") => TrendDirection::Decreasing,
        TrendSignal::Label(_) => TrendDirection::Stable,
        TrendSignal::Delta(delta) if delta > 0.0 => TrendDirection::Increasing,
        TrendSignal::Delta(delta) if delta < 0.0 => TrendDirection::Decreasing,
        TrendSignal::Delta(_) => TrendDirection::Stable,
    };

    badge(direction)
}

pub fn badge(direction: TrendDirection) -> TrendBadge {
    TrendBadge {
        direction,
        polarity: polarity(direction),
    }
}

/// Direction and percent change between two endpoint values. A zero
/// baseline with a non-zero end has no finite percentage.
pub fn describe_endpoints(first: f64, last: f64, config: &PipelineConfig) -> TrendDescriptor {
    if !first.is_finite() || !last.is_finite() {
        return TrendDescriptor {
            direction: TrendDirection::Stable,
            magnitude_percent: None,
        };
    }

    if first == 0.0 {
        return TrendDescriptor {
            direction: classify(TrendSignal::Delta(last)).direction,
            magnitude_percent: (last == 0.0).then_some(0.0),
        };
    }

    let percent = (last - first) * 100.0 / first.abs();
    let direction = if percent.abs() <= config.stable_band_percent {
        TrendDirection::Stable
    } else {
        classify(TrendSignal::Delta(percent)).direction
    };

    TrendDescriptor {
        direction,
        magnitude_percent: Some(percent),
    }
}

/// Compares the first and last finite values of a series.
pub fn describe_series(values: &[f64], config: &PipelineConfig) -> TrendDescriptor {
    let mut finite = values.iter().copied().filter(|v| v.is_finite());
    match (finite.next(), finite.last()) {
        (Some(first), Some(last)) => describe_endpoints(first, last, config),
        _ => TrendDescriptor {
            direction: TrendDirection::Stable,
            magnitude_percent: None,
        },
    }
}
