use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Duration, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use serde_json::json;
use tracing::info;

mod compare;
mod config;
mod error;
mod load;
mod merge;
mod models;
mod normalize;
mod predict;
mod report;
mod trend;
mod window;
mod workflow;

use config::PipelineConfig;
use error::PipelineError;
use models::{AssembledPrediction, TimeSeriesPoint};
use workflow::{PredictionSession, PredictionState};

#[derive(Parser)]
#[command(name = "mq-trends")]
#[command(about = "Trend reconciliation for data-migration quality dashboards", long_about = None)]
struct Cli {
    /// Percent change treated as stable when describing a series trend
    #[arg(long, global = true, env = "MQ_STABLE_BAND", default_value_t = 0.0)]
    stable_band: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a historical series with a prediction response into chart points
    Merge {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        predictions: Option<PathBuf>,
    },
    /// Compare two period aggregates
    Compare {
        #[arg(long)]
        aggregates: PathBuf,
    },
    /// Classify a trend from a series, a sparkline, a label or a raw delta
    #[command(group(
        ArgGroup::new("input")
            .args(["history", "spark", "label", "delta"])
            .required(true)
            .multiple(false)
    ))]
    Trend {
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        spark: Option<PathBuf>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        delta: Option<f64>,
    },
    /// Run one prediction request and print the assembled forecast
    Predict {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        response: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        predictions: Option<PathBuf>,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, env = "MQ_PERIOD_DAYS", default_value_t = 7)]
        period_days: i64,
        /// Exclusive end of the current window (default: day after the last observation)
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_prediction(
    history: &[TimeSeriesPoint],
    response: PathBuf,
    config: PipelineConfig,
) -> anyhow::Result<AssembledPrediction> {
    let source = load::FileSource::new(response);
    let mut session = PredictionSession::new(config);
    session.configure()?;

    match session.generate(&source, history).await? {
        PredictionState::Ready { prediction, .. } => Ok(prediction.as_ref().clone()),
        PredictionState::Failed { message, .. } => bail!("{message}"),
        other => bail!("prediction ended in unexpected state: {}", other.name()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::new(cli.stable_band).context("invalid --stable-band")?;

    match cli.command {
        Commands::Merge {
            history,
            predictions,
        } => {
            let loaded = load::load_series(&history)?;
            let predicted = match predictions {
                Some(path) => {
                    let response = load::load_prediction_response(&path)?;
                    predict::forecast_points(&response)
                        .with_context(|| format!("prediction response {}", path.display()))?
                        .to_vec()
                }
                None => Vec::new(),
            };

            let mut merged = merge::merge(&loaded.points, &predicted);
            merged.rejected = loaded.attribute(merged.rejected);
            if merged.is_empty() {
                info!("no data to chart");
            }
            print_json(&merged)?;
        }
        Commands::Compare { aggregates } => {
            let pair = load::load_aggregates(&aggregates)?;
            match compare::compare_optional(pair.period1.as_ref(), pair.period2.as_ref()) {
                Ok(delta) => print_json(&json!({
                    "delta": delta,
                    "percent_label": delta.percent_label(),
                }))?,
                Err(err @ PipelineError::InsufficientData(_)) => print_json(&json!({
                    "status": "insufficient_data",
                    "message": err.to_string(),
                }))?,
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Trend {
            history,
            spark,
            label,
            delta,
        } => {
            let output = if let Some(label) = label {
                json!({ "badge": trend::classify(trend::TrendSignal::Label(&label)) })
            } else if let Some(delta) = delta {
                json!({ "badge": trend::classify(trend::TrendSignal::Delta(delta)) })
            } else {
                let (values, rejected) = if let Some(path) = history {
                    let loaded = load::load_series(&path)?;
                    let normalized = normalize::normalize_series(&loaded.points);
                    let values = normalized
                        .points
                        .iter()
                        .map(|p| p.fail_count as f64)
                        .collect::<Vec<_>>();
                    (values, loaded.attribute(normalized.rejected))
                } else if let Some(path) = spark {
                    let normalized = normalize::normalize_spark(&load::load_spark(&path)?);
                    let values = normalized.points.iter().map(|p| p.value).collect::<Vec<_>>();
                    (values, normalized.rejected)
                } else {
                    bail!("one of --history, --spark, --label or --delta is required");
                };

                let descriptor = trend::describe_series(&values, &config);
                let badge = trend::badge(descriptor.direction);
                json!({ "trend": descriptor, "badge": badge, "rejected": rejected })
            };
            print_json(&output)?;
        }
        Commands::Predict { history, response } => {
            let loaded = load::load_series(&history)?;
            let mut prediction = run_prediction(&loaded.points, response, config).await?;
            prediction.series.rejected =
                loaded.attribute(std::mem::take(&mut prediction.series.rejected));
            print_json(&prediction)?;
        }
        Commands::Report {
            history,
            predictions,
            scope,
            period_days,
            end,
            out,
        } => {
            let loaded = load::load_series(&history)?;
            let normalized = normalize::normalize_series(&loaded.points);

            let end = end
                .or_else(|| {
                    let last = normalized.points.iter().map(|p| p.period).max()?;
                    last.checked_add_signed(Duration::days(1))
                })
                .unwrap_or_else(|| Utc::now().date_naive());
            let (previous_window, current_window) = window::trailing_windows(end, period_days)
                .with_context(|| {
                    format!("a {period_days}-day window ending {end} is outside the calendar")
                })?;
            let previous = window::aggregate_window(&normalized.points, "previous", previous_window);
            let current = window::aggregate_window(&normalized.points, "current", current_window);
            let delta = compare::compare(&previous, &current);

            let in_current: Vec<_> = normalized
                .points
                .iter()
                .filter(|p| current_window.contains(p.period))
                .cloned()
                .collect();
            let severity = window::severity_totals(&in_current);
            let values: Vec<f64> = normalized.points.iter().map(|p| p.fail_count as f64).collect();
            let series_trend = trend::describe_series(&values, &config);

            let prediction = match predictions {
                Some(path) => Some(run_prediction(&loaded.points, path, config).await?),
                None => None,
            };
            let mut series = match &prediction {
                Some(prediction) => prediction.series.clone(),
                None => merge::merge(&loaded.points, &[]),
            };
            series.rejected = loaded.attribute(series.rejected);

            let report = report::build_report(&report::ReportInput {
                scope: scope.as_deref(),
                window_days: period_days.max(1),
                end,
                previous: &previous,
                current: &current,
                delta: &delta,
                severity,
                trend: series_trend,
                series: &series,
                prediction: prediction.as_ref(),
            });
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
