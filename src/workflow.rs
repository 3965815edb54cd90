use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{AssembledPrediction, PredictionResponse, TimeSeriesPoint};
use crate::predict::assemble;

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionState {
    NotConfigured,
    Idle,
    Generating {
        request: u64,
    },
    Ready {
        request: u64,
        prediction: Arc<AssembledPrediction>,
    },
    Failed {
        request: u64,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionEvent {
    Configure,
    Generate { request: u64 },
    Succeeded {
        request: u64,
        prediction: Arc<AssembledPrediction>,
    },
    Failed { request: u64, message: String },
    /// The consumer went away; any outstanding response becomes stale.
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Applied(PredictionState),
    /// A response for a request that is no longer current.
    Discarded,
}

impl PredictionState {
    pub fn name(&self) -> &'static str {
        match self {
            PredictionState::NotConfigured => "not configured",
            PredictionState::Idle => "idle",
            PredictionState::Generating { .. } => "generating",
            PredictionState::Ready { .. } => "ready",
            PredictionState::Failed { .. } => "failed",
        }
    }

    pub fn prediction(&self) -> Option<&AssembledPrediction> {
        match self {
            PredictionState::Ready { prediction, .. } => Some(prediction),
            _ => None,
        }
    }

    pub fn apply(&self, event: PredictionEvent) -> PipelineResult<Transition> {
        use PredictionEvent as E;
        use PredictionState as S;

        let next = match (self, event) {
            (S::NotConfigured, E::Configure) => S::Idle,
            (S::NotConfigured, E::Reset) => S::NotConfigured,
            (_, E::Reset) => S::Idle,

            (S::Idle | S::Ready { .. } | S::Failed { .. }, E::Generate { request }) => {
                S::Generating { request }
            }

            (S::Generating { request: current }, E::Succeeded { request, prediction })
                if *current == request =>
            {
                S::Ready {
                    request,
                    prediction,
                }
            }
            (S::Generating { request: current }, E::Failed { request, message })
                if *current == request =>
            {
                S::Failed { request, message }
            }
            (_, E::Succeeded { .. } | E::Failed { .. }) => return Ok(Transition::Discarded),

            (state, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: state.name().to_string(),
                    event: event.name().to_string(),
                })
            }
        };

        Ok(Transition::Applied(next))
    }
}

impl PredictionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PredictionEvent::Configure => "configure",
            PredictionEvent::Generate { .. } => "generate",
            PredictionEvent::Succeeded { .. } => "complete",
            PredictionEvent::Failed { .. } => "fail",
            PredictionEvent::Reset => "reset",
        }
    }
}

/// The external prediction service.
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn fetch(&self, historical: &[TimeSeriesPoint]) -> PipelineResult<PredictionResponse>;
}

/// Owns the latest state and the request counter.
#[derive(Debug)]
pub struct PredictionSession {
    state: PredictionState,
    last_request: u64,
    config: PipelineConfig,
}

impl PredictionSession {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            state: PredictionState::NotConfigured,
            last_request: 0,
            config,
        }
    }

    pub fn configured(config: PipelineConfig) -> Self {
        Self {
            state: PredictionState::Idle,
            last_request: 0,
            config,
        }
    }

    pub fn state(&self) -> &PredictionState {
        &self.state
    }

    fn transition(&mut self, event: PredictionEvent) -> PipelineResult<bool> {
        match self.state.apply(event)? {
            Transition::Applied(next) => {
                self.state = next;
                Ok(true)
            }
            Transition::Discarded => Ok(false),
        }
    }

    pub fn configure(&mut self) -> PipelineResult<()> {
        self.transition(PredictionEvent::Configure).map(|_| ())
    }

    /// Start a request and return its sequence number. Rejected while
    /// another request is outstanding.
    pub fn begin(&mut self) -> PipelineResult<u64> {
        let request = self.last_request + 1;
        self.transition(PredictionEvent::Generate { request })?;
        self.last_request = request;
        info!(request, "prediction requested");
        Ok(request)
    }

    pub fn cancel(&mut self) {
        // Reset is valid from every state.
        let _ = self.transition(PredictionEvent::Reset);
    }

    fn is_current(&self, request: u64) -> bool {
        matches!(self.state, PredictionState::Generating { request: current } if current == request)
    }

    /// Apply a response. Returns `false` when the response was stale and
    /// left the state untouched.
    pub fn resolve(
        &mut self,
        request: u64,
        outcome: PipelineResult<PredictionResponse>,
        historical: &[TimeSeriesPoint],
    ) -> PipelineResult<bool> {
        if !self.is_current(request) {
            info!(request, latest = self.last_request, "discarding stale prediction response");
            return Ok(false);
        }

        let event = match outcome.and_then(|response| assemble(historical, &response, &self.config))
        {
            Ok(prediction) => PredictionEvent::Succeeded {
                request,
                prediction: Arc::new(prediction),
            },
            Err(err) => {
                warn!(request, error = %err, "prediction failed");
                PredictionEvent::Failed {
                    request,
                    message: err.to_string(),
                }
            }
        };
        self.transition(event)
    }

    /// Request, await and apply one prediction.
    pub async fn generate<S: PredictionSource + ?Sized>(
        &mut self,
        source: &S,
        historical: &[TimeSeriesPoint],
    ) -> PipelineResult<&PredictionState> {
        let request = self.begin()?;
        let outcome = source.fetch(historical).await;
        self.resolve(request, outcome, historical)?;
        Ok(&self.state)
    }
}
