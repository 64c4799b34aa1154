use crate::models::PolicyKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

// ============================================================
// EvalResults
// ============================================================
/// Reported by an evaluator once it has scored a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResults {
    pub evaluator_id: Uuid,
    /// One entry per evaluated child. A key whose cache entry held several children appears
    /// once per child.
    pub evaluated_keys: Vec<PolicyKey>,
    pub frames: u64,
    pub runtime: Duration,
    pub avg_episode_length: f64,
}

impl EvalResults {
    #[instrument(level = "debug", skip(evaluated_keys), fields(evaluator_id = %evaluator_id, evaluated = evaluated_keys.len()))]
    pub fn new(evaluator_id: Uuid, evaluated_keys: Vec<PolicyKey>) -> Self {
        Self {
            evaluator_id,
            evaluated_keys,
            frames: 0,
            runtime: Duration::ZERO,
            avg_episode_length: 0.0,
        }
    }

    pub fn with_metrics(mut self, frames: u64, runtime: Duration, avg_episode_length: f64) -> Self {
        self.frames = frames;
        self.runtime = runtime;
        self.avg_episode_length = avg_episode_length;
        self
    }
}

// ============================================================
// Inbound
// ============================================================
/// Messages handled by a running operator, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    EvalResults(EvalResults),
    /// Keys returned to the free set without evaluation, e.g. an elite evicted from the archive.
    Release(Vec<PolicyKey>),
    Stop,
}

// ============================================================
// Outbound
// ============================================================
/// Batch of freshly written eval cache entries, pushed on the evaluation-submission queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub operator_id: Uuid,
    /// Unique parent keys whose eval cache entries hold the new children.
    pub keys: Vec<PolicyKey>,
    pub bootstrap: bool,
}

/// Notifications broadcast to every listener of an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VariationEvent {
    ToEvaluate {
        operator_id: Uuid,
        bootstrap: bool,
        emitted_at: DateTime<Utc>,
    },
    Stopped {
        operator_id: Uuid,
        emitted_at: DateTime<Utc>,
    },
}

impl VariationEvent {
    pub fn to_evaluate(operator_id: Uuid, bootstrap: bool) -> Self {
        Self::ToEvaluate {
            operator_id,
            bootstrap,
            emitted_at: Utc::now(),
        }
    }

    pub fn stopped(operator_id: Uuid) -> Self {
        Self::Stopped {
            operator_id,
            emitted_at: Utc::now(),
        }
    }

    pub fn operator_id(&self) -> Uuid {
        match self {
            Self::ToEvaluate { operator_id, .. } | Self::Stopped { operator_id, .. } => *operator_id,
        }
    }
}
