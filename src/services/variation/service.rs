use super::Error;
use super::ServiceBuilder;
use super::events::{EvalResults, Submission, VariationEvent};
use crate::models::{
    Breeder, ParentSelection, PolicyKey, Schedule, ScheduleDecision, SelectionError,
    select_parents,
};
use crate::repositories::{ClaimError, EliteSource, EvalCache, FreeKeySet, PolicyPool};
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Idle,
    Evolving,
    Stopped,
}

/// What one timer tick or round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Children were written to the eval cache and submitted for evaluation.
    Submitted {
        parents: usize,
        children: usize,
        bootstrap: bool,
    },
    /// Too few free candidates. Nothing was claimed.
    Starved { available: usize, requested: usize },
    /// In-flight count at the watermark. No round was attempted.
    Throttled { in_flight: i64 },
    /// Another operator claimed some of the drawn keys first. Nothing was claimed.
    Contended { keys: Vec<PolicyKey> },
    Stopped,
}

/// The variation operator.
///
/// A single cooperative actor: every handler runs to completion before the next is
/// dispatched, and a round claims its parents before any tensor work starts.
pub struct Service {
    pub(super) id: Uuid,
    pub(super) pool: PolicyPool,
    pub(super) cache: EvalCache,
    pub(super) free_keys: FreeKeySet,
    pub(super) elites: Arc<dyn EliteSource>,
    pub(super) breeder: Breeder,
    pub(super) schedule: Schedule,
    pub(super) mutations_per_policy: usize,
    pub(super) rng: StdRng,
    pub(super) in_flight: i64,
    pub(super) state: OperatorState,
    pub(super) submissions: mpsc::UnboundedSender<Submission>,
    pub(super) events: broadcast::Sender<VariationEvent>,
}

impl Service {
    pub fn builder(
        pool: PolicyPool,
        cache: EvalCache,
        free_keys: FreeKeySet,
        elites: Arc<dyn EliteSource>,
    ) -> ServiceBuilder {
        ServiceBuilder::new(pool, cache, free_keys, elites)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    /// Children submitted and not yet reported back. Negative values mean an evaluator
    /// reported more children than were submitted.
    pub fn in_flight(&self) -> i64 {
        self.in_flight
    }

    pub fn free_keys(&self) -> &FreeKeySet {
        &self.free_keys
    }

    pub fn cache(&self) -> &EvalCache {
        &self.cache
    }

    pub fn breeder(&self) -> &Breeder {
        &self.breeder
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VariationEvent> {
        self.events.subscribe()
    }

    /// Runs one round unless enough children are in flight already. Bootstrap mode is used
    /// while the archive holds no more than `random_init` elites.
    #[instrument(level = "debug", skip(self), fields(operator_id = %self.id, in_flight = self.in_flight))]
    pub fn on_timer_tick(&mut self) -> Result<RoundOutcome, Error> {
        if self.state == OperatorState::Stopped {
            return Ok(RoundOutcome::Stopped);
        }

        match self.schedule.should_breed(self.in_flight, self.elites.len()) {
            ScheduleDecision::Wait => {
                tracing::debug!(
                    in_flight = self.in_flight,
                    watermark = self.schedule.watermark,
                    "Evaluators are saturated, skipping round"
                );
                Ok(RoundOutcome::Throttled {
                    in_flight: self.in_flight,
                })
            }
            ScheduleDecision::Breed { bootstrap } => self.evolve_batch(bootstrap),
        }
    }

    /// Claims a batch of parents, breeds their children into the eval cache and submits them.
    ///
    /// Bootstrap rounds draw from every free key. Steady-state rounds draw from the free keys
    /// backing current elites. A fatal error after the claim returns the claimed keys to the
    /// free set before propagating.
    #[instrument(level = "info", skip(self), fields(operator_id = %self.id, bootstrap = bootstrap))]
    pub fn evolve_batch(&mut self, bootstrap: bool) -> Result<RoundOutcome, Error> {
        if self.state == OperatorState::Stopped {
            return Ok(RoundOutcome::Stopped);
        }

        match self.select_round(bootstrap) {
            Ok(selection) => self.run_round(&selection, bootstrap),
            Err(outcome) => Ok(outcome),
        }
    }

    /// Draws the round's parents from the current candidates without claiming them.
    fn select_round(&mut self, bootstrap: bool) -> Result<ParentSelection, RoundOutcome> {
        let requested = self.schedule.batch_size(bootstrap);
        let candidates: Vec<PolicyKey> = if bootstrap {
            self.free_keys.snapshot().into_iter().collect()
        } else {
            self.free_keys.intersection(self.elites.elite_keys())
        };

        if requested == 0 {
            tracing::warn!(
                candidates = candidates.len(),
                "Schedule batch size is zero, skipping round"
            );
            return Err(RoundOutcome::Starved {
                available: candidates.len(),
                requested,
            });
        }

        select_parents(
            &mut self.rng,
            &candidates,
            requested,
            self.breeder.requires_second_parent(),
            self.mutations_per_policy,
        )
        .map_err(|SelectionError::InsufficientCandidates { .. }| {
            tracing::warn!(
                free_keys = self.free_keys.len(),
                candidates = candidates.len(),
                requested = requested,
                in_flight = self.in_flight,
                "Not enough free keys to run a round"
            );
            RoundOutcome::Starved {
                available: candidates.len(),
                requested,
            }
        })
    }

    /// Claims the selected parents, then breeds and submits their children.
    ///
    /// Another operator sharing the free set may have claimed some of the parents since they
    /// were drawn; the round is then skipped without claiming anything.
    fn run_round(&mut self, selection: &ParentSelection, bootstrap: bool) -> Result<RoundOutcome, Error> {
        if let Err(ClaimError::AlreadyClaimed { keys }) = self.free_keys.claim(selection.parents()) {
            tracing::warn!(
                contended = keys.len(),
                requested = selection.parents().len(),
                "Keys were claimed by another operator, skipping round"
            );
            return Ok(RoundOutcome::Contended { keys });
        }

        self.state = OperatorState::Evolving;
        let result = self.vary(selection).and_then(|()| self.submit(selection, bootstrap));
        self.state = OperatorState::Idle;

        if let Err(err) = result {
            tracing::error!(error = %err, "Variation round failed, releasing claimed keys");
            self.free_keys.release(selection.parents());
            return Err(err);
        }

        let children = selection.children();
        self.in_flight += children as i64;

        if self
            .events
            .send(VariationEvent::to_evaluate(self.id, bootstrap))
            .is_err()
        {
            tracing::debug!("No listeners for ToEvaluate");
        }

        Ok(RoundOutcome::Submitted {
            parents: selection.parents().len(),
            children,
            bootstrap,
        })
    }

    /// Gather, breed and scatter for one selection.
    fn vary(&mut self, selection: &ParentSelection) -> Result<(), Error> {
        let x = self.pool.gather(&selection.replicated_x())?;
        let y = selection
            .replicated_y()
            .map(|keys| self.pool.gather(&keys))
            .transpose()?;

        let children = self.breeder.evolve(&mut self.rng, &x, y.as_ref())?;
        self.cache.write_batch(selection.parents(), &children)?;

        Ok(())
    }

    fn submit(&self, selection: &ParentSelection, bootstrap: bool) -> Result<(), Error> {
        self.submissions
            .send(Submission {
                operator_id: self.id,
                keys: selection.parents().to_vec(),
                bootstrap,
            })
            .map_err(|_| Error::Disconnected("submission"))
    }

    /// Accounts for evaluated children and returns the new in-flight count.
    #[instrument(level = "debug", skip(self, results), fields(operator_id = %self.id, evaluator_id = %results.evaluator_id, evaluated = results.evaluated_keys.len()))]
    pub fn on_eval_results(&mut self, results: &EvalResults) -> i64 {
        self.in_flight -= results.evaluated_keys.len() as i64;

        if self.in_flight < 0 {
            tracing::warn!(
                in_flight = self.in_flight,
                evaluated = results.evaluated_keys.len(),
                evaluator_id = %results.evaluator_id,
                "More children reported as evaluated than were submitted"
            );
        }

        self.in_flight
    }

    /// Returns keys to the free set.
    #[instrument(level = "debug", skip(self, keys), fields(operator_id = %self.id, released = keys.len()))]
    pub fn on_release(&mut self, keys: &[PolicyKey]) -> usize {
        self.free_keys.release(keys)
    }

    /// Broadcasts `Stopped` once and stops all further rounds.
    #[instrument(level = "info", skip(self), fields(operator_id = %self.id))]
    pub fn on_stop(&mut self) {
        if self.state == OperatorState::Stopped {
            return;
        }

        self.state = OperatorState::Stopped;
        if self.events.send(VariationEvent::stopped(self.id)).is_err() {
            tracing::debug!("No listeners for Stopped");
        }
        tracing::info!(in_flight = self.in_flight, "Variation operator stopped");
    }
}
