use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Controls when the variation operator breeds and how large its batches are.
///
/// # Configuration Parameters
///
/// - `watermark`: the operator only breeds while fewer policies than this are in flight
/// - `random_init`: archive size up to which rounds run in bootstrap mode
/// - `random_init_batch`: number of parents per bootstrap round
/// - `steady_batch`: number of parents per steady-state round
///
/// # Examples
///
/// ```rust
/// use fx_illumination::models::{Schedule, ScheduleDecision};
///
/// // 100 evaluator agents, 500 elites before leaving bootstrap mode,
/// // 100 parents per bootstrap round and half of 100 in steady state.
/// let schedule = Schedule::new(100, 500, 100, 100, 0.5);
///
/// assert_eq!(schedule.should_breed(0, 0), ScheduleDecision::Breed { bootstrap: true });
/// assert_eq!(schedule.should_breed(0, 501), ScheduleDecision::Breed { bootstrap: false });
/// assert_eq!(schedule.should_breed(200, 0), ScheduleDecision::Wait);
/// assert_eq!(schedule.batch_size(false), 50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub watermark: i64,
    pub random_init: usize,
    pub random_init_batch: usize,
    pub steady_batch: usize,
}

/// Decision returned by [`Schedule::should_breed`] on every timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Enough policies are in flight to keep the evaluators busy.
    Wait,
    /// Run one round, sampling parents from the whole free pool when `bootstrap` is set and
    /// from the archive's elites otherwise.
    Breed { bootstrap: bool },
}

impl Schedule {
    /// Derives the schedule from the operator settings.
    ///
    /// The watermark is twice the number of evaluator agents and the steady-state batch is
    /// `eval_batch_size * proportion_evo`, rounded to the nearest integer.
    pub fn new(
        num_agents: usize,
        random_init: usize,
        random_init_batch: usize,
        eval_batch_size: usize,
        proportion_evo: f64,
    ) -> Self {
        Self {
            watermark: 2 * num_agents as i64,
            random_init,
            random_init_batch,
            steady_batch: (eval_batch_size as f64 * proportion_evo).round() as usize,
        }
    }

    #[instrument(level = "debug", fields(watermark = self.watermark))]
    pub fn should_breed(&self, in_flight: i64, elites: usize) -> ScheduleDecision {
        if in_flight >= self.watermark {
            return ScheduleDecision::Wait;
        }

        ScheduleDecision::Breed {
            bootstrap: elites <= self.random_init,
        }
    }

    pub fn batch_size(&self, bootstrap: bool) -> usize {
        if bootstrap {
            self.random_init_batch
        } else {
            self.steady_batch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_waits_at_the_watermark() {
        let schedule = Schedule::new(4, 10, 8, 10, 0.5);

        assert_eq!(schedule.watermark, 8);
        assert_eq!(schedule.should_breed(8, 0), ScheduleDecision::Wait);
        assert_eq!(schedule.should_breed(9, 0), ScheduleDecision::Wait);
        assert_eq!(
            schedule.should_breed(7, 0),
            ScheduleDecision::Breed { bootstrap: true }
        );
    }

    #[test]
    fn it_breeds_when_the_counter_went_negative() {
        let schedule = Schedule::new(4, 10, 8, 10, 0.5);
        assert_eq!(
            schedule.should_breed(-3, 0),
            ScheduleDecision::Breed { bootstrap: true }
        );
    }

    #[test]
    fn it_leaves_bootstrap_once_the_archive_exceeds_random_init() {
        let schedule = Schedule::new(4, 10, 8, 10, 0.5);

        assert_eq!(
            schedule.should_breed(0, 10),
            ScheduleDecision::Breed { bootstrap: true }
        );
        assert_eq!(
            schedule.should_breed(0, 11),
            ScheduleDecision::Breed { bootstrap: false }
        );
    }

    #[test]
    fn it_sizes_batches_per_mode() {
        let schedule = Schedule::new(4, 10, 8, 15, 0.5);

        assert_eq!(schedule.batch_size(true), 8);
        // 7.5 rounds half away from zero.
        assert_eq!(schedule.batch_size(false), 8);
        assert_eq!(Schedule::new(4, 10, 8, 15, 0.0).batch_size(false), 0);
    }
}
