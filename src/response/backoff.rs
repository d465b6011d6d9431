//! # Exponential backoff before restarting a process.
//!
//! [`ExponentialBackoff`] produces growing wait intervals:
//! - the interval starts at [`BackoffPolicy::initial_interval`] and is multiplied
//!   by [`BackoffPolicy::multiplier`] after every call, capped at
//!   [`BackoffPolicy::max_interval`];
//! - each returned wait is the current interval randomized by
//!   ±[`BackoffPolicy::randomization_factor`];
//! - once the time spent since the generator was created plus the next wait
//!   exceeds [`BackoffPolicy::max_elapsed_time`], it stops.
//!
//! Elapsed time is read from the process [`Clock`], so virtual time in tests
//! drives the budget as well.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;

use crate::{
    context::{Clock, Context},
    error::ProcessError,
    log,
    process::Process,
    response::{Action, Responder, Response},
};

/// Tuning of an [`ExponentialBackoff`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// First wait interval.
    pub initial_interval: Duration,
    /// Spread applied around each interval (`0.5` means ±50%). Zero disables jitter.
    pub randomization_factor: f64,
    /// Growth factor between intervals.
    pub multiplier: f64,
    /// Cap on the un-randomized interval.
    pub max_interval: Duration,
    /// Total budget after which the generator stops. Zero never stops.
    pub max_elapsed_time: Duration,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `initial_interval = 500ms`;
    /// - `randomization_factor = 0.5`;
    /// - `multiplier = 1.5`;
    /// - `max_interval = 60s`;
    /// - `max_elapsed_time = 15min`.
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            randomization_factor: 0.5,
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(15 * 60),
        }
    }
}

impl BackoffPolicy {
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_max_elapsed_time(mut self, elapsed: Duration) -> Self {
        self.max_elapsed_time = elapsed;
        self
    }
}

/// Stateful generator of backoff intervals.
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    current_interval: Duration,
    started_at: Instant,
}

impl ExponentialBackoff {
    pub fn new(policy: BackoffPolicy, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            policy,
            clock,
            current_interval: policy.initial_interval,
            started_at,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Restarts both the interval sequence and the elapsed-time budget.
    pub fn reset(&mut self) {
        self.current_interval = self.policy.initial_interval;
        self.started_at = self.clock.now();
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// Returns the next wait, or `None` once the elapsed-time budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        let next = randomize(self.policy.randomization_factor, self.current_interval);
        self.increment();

        let max = self.policy.max_elapsed_time;
        if !max.is_zero() && elapsed.saturating_add(next) > max {
            return None;
        }
        Some(next)
    }

    fn increment(&mut self) {
        let max_secs = self.policy.max_interval.as_secs_f64();
        let next_secs = self.current_interval.as_secs_f64() * self.policy.multiplier;
        self.current_interval = if !next_secs.is_finite() || next_secs >= max_secs {
            self.policy.max_interval
        } else {
            Duration::from_secs_f64(next_secs.max(0.0))
        };
    }
}

/// Picks a value in `[interval - factor * interval, interval + factor * interval]`.
fn randomize(factor: f64, interval: Duration) -> Duration {
    if factor <= 0.0 || interval.is_zero() {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let delta = factor * secs;
    let low = (secs - delta).max(0.0);
    let high = secs + delta;
    Duration::from_secs_f64(rand::rng().random_range(low..=high))
}

/// Waits an exponentially growing interval, then restarts.
///
/// Closes with [`ProcessError::BackoffElapsed`] once the policy's time budget
/// is spent, or with [`ProcessError::BackoffInterrupted`] if the process is
/// cancelled while waiting.
pub fn backoff(policy: BackoffPolicy) -> Response {
    Response::new(move |process: &Process| BackoffResponder {
        backoff: ExponentialBackoff::new(policy, Arc::clone(process.clock())),
    })
}

struct BackoffResponder {
    backoff: ExponentialBackoff,
}

#[async_trait]
impl Responder for BackoffResponder {
    async fn respond(
        &mut self,
        ctx: &Context,
        _err: Option<ProcessError>,
    ) -> (Action, Option<ProcessError>) {
        let Some(wait) = self.backoff.next_backoff() else {
            let max_elapsed = self.backoff.policy().max_elapsed_time;
            return (Action::Close, Some(ProcessError::BackoffElapsed { max_elapsed }));
        };

        log::debug!(?wait, elapsed = ?self.backoff.elapsed(), "backing off before restart");
        if !ctx.sleep(wait).await {
            return (Action::Close, Some(ProcessError::BackoffInterrupted));
        }
        (Action::Restart, None)
    }
}
