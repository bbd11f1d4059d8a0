/// Inactivity controller: accumulates idle time in whole poll intervals and
/// hands off to the termination procedure when the timeout is reached.
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::MonitorConfig;
use crate::probes::Sampler;
use crate::terminate::{Terminate, TerminationOutcome};

/// Accumulated idle time. Single owner (the controller); always a
/// non-negative multiple of the poll interval.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub idle_accumulated_secs: u64,
}

/// What the controller decided for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Continue,
    /// Idle time reached the timeout; run the termination procedure and
    /// stop monitoring.
    Terminate,
}

/// Progress logs while idle are emitted every this many accumulated
/// seconds, independent of the poll interval, to keep the log readable.
const IDLE_PROGRESS_LOG_SECS: u64 = 15;

pub struct Controller {
    idle_timeout_secs: u64,
    poll_interval_secs: u64,
    state: MonitorState,
}

impl Controller {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            idle_timeout_secs: config.idle_timeout_secs,
            poll_interval_secs: config.poll_interval_secs,
            state: MonitorState::default(),
        }
    }

    pub fn idle_secs(&self) -> u64 {
        self.state.idle_accumulated_secs
    }

    /// One transition of the Monitoring state. Activity resets the counter;
    /// an idle tick advances it by one poll interval.
    pub fn tick(&mut self, active: bool) -> TickDecision {
        if active {
            if self.state.idle_accumulated_secs > 0 {
                tracing::info!(
                    idle_secs = self.state.idle_accumulated_secs,
                    "activity observed, resetting idle counter"
                );
            }
            self.state.idle_accumulated_secs = 0;
            return TickDecision::Continue;
        }

        self.state.idle_accumulated_secs += self.poll_interval_secs;

        if self.state.idle_accumulated_secs % IDLE_PROGRESS_LOG_SECS == 0 {
            tracing::info!(
                idle_secs = self.state.idle_accumulated_secs,
                timeout_secs = self.idle_timeout_secs,
                "no activity detected"
            );
        }

        if self.state.idle_accumulated_secs >= self.idle_timeout_secs {
            tracing::warn!(
                idle_secs = self.state.idle_accumulated_secs,
                timeout_secs = self.idle_timeout_secs,
                "inactivity timeout reached, shutting down"
            );
            TickDecision::Terminate
        } else {
            TickDecision::Continue
        }
    }

    /// The monitoring loop. Strictly sequential: sample, update state,
    /// terminate if due. Runs until the timeout fires (returning the
    /// termination outcome) or `cancel` flips (returning `None`; production
    /// never cancels, tests do).
    pub async fn run<T: Terminate>(
        mut self,
        sampler: &mut Sampler,
        procedure: &mut T,
        mut cancel: watch::Receiver<bool>,
    ) -> Option<TerminationOutcome> {
        let period = Duration::from_secs(self.poll_interval_secs);
        // First tick after one full interval, so each tick stands for one
        // interval of elapsed time.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let active = sampler.sample();
                    if self.tick(active) == TickDecision::Terminate {
                        // Terminating is terminal: exactly one procedure
                        // run, then the loop ends whatever the outcome.
                        return Some(procedure.execute().await);
                    }
                }
                _ = cancel.changed() => {
                    tracing::info!("monitor loop cancelled");
                    return None;
                }
            }
        }
    }
}
