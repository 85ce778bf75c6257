//! Periodic quota polling that keeps the portal session alive.

use crate::portal::Portal;
use crate::session::{PollReport, PollStep, SessionController, Termination};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveMode {
    Normal,
    Fast,
}

impl KeepAliveMode {
    pub fn label(&self) -> &'static str {
        match self {
            KeepAliveMode::Normal => "normal",
            KeepAliveMode::Fast => "fast",
        }
    }
}

/// Why the keep-alive loop returned without terminating the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveExit {
    /// The portal dropped the session; log in again before resuming.
    SessionLost,
}

pub struct KeepAliveScheduler {
    mode: KeepAliveMode,
    interval: Duration,
    min_wait: Duration,
}

impl KeepAliveScheduler {
    pub fn new(mode: KeepAliveMode, interval: Duration, min_wait: Duration) -> Self {
        Self {
            mode,
            interval,
            min_wait,
        }
    }

    /// Scheduler for `mode` using the controller's configured intervals.
    pub fn for_controller<P: Portal>(mode: KeepAliveMode, controller: &SessionController<P>) -> Self {
        let config = controller.config();
        let interval = match mode {
            KeepAliveMode::Normal => config.keep_alive_interval,
            KeepAliveMode::Fast => config.fast_keep_alive_interval,
        };
        Self::new(mode, interval, config.min_tick_wait)
    }

    pub fn mode(&self) -> KeepAliveMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait before the next tick, counted from the start of the last one.
    pub fn next_wait(&self, tick_elapsed: Duration) -> Duration {
        self.interval
            .saturating_sub(tick_elapsed)
            .max(self.min_wait)
    }

    /// Polls immediately, then once per interval, until the session is lost,
    /// the retry budget runs out, or the run is cancelled. `on_tick` sees
    /// every successful poll.
    pub fn run<P: Portal>(
        &self,
        controller: &mut SessionController<P>,
        mut on_tick: impl FnMut(&PollReport),
    ) -> Result<KeepAliveExit, Termination> {
        log::info!(
            "Keep-alive started in {} mode, polling every {}s.",
            self.mode.label(),
            self.interval.as_secs()
        );
        loop {
            let started = Instant::now();
            match controller.poll_once() {
                PollStep::Polled(report) => on_tick(&report),
                PollStep::Failed { attempt, max } => {
                    log::warn!("Keep-alive tick failed ({}/{}).", attempt, max)
                }
                PollStep::SessionLost => return Ok(KeepAliveExit::SessionLost),
                PollStep::Exhausted(termination) => return Err(termination),
                PollStep::Cancelled => return Err(controller.terminate(Termination::Cancelled)),
            }

            let wait = self.next_wait(started.elapsed());
            log::debug!("Next keep-alive tick in {:.1}s.", wait.as_secs_f64());
            if controller.cancel_token().wait(wait) {
                log::info!("Keep-alive stopped.");
                return Err(controller.terminate(Termination::Cancelled));
            }
        }
    }
}
