use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tick {
    Fire(Instant),
    Shutdown,
}

/// Fixed period, self-rearming tick source.
///
/// Only one wake-up is ever armed. It is armed from the instant a tick fires,
/// so a cycle that runs past its period makes the next tick fire as soon as
/// the caller waits again instead of queueing missed ticks.
pub struct Scheduler {
    period: Duration,
    next_tick: Option<Instant>,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Scheduler {
            period,
            next_tick: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn arm_next_tick(&mut self, from: Instant) {
        self.next_tick = Some(from + self.period);
    }

    /// Waits for the armed tick, or fires right away when nothing was armed yet.
    pub async fn wait_for_tick(&mut self, shutdown: &CancellationToken) -> Tick {
        if shutdown.is_cancelled() {
            return Tick::Shutdown;
        }

        let deadline = self.next_tick.unwrap_or_else(Instant::now);

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Tick::Shutdown,
            _ = sleep_until(deadline) => {
                let fired = Instant::now();
                if fired > deadline {
                    debug!("Tick fired {:?} late, previous cycle overran", fired - deadline);
                }
                self.arm_next_tick(fired);
                Tick::Fire(fired)
            }
        }
    }
}
