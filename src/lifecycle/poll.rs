use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::PlaygroundConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` keeps polling until the backend reports a terminal status.
    pub max_duration: Option<Duration>,
}

impl PollSettings {
    pub fn from_config(config: &PlaygroundConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_duration: config.max_poll_duration,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&PlaygroundConfig::default())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    Due,
    Expired(Duration),
}

/// Repeating timer plus the token it polls for.
///
/// Owned by exactly one in-flight lifecycle. The first tick fires one full
/// interval after creation. Cancelling releases the timer; cancelling again
/// is a no-op.
#[derive(Debug)]
pub struct PollHandle {
    token: String,
    ticker: Option<Interval>,
    started: Instant,
    deadline: Option<Instant>,
    ticks: u32,
}

impl PollHandle {
    pub fn start(token: String, settings: &PollSettings) -> Self {
        let started = Instant::now();
        let mut ticker = interval_at(started + settings.interval, settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            token,
            ticker: Some(ticker),
            started,
            deadline: settings.max_duration.map(|max| started + max),
            ticks: 0,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    /// Waits for the next tick, or for the deadline if that comes first.
    /// A cancelled handle reports expiry immediately.
    pub async fn next_tick(&mut self) -> Tick {
        let Some(ticker) = self.ticker.as_mut() else {
            return Tick::Expired(self.started.elapsed());
        };
        let tick = match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => Tick::Expired(deadline - self.started),
                    _ = ticker.tick() => Tick::Due,
                }
            }
            None => {
                ticker.tick().await;
                Tick::Due
            }
        };
        if tick == Tick::Due {
            self.ticks += 1;
        }
        tick
    }

    /// Returns `true` only for the call that actually released the timer.
    pub fn cancel(&mut self) -> bool {
        self.ticker.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(interval_ms: u64, max_ms: Option<u64>) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(interval_ms),
            max_duration: max_ms.map(Duration::from_millis),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_interval_starting_after_one_interval() {
        let start = Instant::now();
        let mut handle = PollHandle::start("tok".to_string(), &settings(3000, None));

        assert_eq!(handle.next_tick().await, Tick::Due);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
        assert_eq!(handle.next_tick().await, Tick::Due);
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
        assert_eq!(handle.ticks(), 2);
        assert_eq!(handle.token(), "tok");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_over_late_ticks() {
        let mut handle = PollHandle::start("tok".to_string(), &settings(3000, Some(5000)));
        assert_eq!(handle.next_tick().await, Tick::Due);
        assert_eq!(
            handle.next_tick().await,
            Tick::Expired(Duration::from_millis(5000))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let mut handle = PollHandle::start("tok".to_string(), &settings(10, None));
        assert!(handle.is_active());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!handle.is_active());
        assert!(matches!(handle.next_tick().await, Tick::Expired(_)));
    }
}
