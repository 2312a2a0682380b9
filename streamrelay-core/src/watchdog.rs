//! Idle-timeout watchdog

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

/// Resettable deadline for a relayed stream
///
/// Armed on creation. The relay calls [`reset`](Self::reset) on every inbound
/// event and races [`expired`](Self::expired) against the upstream read; if
/// the deadline passes first the generation is considered stalled.
#[derive(Debug)]
pub struct IdleWatchdog {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl IdleWatchdog {
    /// Arm a watchdog that fires `timeout` from now
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sleep: Box::pin(sleep(timeout)),
        }
    }

    /// Push the deadline to `timeout` from now
    pub fn reset(&mut self) {
        let deadline = Instant::now() + self.timeout;
        self.sleep.as_mut().reset(deadline);
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.sleep.deadline()
    }

    /// Resolves once the current deadline has passed
    ///
    /// Cancel safe: dropping the future before it resolves leaves the
    /// deadline armed.
    pub async fn expired(&mut self) {
        self.sleep.as_mut().await
    }
}
