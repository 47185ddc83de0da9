use std::{future::Future, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::UserId;

/// Shortest accepted poll period. `tokio::time::interval` panics on zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { conversation: UserId },
}

struct PollTask {
    conversation: UserId,
    stop: CancellationToken,
}

/// Owns the single poll task. Arming a new conversation cancels the old
/// task first, so at most one interval is live at any time.
#[derive(Default)]
pub struct Poller {
    running: Option<PollTask>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PollState {
        match &self.running {
            Some(running) => PollState::Polling { conversation: running.conversation.clone() },
            None => PollState::Idle,
        }
    }

    /// Runs `tick` every `every`, first one after a full interval. A tick that
    /// is already running when the task is cancelled runs to completion; its
    /// caller is expected to drop results that no longer apply.
    ///
    /// Periods below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn arm<F, Fut>(&mut self, conversation: UserId, every: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.disarm();

        if every < MIN_POLL_INTERVAL {
            warn!(requested = ?every, using = ?MIN_POLL_INTERVAL, "poll interval too short");
        }
        let every = every.max(MIN_POLL_INTERVAL);

        let stop = CancellationToken::new();
        let stop_child = stop.child_token();
        let label = conversation.clone();
        tokio::spawn(async move {
            debug!(conversation = %label, "poll task started");
            let mut interval = time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_child.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            debug!(conversation = %label, "poll task stopped");
        });

        self.running = Some(PollTask { conversation, stop });
    }

    pub fn disarm(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.cancel();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.disarm();
    }
}
