//! # Scheduled Tasks
//!
//! Named, cancelable timer slots. A [`ScheduledTask`] holds at most one
//! running timer: starting a new one cancels whatever the slot held before,
//! and dropping the slot cancels it too. Timer bodies are expected to be
//! short (typically posting a message into an actor's inbox).
//!
//! ```ignore
//! use core_runtime::tasks::ScheduledTask;
//! use std::time::Duration;
//!
//! let mut watchdog = ScheduledTask::new("watchdog");
//! watchdog.start_repeating(Duration::from_secs(15), move || {
//!     let tx = tx.clone();
//!     async move { tx.send(Input::WatchdogFired).is_ok() }
//! });
//! // later, once playback is confirmed
//! watchdog.cancel();
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct ActiveTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Singleton timer slot.
pub struct ScheduledTask {
    name: &'static str,
    active: Option<ActiveTask>,
}

impl ScheduledTask {
    pub fn new(name: &'static str) -> Self {
        Self { name, active: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `fut` once after `delay`, replacing any task in this slot.
    pub fn start_once<F>(&mut self, delay: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    trace!(task = name, "Scheduled task cancelled before firing");
                }
                _ = async {
                    sleep(delay).await;
                    fut.await;
                } => {}
            }
        });

        self.active = Some(ActiveTask { token, handle });
    }

    /// Call `tick` every `period`, first after one full period, replacing any
    /// task in this slot. The loop ends when `tick` resolves to `false` or the
    /// slot is cancelled.
    pub fn start_repeating<F, Fut>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.cancel();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        trace!(task = name, "Repeating task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !tick().await {
                            trace!(task = name, "Repeating task finished");
                            break;
                        }
                    }
                }
            }
        });

        self.active = Some(ActiveTask { token, handle });
    }

    /// Cancel the task in this slot. Returns `true` if one was still pending.
    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                let was_pending = !active.handle.is_finished();
                active.token.cancel();
                active.handle.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Whether a timer is scheduled and has not yet completed.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}
