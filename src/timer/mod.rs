//! Countdown Timer
//!
//! A 1 Hz monotonic countdown driving the session lifecycle:
//! - warning-threshold edge detection (latched, fires once per session)
//! - expiry event when the count reaches zero
//! - pause/resume without losing the count
//! - authoritative overwrite from heartbeat sync, extension, and
//!   cross-context timer updates
//!
//! State machine: `Idle → Running ⇄ Paused → Stopped`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

/// Callback fired once when the count first falls inside the warning
/// threshold; receives the remaining seconds at the edge
pub type WarningCallback = Arc<dyn Fn(u64) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback fired exactly once when the count reaches zero
pub type EndCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Callbacks installed at construction
#[derive(Clone, Default)]
pub struct TimerCallbacks {
    pub on_warning: Option<WarningCallback>,
    pub on_end: Option<EndCallback>,
}

/// Countdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

struct TimerInner {
    remaining: u64,
    warning_shown: bool,
    state: TimerState,
    /// Incremented on every (re)start so a superseded tick task exits
    /// instead of double-decrementing
    epoch: u64,
}

enum TickOutcome {
    /// Timer was stopped or superseded; the task exits
    Exit,
    /// Paused, or no edge crossed
    Nothing,
    Warning(u64),
    End,
}

/// 1 Hz countdown with warning latch and authoritative overwrite
pub struct CountdownTimer {
    inner: Arc<Mutex<TimerInner>>,
    warning_threshold: u64,
    callbacks: TimerCallbacks,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CountdownTimer {
    /// Creates an idle timer holding `remaining_seconds`
    pub fn new(remaining_seconds: u64, warning_threshold: u64, callbacks: TimerCallbacks) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimerInner {
                remaining: remaining_seconds,
                warning_shown: false,
                state: TimerState::Idle,
                epoch: 0,
            })),
            warning_threshold,
            callbacks,
            task: Mutex::new(None),
        }
    }

    /// Starts the countdown (`Idle | Stopped → Running`)
    ///
    /// A second `start` while running is a no-op; starting a paused
    /// timer is refused (use [`resume`](Self::resume)).
    pub fn start(&self) {
        let epoch = {
            let mut inner = self.inner.lock().expect("timer lock poisoned");
            match inner.state {
                TimerState::Running => {
                    tracing::warn!("Timer start ignored: already running");
                    return;
                }
                TimerState::Paused => {
                    tracing::warn!("Timer start ignored: timer is paused, use resume");
                    return;
                }
                TimerState::Idle | TimerState::Stopped => {
                    inner.state = TimerState::Running;
                    inner.epoch += 1;
                    inner.epoch
                }
            }
        };

        let inner = Arc::clone(&self.inner);
        let callbacks = self.callbacks.clone();
        let threshold = self.warning_threshold;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // the first tick of a fresh interval completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let outcome = {
                    let mut state = inner.lock().expect("timer lock poisoned");
                    if state.epoch != epoch || state.state == TimerState::Stopped {
                        TickOutcome::Exit
                    } else if state.state != TimerState::Running {
                        TickOutcome::Nothing
                    } else {
                        state.remaining = state.remaining.saturating_sub(1);
                        if state.remaining == 0 {
                            state.state = TimerState::Stopped;
                            TickOutcome::End
                        } else if !state.warning_shown && state.remaining <= threshold {
                            state.warning_shown = true;
                            TickOutcome::Warning(state.remaining)
                        } else {
                            TickOutcome::Nothing
                        }
                    }
                };

                match outcome {
                    TickOutcome::Exit => break,
                    TickOutcome::Nothing => {}
                    TickOutcome::Warning(remaining) => {
                        tracing::info!(remaining_seconds = remaining, "Warning threshold reached");
                        if let Some(cb) = &callbacks.on_warning {
                            cb(remaining).await;
                        }
                    }
                    TickOutcome::End => {
                        tracing::info!("Countdown reached zero");
                        if let Some(cb) = &callbacks.on_end {
                            cb().await;
                        }
                        break;
                    }
                }
            }
        });

        *self.task.lock().expect("timer lock poisoned") = Some(handle);
    }

    /// `Running → Paused`; anything else is a logged no-op
    pub fn pause(&self) {
        let mut inner = self.inner.lock().expect("timer lock poisoned");
        if inner.state == TimerState::Running {
            inner.state = TimerState::Paused;
            tracing::debug!(remaining_seconds = inner.remaining, "Timer paused");
        } else {
            tracing::warn!(state = ?inner.state, "Timer pause ignored");
        }
    }

    /// `Paused → Running`, only while time remains
    pub fn resume(&self) {
        let mut inner = self.inner.lock().expect("timer lock poisoned");
        if inner.state == TimerState::Paused && inner.remaining > 0 {
            inner.state = TimerState::Running;
            tracing::debug!(remaining_seconds = inner.remaining, "Timer resumed");
        } else {
            tracing::warn!(state = ?inner.state, "Timer resume ignored");
        }
    }

    /// `* → Stopped`; the tick task exits on its next tick
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("timer lock poisoned");
        inner.state = TimerState::Stopped;
    }

    /// Authoritative overwrite: sets the count to `max(0, n)` without
    /// changing the run state
    ///
    /// Ignored once the timer is stopped so a late cross-context update
    /// cannot resurrect an ended countdown. Does not fire the warning
    /// even when the overwrite crosses the threshold downward; the next
    /// natural tick does.
    pub fn update_remaining(&self, remaining_seconds: i64) {
        let mut inner = self.inner.lock().expect("timer lock poisoned");
        if inner.state == TimerState::Stopped {
            tracing::debug!("Remaining-time update ignored: timer is stopped");
            return;
        }
        inner.remaining = remaining_seconds.max(0) as u64;
        tracing::debug!(remaining_seconds = inner.remaining, "Remaining time overwritten");
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.inner.lock().expect("timer lock poisoned").remaining
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().expect("timer lock poisoned").state == TimerState::Running
    }

    pub fn state(&self) -> TimerState {
        self.inner.lock().expect("timer lock poisoned").state
    }

    pub fn warning_shown(&self) -> bool {
        self.inner.lock().expect("timer lock poisoned").warning_shown
    }

    /// Remaining time formatted for display: `mm:ss`, or `hh:mm:ss`
    /// once a full hour remains
    pub fn format_remaining(&self) -> String {
        let total = self.remaining_seconds();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().expect("timer lock poisoned").take() {
            handle.abort();
        }
    }
}
