//! One-shot, cancellable timers for Quizhall room actors.
//!
//! A room has at most one pending deadline at a time: the pre-question
//! countdown, the question deadline, the auto-advance delay, or the
//! grace period before a finished room closes. [`Scheduler`] holds that
//! single deadline together with an [`Epoch`]. Every arm or cancel bumps
//! the epoch, so a firing that was already in flight when the room moved
//! on can be recognized as stale and ignored.
//!
//! # Integration
//!
//! The scheduler sits inside the room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fired = scheduler.fired() => {
//!             if scheduler.is_current(fired.epoch) {
//!                 session.on_timer(fired.kind);
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! When nothing is armed, [`Scheduler::fired`] pends forever and the
//! select loop only reacts to commands.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Limits applied to every arm request.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest delay accepted. Longer requests are clamped with a warning.
    pub max_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(60 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Epoch and firing
// ---------------------------------------------------------------------------

/// Generation counter of a [`Scheduler`]. Bumped by every arm and cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(u64);

impl Epoch {
    /// Returns the raw counter value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch-{}", self.0)
    }
}

/// A deadline that elapsed, returned by [`Scheduler::fired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired<K> {
    /// Epoch the timer was armed under.
    pub epoch: Epoch,
    /// What the timer was for.
    pub kind: K,
    /// How far past the deadline the actor woke up.
    pub late_by: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Armed<K> {
    kind: K,
    epoch: u64,
    armed_at: Instant,
    deadline: Instant,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A single re-armable deadline owned by one room actor.
///
/// `K` labels what the deadline is for; it comes back in [`Fired::kind`].
pub struct Scheduler<K> {
    config: SchedulerConfig,
    epoch: u64,
    armed: Option<Armed<K>>,
}

impl<K: Copy + fmt::Debug> Scheduler<K> {
    /// Creates a disarmed scheduler with default limits.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a disarmed scheduler with the given limits.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            epoch: 0,
            armed: None,
        }
    }

    /// Arms the scheduler to fire `after` from now, replacing any pending
    /// deadline. Returns the new epoch.
    pub fn arm(&mut self, kind: K, after: Duration) -> Epoch {
        let after = if after > self.config.max_delay {
            warn!(
                ?kind,
                requested_ms = after.as_millis() as u64,
                max_ms = self.config.max_delay.as_millis() as u64,
                "timer delay exceeds maximum, clamping"
            );
            self.config.max_delay
        } else {
            after
        };
        self.arm_at(kind, Instant::now() + after)
    }

    /// Arms the scheduler for an absolute deadline, replacing any pending
    /// one. A deadline in the past fires on the next poll.
    pub fn arm_at(&mut self, kind: K, deadline: Instant) -> Epoch {
        if let Some(previous) = self.armed {
            trace!(kind = ?previous.kind, "replacing pending timer");
        }
        self.epoch += 1;
        self.armed = Some(Armed {
            kind,
            epoch: self.epoch,
            armed_at: Instant::now(),
            deadline,
        });
        debug!(
            ?kind,
            epoch = self.epoch,
            in_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
            "timer armed"
        );
        Epoch(self.epoch)
    }

    /// Disarms the scheduler. Returns the epoch of the cancelled deadline,
    /// or `None` if nothing was pending. The epoch is bumped either way.
    pub fn cancel(&mut self) -> Option<Epoch> {
        self.epoch += 1;
        let cancelled = self.armed.take()?;
        debug!(kind = ?cancelled.kind, epoch = cancelled.epoch, "timer cancelled");
        Some(Epoch(cancelled.epoch))
    }

    /// Waits for the pending deadline.
    ///
    /// Pends forever when disarmed. Fires at most once per arm: the
    /// scheduler is disarmed before this returns. Dropping the future
    /// before it resolves leaves the deadline pending, so it is safe to
    /// use as a `tokio::select!` branch.
    pub async fn fired(&mut self) -> Fired<K> {
        let Some(armed) = self.armed else {
            return std::future::pending().await;
        };

        time::sleep_until(armed.deadline).await;

        self.armed = None;
        let late_by = Instant::now().saturating_duration_since(armed.deadline);
        trace!(kind = ?armed.kind, epoch = armed.epoch, ?late_by, "timer fired");
        Fired {
            epoch: Epoch(armed.epoch),
            kind: armed.kind,
            late_by,
        }
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// The current epoch.
    pub fn current_epoch(&self) -> Epoch {
        Epoch(self.epoch)
    }

    /// Whether `epoch` is still the scheduler's current epoch, i.e. nothing
    /// was armed or cancelled since it was issued.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        epoch.0 == self.epoch
    }

    /// What the pending deadline is for.
    pub fn armed_kind(&self) -> Option<K> {
        self.armed.map(|a| a.kind)
    }

    /// Time left until the pending deadline, measured now.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }

    /// Time since the pending deadline was armed.
    pub fn elapsed(&self) -> Option<Duration> {
        self.armed.map(|a| a.armed_at.elapsed())
    }
}

impl<K: Copy + fmt::Debug> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the Unix epoch. Used for `start_time` and
/// envelope timestamps; never used to decide a deadline.
pub fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
