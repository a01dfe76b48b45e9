//! Smart timer
//!
//! A single-slot kitchen countdown started from a duration found in a recipe
//! step. The timer itself never spawns anything: it records a deadline and
//! the session schedules one deferred expiry check per running episode.
//!
//! ```text
//!   start ──► RUNNING ──pause──► PAUSED
//!                │  ◄──resume──────┘
//!                │ deadline reached
//!                ▼
//!              DONE   (terminal, cleared by stopping the timer)
//! ```
//!
//! A paused timer never expires; its remaining time is frozen.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::voice::contains_cjk;

/// Internal timer status
///
/// Running timers carry an absolute deadline, paused timers carry the
/// remaining duration captured at pause time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Running { deadline: Instant },
    Paused { remaining: Duration },
    Done,
}

/// Timer phase as shown to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Running,
    Paused,
    Done,
}

impl TimerStatus {
    pub fn phase(&self) -> TimerPhase {
        match self {
            TimerStatus::Running { .. } => TimerPhase::Running,
            TimerStatus::Paused { .. } => TimerPhase::Paused,
            TimerStatus::Done => TimerPhase::Done,
        }
    }
}

/// A pausable countdown with a human-readable label
#[derive(Debug, Clone, PartialEq)]
pub struct SmartTimer {
    total_seconds: f64,
    label: String,
    status: TimerStatus,
}

impl SmartTimer {
    /// Create a running timer, or `None` if `seconds` is not a finite positive
    /// number (or too large to schedule).
    pub fn start(seconds: f64, label: impl Into<String>, now: Instant) -> Option<Self> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return None;
        }
        let length = Duration::try_from_secs_f64(seconds).ok()?;
        let deadline = now.checked_add(length)?;

        Some(Self {
            total_seconds: seconds,
            label: label.into(),
            status: TimerStatus::Running { deadline },
        })
    }

    /// Length the timer was created with, in seconds
    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn phase(&self) -> TimerPhase {
        self.status.phase()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, TimerStatus::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.status, TimerStatus::Paused { .. })
    }

    pub fn is_done(&self) -> bool {
        self.status == TimerStatus::Done
    }

    /// Deadline of a running timer
    pub fn deadline(&self) -> Option<Instant> {
        match self.status {
            TimerStatus::Running { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Freeze the countdown. Returns false unless the timer was running.
    pub fn pause(&mut self, now: Instant) -> bool {
        let TimerStatus::Running { deadline } = self.status else {
            return false;
        };
        let remaining = deadline.saturating_duration_since(now);
        self.status = TimerStatus::Paused { remaining };
        tracing::debug!("Timer '{}' paused with {:?} left", self.label, remaining);
        true
    }

    /// Restart the countdown from the frozen remainder. Returns false unless
    /// the timer was paused.
    pub fn resume(&mut self, now: Instant) -> bool {
        let TimerStatus::Paused { remaining } = self.status else {
            return false;
        };
        let Some(deadline) = now.checked_add(remaining) else {
            return false;
        };
        self.status = TimerStatus::Running { deadline };
        tracing::debug!("Timer '{}' resumed with {:?} left", self.label, remaining);
        true
    }

    /// Pause a running timer or resume a paused one. A finished timer stays
    /// finished.
    pub fn toggle(&mut self, now: Instant) -> bool {
        match self.status {
            TimerStatus::Running { .. } => self.pause(now),
            TimerStatus::Paused { .. } => self.resume(now),
            TimerStatus::Done => false,
        }
    }

    /// Move a running timer whose deadline has passed to `Done`
    ///
    /// Returns true only on the call that performs the transition.
    pub fn check_expiry(&mut self, now: Instant) -> bool {
        match self.status {
            TimerStatus::Running { deadline } if deadline <= now => {
                self.status = TimerStatus::Done;
                tracing::info!("Timer '{}' finished", self.label);
                true
            }
            _ => false,
        }
    }

    /// Time left on the countdown
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.status {
            TimerStatus::Running { deadline } => deadline.saturating_duration_since(now),
            TimerStatus::Paused { remaining } => remaining,
            TimerStatus::Done => Duration::ZERO,
        }
    }

    /// Fraction of the countdown already elapsed, in `0.0..=1.0`
    pub fn progress(&self, now: Instant) -> f64 {
        let remaining = self.remaining(now).as_secs_f64();
        (1.0 - remaining / self.total_seconds).clamp(0.0, 1.0)
    }

    /// Phrase spoken when the timer finishes
    pub fn completion_announcement(&self) -> String {
        completion_announcement(&self.label)
    }

    pub fn snapshot(&self, now: Instant) -> TimerSnapshot {
        TimerSnapshot {
            total_seconds: self.total_seconds,
            label: self.label.clone(),
            status: self.phase(),
            remaining_ms: u64::try_from(self.remaining(now).as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Announcement for a finished timer, phrased by the script of its label
///
/// Labels containing CJK ideographs get the Chinese phrasing, everything else
/// the English one.
pub fn completion_announcement(label: &str) -> String {
    if contains_cjk(label) {
        format!("{} 時間到", label)
    } else {
        format!("{} timer finished", label)
    }
}

/// Render a duration as "MM:SS" (minutes are not wrapped into hours)
pub fn format_clock(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Serialisable view of the active timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub total_seconds: f64,
    pub label: String,
    pub status: TimerPhase,
    pub remaining_ms: u64,
}
