//! Timer Manager
//!
//! Countdown timers tied to cooking steps. Expiry is detected by polling from
//! the session's periodic tick instead of one scheduled task per timer, so a
//! timer fires at the first tick after its deadline.

use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Running,
    Fired,
    Cancelled,
}

impl TimerStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TimerStatus::Running)
    }

    fn as_str(self) -> &'static str {
        match self {
            TimerStatus::Running => "running",
            TimerStatus::Fired => "fired",
            TimerStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Timer {
    pub id: String,
    pub label: String,
    pub duration_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub status: TimerStatus,
    /// Monotonic start used for ordering.
    #[serde(skip)]
    started: Instant,
    /// `None` when the deadline lies beyond what the clock can represent.
    #[serde(skip)]
    deadline: Option<Instant>,
}

impl Timer {
    /// When the timer is due, or `None` if it never comes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Whole seconds left before the timer is due, as of `now`.
    pub fn remaining_seconds(&self, now: Instant) -> u64 {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(now).as_secs(),
            None => {
                let elapsed = now.saturating_duration_since(self.started).as_secs();
                self.duration_seconds.saturating_sub(elapsed)
            }
        }
    }
}

/// All timers of one session, including fired and cancelled ones.
#[derive(Debug, Default)]
pub struct TimerManager {
    /// Kept in start order.
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new running timer with a session-unique id.
    pub fn start(
        &mut self,
        label: impl Into<String>,
        duration_seconds: i64,
    ) -> Result<Timer, SessionError> {
        let duration = u64::try_from(duration_seconds)
            .ok()
            .filter(|d| *d > 0)
            .ok_or(SessionError::InvalidDuration(duration_seconds))?;

        self.next_id += 1;
        let started = Instant::now();
        let timer = Timer {
            id: format!("timer-{}", self.next_id),
            label: label.into(),
            duration_seconds: duration,
            started_at: Utc::now(),
            status: TimerStatus::Running,
            started,
            deadline: started.checked_add(Duration::from_secs(duration)),
        };
        debug!(timer_id = %timer.id, label = %timer.label, duration, "Timer started");
        self.timers.push(timer.clone());
        Ok(timer)
    }

    /// Cancels a running timer.
    pub fn cancel(&mut self, timer_id: &str) -> Result<Timer, SessionError> {
        let timer = self
            .timers
            .iter_mut()
            .find(|t| t.id == timer_id)
            .ok_or_else(|| SessionError::TimerNotFound(timer_id.to_string()))?;
        if timer.status.is_terminal() {
            return Err(SessionError::TimerAlreadyTerminal {
                id: timer.id.clone(),
                status: timer.status.as_str().to_string(),
            });
        }
        timer.status = TimerStatus::Cancelled;
        Ok(timer.clone())
    }

    /// Cancels every running timer, returning the ones that changed.
    pub fn cancel_all(&mut self) -> Vec<Timer> {
        self.timers
            .iter_mut()
            .filter(|t| t.status == TimerStatus::Running)
            .map(|t| {
                t.status = TimerStatus::Cancelled;
                t.clone()
            })
            .collect()
    }

    /// Fires every running timer whose deadline has passed.
    ///
    /// Each timer is returned by exactly one call: it leaves the running set
    /// as soon as it fires.
    pub fn poll_expired(&mut self) -> Vec<Timer> {
        self.poll_expired_at(Instant::now())
    }

    pub fn poll_expired_at(&mut self, now: Instant) -> Vec<Timer> {
        self.timers
            .iter_mut()
            .filter(|t| t.status == TimerStatus::Running && t.is_due(now))
            .map(|t| {
                t.status = TimerStatus::Fired;
                t.clone()
            })
            .collect()
    }

    /// Running timers, oldest first.
    pub fn active_timers(&self) -> Vec<&Timer> {
        let mut active: Vec<&Timer> = self
            .timers
            .iter()
            .filter(|t| t.status == TimerStatus::Running)
            .collect();
        active.sort_by_key(|t| t.started);
        active
    }

    pub fn get(&self, timer_id: &str) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id == timer_id)
    }

    /// Every timer this session has created, in start order.
    pub fn history(&self) -> &[Timer] {
        &self.timers
    }
}
