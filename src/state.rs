//! In-memory state tracking for the supervisor.

use std::collections::VecDeque;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

/// Retained output lines; the oldest line is evicted beyond this bound.
pub const LOG_RING_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stopped,
    Starting,
    Running,
    Error,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Stopped => "stopped",
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Unknown,
    Checking,
    Ok,
    Fail,
    Disabled,
    Stopped,
}

impl Health {
    pub fn label(self) -> &'static str {
        match self {
            Health::Unknown => "unknown",
            Health::Checking => "checking",
            Health::Ok => "ok",
            Health::Fail => "fail",
            Health::Disabled => "disabled",
            Health::Stopped => "stopped",
        }
    }
}

/// Bounded ring of recent process output lines. Lines are evicted one
/// at a time from the front and the ring is never cleared wholesale, so
/// the context leading up to a failure survives a failover.
#[derive(Debug, Default)]
pub struct LogRing {
    lines: VecDeque<String>,
}

impl LogRing {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        while self.lines.len() > LOG_RING_CAPACITY {
            self.lines.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// Cancellation control for the current supervision run. Cancelling the
/// token kills the active process and winds down every task the run
/// spawned. The id lets a task detect that a newer run superseded it.
#[derive(Debug)]
pub struct RunHandle {
    pub id: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct SupervisorState {
    pub config: AppConfig,
    pub auto_switch: bool,
    pub status: Status,
    pub health: Health,
    pub profile: Option<String>,
    pub last_error: Option<String>,
    pub health_error: Option<String>,
    pub log: LogRing,
    pub last_index: Option<usize>,
    pub run: Option<RunHandle>,
}

impl SupervisorState {
    pub fn new(config: AppConfig) -> Self {
        let auto_switch = config.auto_switch;
        Self {
            config,
            auto_switch,
            status: Status::Stopped,
            health: Health::Unknown,
            profile: None,
            last_error: None,
            health_error: None,
            log: LogRing::default(),
            last_index: None,
            run: None,
        }
    }

    /// Visible-field reset performed by `stop()`. The log ring is left
    /// intact. Returns the run handle so the caller can cancel it
    /// outside the lock.
    pub fn reset_stopped(&mut self) -> Option<RunHandle> {
        self.status = Status::Stopped;
        self.health = Health::Stopped;
        self.profile = None;
        self.health_error = None;
        self.run.take()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            profile: self.profile.clone(),
            last_error: self.last_error.clone(),
            health: self.health,
            health_error: self.health_error.clone(),
            log_lines: self.log.to_vec(),
        }
    }
}

/// Immutable copy of the externally observable state, safe to hand to
/// pollers arbitrarily often.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: Status,
    pub profile: Option<String>,
    pub last_error: Option<String>,
    pub health: Health,
    pub health_error: Option<String>,
    pub log_lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mut ring = LogRing::default();
        for i in 0..LOG_RING_CAPACITY + 1 {
            ring.push(format!("line {i}"));
        }
        assert_eq!(ring.len(), LOG_RING_CAPACITY);
        let lines = ring.to_vec();
        assert_eq!(lines.first().map(String::as_str), Some("line 1"));
        assert_eq!(
            lines.last().map(String::as_str),
            Some(format!("line {LOG_RING_CAPACITY}").as_str())
        );
    }

    #[test]
    fn reset_stopped_clears_visible_fields_but_not_log() {
        let mut state = SupervisorState::new(AppConfig::default());
        state.status = Status::Running;
        state.health = Health::Ok;
        state.profile = Some("home".to_string());
        state.health_error = Some("stale".to_string());
        state.log.push("kept");

        state.reset_stopped();

        assert_eq!(state.status, Status::Stopped);
        assert_eq!(state.health, Health::Stopped);
        assert!(state.profile.is_none());
        assert!(state.health_error.is_none());
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn snapshot_copies_current_fields() {
        let mut state = SupervisorState::new(AppConfig::default());
        state.status = Status::Error;
        state.last_error = Some("all profiles failed".to_string());
        state.log.push("a");
        state.log.push("b");

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, Status::Error);
        assert_eq!(snapshot.last_error.as_deref(), Some("all profiles failed"));
        assert_eq!(snapshot.log_lines, vec!["a".to_string(), "b".to_string()]);
    }
}
