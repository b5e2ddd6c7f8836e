use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BoardError, BoardResult};

pub const DEFAULT_DURATION_SECS: u32 = 60;

/// Controller-local status of the countdown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Finished,
}

/// Status value as written to the shared `timer` record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishedStatus {
    Running,
    Paused,
    Reset,
    Finished,
}

impl PublishedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishedStatus::Running => "running",
            PublishedStatus::Paused => "paused",
            PublishedStatus::Reset => "reset",
            PublishedStatus::Finished => "finished",
        }
    }
}

/// The shared `timer` record as viewers read it. Every field is optional
/// because ticks only publish `remaining`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PublishedStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_prediction_time: Option<u32>,
}

impl TimerRecord {
    pub fn from_value(key: &str, value: &Value) -> BoardResult<Self> {
        serde_json::from_value(value.clone()).map_err(|err| BoardError::malformed(key, err))
    }
}

/// Fields a single transition writes into the `timer` record.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerUpdate {
    pub status: Option<PublishedStatus>,
    pub duration: Option<u32>,
    pub remaining: Option<u32>,
    pub stamped: bool,
}

impl TimerUpdate {
    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(status) = self.status {
            fields.insert("status".into(), Value::from(status.as_str()));
        }
        if let Some(duration) = self.duration {
            fields.insert("duration".into(), Value::from(duration));
        }
        if let Some(remaining) = self.remaining {
            fields.insert("remaining".into(), Value::from(remaining));
        }
        if self.stamped {
            fields.insert("lastUpdated".into(), Value::from(Utc::now().to_rfc3339()));
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Still counting; publish the new `remaining`.
    Continue(TimerUpdate),
    /// Reached zero this tick; publish and fire the finish signal.
    Finished(TimerUpdate),
}

/// The countdown state machine. `start`, `pause`, `reset` and `tick` are the
/// only mutators; each returns what must be published, or `None` when the
/// call does not apply in the current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub duration: u32,
    pub remaining: u32,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION_SECS)
    }
}

impl TimerState {
    pub fn new(duration: u32) -> Self {
        Self {
            status: TimerStatus::Idle,
            duration,
            remaining: duration,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// Starts a fresh cycle from `Idle` or `Finished`. Paused timers must be
    /// reset first.
    pub fn start(&mut self) -> Option<TimerUpdate> {
        match self.status {
            TimerStatus::Running | TimerStatus::Paused => None,
            TimerStatus::Idle | TimerStatus::Finished => {
                self.status = TimerStatus::Running;
                self.remaining = self.duration;
                Some(TimerUpdate {
                    status: Some(PublishedStatus::Running),
                    duration: Some(self.duration),
                    remaining: Some(self.remaining),
                    stamped: true,
                })
            }
        }
    }

    pub fn tick(&mut self) -> Option<TickOutcome> {
        if self.status != TimerStatus::Running {
            return None;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return Some(TickOutcome::Continue(TimerUpdate {
                status: None,
                duration: None,
                remaining: Some(self.remaining),
                stamped: false,
            }));
        }

        self.status = TimerStatus::Finished;
        self.remaining = self.duration;
        Some(TickOutcome::Finished(TimerUpdate {
            status: Some(PublishedStatus::Finished),
            duration: None,
            remaining: Some(0),
            stamped: true,
        }))
    }

    pub fn pause(&mut self) -> Option<TimerUpdate> {
        if self.status != TimerStatus::Running {
            return None;
        }
        self.status = TimerStatus::Paused;
        Some(TimerUpdate {
            status: Some(PublishedStatus::Paused),
            duration: None,
            remaining: None,
            stamped: true,
        })
    }

    pub fn reset(&mut self) -> TimerUpdate {
        self.status = TimerStatus::Idle;
        self.remaining = self.duration;
        TimerUpdate {
            status: Some(PublishedStatus::Reset),
            duration: Some(self.duration),
            remaining: Some(self.remaining),
            stamped: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_down_by_one_then_finishes() {
        let mut state = TimerState::new(3);
        assert!(state.start().is_some());

        let mut published = Vec::new();
        while let Some(outcome) = state.tick() {
            match outcome {
                TickOutcome::Continue(update) => published.push(update.remaining.unwrap()),
                TickOutcome::Finished(update) => {
                    assert_eq!(update.status, Some(PublishedStatus::Finished));
                    assert_eq!(update.remaining, Some(0));
                    published.push(0);
                }
            }
        }

        assert_eq!(published, vec![2, 1, 0]);
        assert_eq!(state.status, TimerStatus::Finished);
        assert_eq!(state.remaining, 3);
    }

    #[test]
    fn start_while_running_is_ignored() {
        let mut state = TimerState::new(60);
        state.start().unwrap();
        state.tick();
        assert!(state.start().is_none());
        assert_eq!(state.remaining, 59);
    }

    #[test]
    fn pause_is_terminal_until_reset() {
        let mut state = TimerState::new(60);
        state.start().unwrap();
        state.tick();
        state.tick();

        let update = state.pause().unwrap();
        assert_eq!(update.remaining, None);
        assert_eq!(state.remaining, 58);
        assert!(state.tick().is_none());
        assert!(state.start().is_none());
        assert!(state.pause().is_none());

        let update = state.reset();
        assert_eq!(update.status, Some(PublishedStatus::Reset));
        assert_eq!(update.remaining, Some(60));
        assert!(state.start().is_some());
    }

    #[test]
    fn restart_after_finish_begins_a_full_cycle() {
        let mut state = TimerState::new(1);
        state.start().unwrap();
        assert!(matches!(state.tick(), Some(TickOutcome::Finished(_))));
        let update = state.start().unwrap();
        assert_eq!(update.remaining, Some(1));
        assert_eq!(update.duration, Some(1));
    }

    #[test]
    fn remaining_never_exceeds_duration() {
        let mut state = TimerState::new(5);
        state.start().unwrap();
        for _ in 0..12 {
            state.tick();
            assert!(state.remaining <= state.duration);
            if !state.is_running() {
                state.start();
            }
        }
    }

    #[test]
    fn update_fields_use_record_names() {
        let mut state = TimerState::new(60);
        let fields = state.start().unwrap().into_fields();
        assert_eq!(fields["status"], json!("running"));
        assert_eq!(fields["duration"], json!(60));
        assert_eq!(fields["remaining"], json!(60));
        assert!(fields.contains_key("lastUpdated"));

        let tick = match state.tick().unwrap() {
            TickOutcome::Continue(update) => update.into_fields(),
            TickOutcome::Finished(_) => panic!("finished early"),
        };
        assert_eq!(tick.len(), 1);
        assert_eq!(tick["remaining"], json!(59));
    }

    #[test]
    fn record_parses_partial_and_rejects_bad_types() {
        let record = TimerRecord::from_value(
            "timer",
            &json!({"status": "paused", "remaining": 12, "lastUpdated": "2024-05-01T10:00:00Z"}),
        )
        .unwrap();
        assert_eq!(record.status, Some(PublishedStatus::Paused));
        assert_eq!(record.remaining, Some(12));
        assert_eq!(record.duration, None);

        let err = TimerRecord::from_value("timer", &json!({"remaining": "soon"})).unwrap_err();
        assert!(matches!(err, BoardError::MalformedSnapshot { .. }));
    }
}
