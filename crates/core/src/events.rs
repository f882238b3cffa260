//! Messages a voice session emits towards its client.

use crate::tracker::ProgressSummary;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured (non-audio) notifications describing session state changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// The upstream speech model is connected and the session is live.
    SessionStarted {
        session_id: Uuid,
        recipe_title: String,
        total_steps: usize,
    },
    StepCompleted { step_index: usize },
    /// The current-step pointer moved because of explicit navigation.
    StepChanged { step_index: usize },
    TimerRequested {
        timer_id: String,
        label: String,
        duration_seconds: u64,
    },
    TimerFired { timer_id: String, label: String },
    TimerCancelled { timer_id: String },
    Progress {
        completed_count: usize,
        total_count: usize,
        current_index: usize,
    },
    RecipeComplete {},
    /// Informational transcript of the cook's speech. Not authoritative.
    Transcript { text: String, is_final: bool },
    Error { kind: String, message: String },
}

impl From<ProgressSummary> for ControlEvent {
    fn from(summary: ProgressSummary) -> Self {
        ControlEvent::Progress {
            completed_count: summary.completed_count,
            total_count: summary.total_count,
            current_index: summary.current_index,
        }
    }
}

/// One item of the outbound stream: synthesized audio or a control event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Audio(Bytes),
    Control(ControlEvent),
}

/// What the client feeds into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientInput {
    /// A chunk of raw PCM16 microphone audio.
    Audio(Bytes),
    /// Explicit request to end the session.
    End,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let cases = vec![
            (
                ControlEvent::StepCompleted { step_index: 2 },
                json!({"type": "step_completed", "step_index": 2}),
            ),
            (
                ControlEvent::TimerRequested {
                    timer_id: "timer-1".into(),
                    label: "boil water".into(),
                    duration_seconds: 600,
                },
                json!({"type": "timer_requested", "timer_id": "timer-1", "label": "boil water", "duration_seconds": 600}),
            ),
            (
                ControlEvent::TimerFired {
                    timer_id: "timer-1".into(),
                    label: "boil water".into(),
                },
                json!({"type": "timer_fired", "timer_id": "timer-1", "label": "boil water"}),
            ),
            (
                ControlEvent::TimerCancelled {
                    timer_id: "timer-1".into(),
                },
                json!({"type": "timer_cancelled", "timer_id": "timer-1"}),
            ),
            (
                ControlEvent::RecipeComplete {},
                json!({"type": "recipe_complete"}),
            ),
            (
                ControlEvent::Error {
                    kind: "fatal".into(),
                    message: "upstream closed".into(),
                },
                json!({"type": "error", "kind": "fatal", "message": "upstream closed"}),
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(serde_json::to_value(&event).unwrap(), expected);
        }
    }

    #[test]
    fn test_progress_from_summary() {
        let event: ControlEvent = ProgressSummary {
            completed_count: 3,
            total_count: 3,
            current_index: 2,
        }
        .into();
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "progress", "completed_count": 3, "total_count": 3, "current_index": 2})
        );
    }
}
