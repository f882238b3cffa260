//! Per-session state and the function-call dispatcher.
//!
//! `SessionState` is owned by the session's event-dispatch task and is never
//! shared, so every mutation below runs without locks.

use crate::{
    error::SessionError,
    events::ControlEvent,
    recipe::{RecipeDocument, Step},
    timer::{Timer, TimerManager},
    tools::{MarkStepCompleteArgs, ToolCall},
    tracker::StepTracker,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether the session still takes audio and function calls.
    pub fn accepts_work(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Active)
    }
}

/// Result of dispatching one function call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Structured result handed back to the speech model.
    pub result: Value,
    /// Control events for the client, in the order they happened.
    pub events: Vec<ControlEvent>,
    /// Set when the call tried to advance past the last step.
    pub recipe_complete: bool,
}

impl DispatchOutcome {
    fn ok(result: Value, events: Vec<ControlEvent>) -> Self {
        let mut result = result;
        if let Value::Object(map) = &mut result {
            map.insert("status".into(), json!("ok"));
        }
        Self {
            result,
            events,
            recipe_complete: false,
        }
    }

    fn failure(code: &str, message: String) -> Self {
        Self {
            result: json!({ "status": "error", "error": code, "message": message }),
            events: Vec::new(),
            recipe_complete: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result["status"] == "ok"
    }
}

pub struct SessionState {
    pub session_id: Uuid,
    recipe: Arc<RecipeDocument>,
    tracker: StepTracker,
    timers: TimerManager,
    connection_state: ConnectionState,
}

impl SessionState {
    pub fn new(session_id: Uuid, recipe: Arc<RecipeDocument>) -> Self {
        Self {
            session_id,
            tracker: StepTracker::new(recipe.clone()),
            recipe,
            timers: TimerManager::new(),
            connection_state: ConnectionState::Connecting,
        }
    }

    pub fn recipe(&self) -> &RecipeDocument {
        &self.recipe
    }

    pub fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    /// Moves the lifecycle forward. Transitions never go backwards.
    pub(crate) fn set_connection_state(&mut self, next: ConnectionState) {
        if next as u8 > self.connection_state as u8 {
            info!(from = ?self.connection_state, to = ?next, "Session state transition");
            self.connection_state = next;
        }
    }

    /// Runs one function call against the tracker or timer manager.
    ///
    /// Failures never propagate: they become an error result for the model.
    pub fn dispatch(&mut self, name: &str, arguments: &str) -> DispatchOutcome {
        let call = match ToolCall::parse(name, arguments) {
            Ok(call) => call,
            Err(e) => {
                warn!(function = %name, error = %e, "Rejected function call");
                return DispatchOutcome::failure(e.code(), e.to_string());
            }
        };
        info!(function = call.name(), "Dispatching function call");
        match self.apply(call) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(function = %name, error = %e, "Function call failed");
                DispatchOutcome::failure(e.code(), e.to_string())
            }
        }
    }

    fn apply(&mut self, call: ToolCall) -> Result<DispatchOutcome, SessionError> {
        match call {
            ToolCall::MarkStepComplete(args) => self.mark_step_complete(args),
            ToolCall::GoToStep(args) => {
                self.tracker.jump_to(args.step_index)?;
                let step = self.tracker.current();
                let index = step.index;
                let current = self.step_json(step);
                Ok(DispatchOutcome::ok(
                    json!({ "current_step": current }),
                    vec![ControlEvent::StepChanged { step_index: index }],
                ))
            }
            ToolCall::StartTimer(args) => {
                let timer = self.timers.start(args.label, args.duration_seconds)?;
                Ok(DispatchOutcome::ok(
                    json!({
                        "timer_id": timer.id,
                        "label": timer.label,
                        "duration_seconds": timer.duration_seconds,
                    }),
                    vec![ControlEvent::TimerRequested {
                        timer_id: timer.id,
                        label: timer.label,
                        duration_seconds: timer.duration_seconds,
                    }],
                ))
            }
            ToolCall::CancelTimer(args) => {
                let timer = self.timers.cancel(&args.timer_id)?;
                Ok(DispatchOutcome::ok(
                    json!({ "timer_id": timer.id, "label": timer.label }),
                    vec![ControlEvent::TimerCancelled { timer_id: timer.id }],
                ))
            }
            ToolCall::GetProgress => {
                let summary = self.tracker.progress_summary();
                let now = Instant::now();
                let timers: Vec<Value> = self
                    .timers
                    .active_timers()
                    .into_iter()
                    .map(|t| {
                        json!({
                            "timer_id": t.id,
                            "label": t.label,
                            "remaining_seconds": t.remaining_seconds(now),
                        })
                    })
                    .collect();
                Ok(DispatchOutcome::ok(
                    json!({
                        "completed_count": summary.completed_count,
                        "total_count": summary.total_count,
                        "current_index": summary.current_index,
                        "current_step": self.step_json(self.tracker.current()),
                        "active_timers": timers,
                    }),
                    vec![summary.into()],
                ))
            }
        }
    }

    fn mark_step_complete(
        &mut self,
        args: MarkStepCompleteArgs,
    ) -> Result<DispatchOutcome, SessionError> {
        let current = self.tracker.current_index();
        match args.step_index {
            Some(index) if index != current as i64 => {
                self.tracker.mark_complete(index)?;
                Ok(DispatchOutcome::ok(
                    json!({
                        "completed_step": index,
                        "current_step": self.step_json(self.tracker.current()),
                    }),
                    vec![ControlEvent::StepCompleted {
                        step_index: index as usize,
                    }],
                ))
            }
            _ => match self.tracker.advance().map(|_| ()) {
                Ok(()) => {
                    let next = self.step_json(self.tracker.current());
                    Ok(DispatchOutcome::ok(
                        json!({ "completed_step": current, "current_step": next }),
                        vec![ControlEvent::StepCompleted {
                            step_index: current,
                        }],
                    ))
                }
                Err(SessionError::NoMoreSteps) => {
                    info!("Final step completed");
                    let mut outcome = DispatchOutcome::ok(
                        json!({ "completed_step": current, "recipe_complete": true }),
                        vec![
                            ControlEvent::StepCompleted {
                                step_index: current,
                            },
                            ControlEvent::RecipeComplete {},
                        ],
                    );
                    outcome.recipe_complete = true;
                    Ok(outcome)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Fires every due timer. Called from the periodic tick.
    pub fn poll_expired_timers(&mut self) -> Vec<Timer> {
        self.timers.poll_expired()
    }

    /// Cancels whatever is still running; part of teardown.
    pub fn cancel_all_timers(&mut self) -> Vec<Timer> {
        self.timers.cancel_all()
    }

    fn step_json(&self, step: &Step) -> Value {
        json!({
            "index": step.index,
            "phase": self.recipe.phase_of(step.index).map(|p| p.name.as_str()),
            "instruction": step.instruction,
            "estimated_duration_seconds": step.estimated_duration_seconds,
            "tip": step.tip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::tests::sample_recipe;
    use std::time::Duration;

    fn state() -> SessionState {
        SessionState::new(Uuid::new_v4(), Arc::new(sample_recipe()))
    }

    #[test]
    fn test_mark_current_step_advances() {
        let mut state = state();
        let outcome = state.dispatch("mark_step_complete", "{}");
        assert!(outcome.is_ok());
        assert_eq!(
            outcome.events,
            vec![ControlEvent::StepCompleted { step_index: 0 }]
        );
        assert_eq!(outcome.result["current_step"]["index"], 1);
        assert_eq!(outcome.result["current_step"]["phase"], "Preparation");
        assert_eq!(state.tracker().current_index(), 1);
    }

    #[test]
    fn test_mark_other_step_keeps_pointer() {
        let mut state = state();
        let outcome = state.dispatch("mark_step_complete", r#"{"step_index": 2}"#);
        assert!(outcome.is_ok());
        assert_eq!(
            outcome.events,
            vec![ControlEvent::StepCompleted { step_index: 2 }]
        );
        assert_eq!(state.tracker().current_index(), 0);
        assert!(state.tracker().completed_steps().contains(&2));
    }

    #[test]
    fn test_finishing_last_step_signals_recipe_complete() {
        let mut state = state();
        state.dispatch("go_to_step", r#"{"step_index": 2}"#);
        let outcome = state.dispatch("mark_step_complete", "{}");
        assert!(outcome.is_ok());
        assert!(outcome.recipe_complete);
        assert_eq!(
            outcome.events,
            vec![
                ControlEvent::StepCompleted { step_index: 2 },
                ControlEvent::RecipeComplete {}
            ]
        );
        assert_eq!(outcome.result["recipe_complete"], true);
    }

    #[test]
    fn test_dispatch_errors_become_failure_results() {
        let mut state = state();

        let outcome = state.dispatch("go_to_step", r#"{"step_index": 12}"#);
        assert!(!outcome.is_ok());
        assert_eq!(outcome.result["error"], "invalid_step_index");
        assert!(outcome.events.is_empty());

        let outcome = state.dispatch("cancel_timer", r#"{"timer_id": "timer-7"}"#);
        assert_eq!(outcome.result["error"], "timer_not_found");

        let outcome = state.dispatch(
            "start_timer",
            r#"{"label": "instant", "duration_seconds": 0}"#,
        );
        assert_eq!(outcome.result["error"], "invalid_duration");

        let outcome = state.dispatch("flip_pancake", "{}");
        assert_eq!(outcome.result["error"], "unknown_function");

        let outcome = state.dispatch("go_to_step", "not json");
        assert_eq!(outcome.result["error"], "invalid_arguments");
    }

    #[test]
    fn test_timer_calls_emit_events() {
        let mut state = state();
        let outcome = state.dispatch(
            "start_timer",
            r#"{"label": "boil water", "duration_seconds": 600}"#,
        );
        assert_eq!(
            outcome.events,
            vec![ControlEvent::TimerRequested {
                timer_id: "timer-1".into(),
                label: "boil water".into(),
                duration_seconds: 600
            }]
        );
        assert_eq!(outcome.result["timer_id"], "timer-1");

        let outcome = state.dispatch("cancel_timer", r#"{"timer_id": "timer-1"}"#);
        assert_eq!(
            outcome.events,
            vec![ControlEvent::TimerCancelled {
                timer_id: "timer-1".into()
            }]
        );

        let outcome = state.dispatch("cancel_timer", r#"{"timer_id": "timer-1"}"#);
        assert_eq!(outcome.result["error"], "timer_already_terminal");
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_running_timers() {
        let mut state = state();
        state.dispatch("mark_step_complete", "{}");
        state.dispatch(
            "start_timer",
            r#"{"label": "boil water", "duration_seconds": 600}"#,
        );
        tokio::time::advance(Duration::from_secs(100)).await;

        let outcome = state.dispatch("get_progress", "");
        assert_eq!(
            outcome.events,
            vec![ControlEvent::Progress {
                completed_count: 1,
                total_count: 3,
                current_index: 1
            }]
        );
        assert_eq!(outcome.result["active_timers"][0]["remaining_seconds"], 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enormous_timer_stays_running() {
        let mut state = state();
        let outcome = state.dispatch(
            "start_timer",
            r#"{"label": "forever", "duration_seconds": 9223372036854775807}"#,
        );
        assert_eq!(outcome.result["status"], "ok");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(state.poll_expired_timers().is_empty());
        let outcome = state.dispatch("get_progress", "{}");
        assert_eq!(
            outcome.result["active_timers"][0]["remaining_seconds"],
            i64::MAX as u64 - 10
        );
    }

    #[test]
    fn test_connection_state_never_moves_backwards() {
        let mut state = state();
        state.set_connection_state(ConnectionState::Active);
        state.set_connection_state(ConnectionState::Closed);
        state.set_connection_state(ConnectionState::Active);
        assert_eq!(state.connection_state(), ConnectionState::Closed);
        assert!(!state.connection_state().accepts_work());
    }
}
