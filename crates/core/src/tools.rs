//! Function calls the speech model may issue during a session.
//!
//! The argument structs double as the JSON schemas declared to the model, so
//! what we advertise and what we parse cannot drift apart.

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};

pub const MARK_STEP_COMPLETE: &str = "mark_step_complete";
pub const GO_TO_STEP: &str = "go_to_step";
pub const START_TIMER: &str = "start_timer";
pub const CANCEL_TIMER: &str = "cancel_timer";
pub const GET_PROGRESS: &str = "get_progress";

/// Arguments for `mark_step_complete`.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct MarkStepCompleteArgs {
    /// Step to mark as done. Omit it (or pass the current step) to finish the
    /// current step and move on to the next one.
    #[schemars(description = "0-based step index; omit to complete the current step and advance")]
    pub step_index: Option<i64>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct GoToStepArgs {
    #[schemars(description = "0-based index of the step to move to")]
    pub step_index: i64,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct StartTimerArgs {
    #[schemars(description = "Short description of what the timer is for, e.g. 'boil pasta'")]
    pub label: String,
    #[schemars(description = "Timer length in seconds")]
    pub duration_seconds: i64,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct CancelTimerArgs {
    #[schemars(description = "Id of a running timer, as returned by start_timer")]
    pub timer_id: String,
}

#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct GetProgressArgs {}

/// A parsed, recognized function call.
#[derive(Debug)]
pub enum ToolCall {
    MarkStepComplete(MarkStepCompleteArgs),
    GoToStep(GoToStepArgs),
    StartTimer(StartTimerArgs),
    CancelTimer(CancelTimerArgs),
    GetProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("Invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownFunction(_) => "unknown_function",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
        }
    }
}

impl ToolCall {
    /// Parses a function-call request. Empty argument strings are treated as `{}`.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let call = match name {
            MARK_STEP_COMPLETE => ToolCall::MarkStepComplete(parse_args(name, arguments)?),
            GO_TO_STEP => ToolCall::GoToStep(parse_args(name, arguments)?),
            START_TIMER => ToolCall::StartTimer(parse_args(name, arguments)?),
            CANCEL_TIMER => ToolCall::CancelTimer(parse_args(name, arguments)?),
            GET_PROGRESS => ToolCall::GetProgress,
            other => return Err(ToolError::UnknownFunction(other.to_string())),
        };
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::MarkStepComplete(_) => MARK_STEP_COMPLETE,
            ToolCall::GoToStep(_) => GO_TO_STEP,
            ToolCall::StartTimer(_) => START_TIMER,
            ToolCall::CancelTimer(_) => CANCEL_TIMER,
            ToolCall::GetProgress => GET_PROGRESS,
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: &str, arguments: &str) -> Result<T, ToolError> {
    serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Provider-neutral declaration of one callable function.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

fn spec<T: JsonSchema>(name: &str, description: &str) -> ToolSpec {
    let mut schema = schema_for!(T);
    schema.remove("$schema");
    schema.remove("title");
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        parameters: schema.to_value(),
    }
}

/// The functions every voice session declares to the speech model.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        spec::<MarkStepCompleteArgs>(
            MARK_STEP_COMPLETE,
            "Mark a recipe step as completed. Without a step_index, completes the current step and moves to the next one.",
        ),
        spec::<GoToStepArgs>(
            GO_TO_STEP,
            "Move to a specific step, e.g. when the cook asks to go back or skip ahead.",
        ),
        spec::<StartTimerArgs>(START_TIMER, "Start a cooking countdown timer."),
        spec::<CancelTimerArgs>(CANCEL_TIMER, "Cancel a running cooking timer."),
        spec::<GetProgressArgs>(
            GET_PROGRESS,
            "Get the current step, how many steps are done, and the running timers.",
        ),
    ]
}
