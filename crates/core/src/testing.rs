use crate::{StepKind, StepStatus, SubagentRun, TodoItem, TodoStatus, TraceStep};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Fixed base instant so fixtures order deterministically.
pub fn ts(offset_secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600 + offset_secs, 0).unwrap_or_default()
}

/// Thought step at `offset_secs`.
pub fn thought(id: &str, text: &str, offset_secs: i64) -> TraceStep {
    let mut step = TraceStep::new(id, StepKind::Thought);
    step.content = text.to_string();
    step.timestamp = Some(ts(offset_secs));
    step
}

/// Action step for `tool`, optionally carrying a call id.
pub fn action(id: &str, tool: &str, call_id: Option<&str>, offset_secs: i64) -> TraceStep {
    let mut step = TraceStep::new(id, StepKind::Action);
    step.tool_name = Some(tool.to_string());
    step.timestamp = Some(ts(offset_secs));
    if let Some(call_id) = call_id {
        step.metadata
            .insert("toolCallId".to_string(), Value::String(call_id.to_string()));
    }
    step
}

/// Result step, optionally carrying a call id.
pub fn result(id: &str, call_id: Option<&str>, output: &str, offset_secs: i64) -> TraceStep {
    let mut step = TraceStep::new(id, StepKind::Result);
    step.content = output.to_string();
    step.status = Some(StepStatus::Done);
    step.timestamp = Some(ts(offset_secs));
    if let Some(call_id) = call_id {
        step.metadata
            .insert("toolCallId".to_string(), Value::String(call_id.to_string()));
    }
    step
}

/// Failed result step for `call_id`.
pub fn failed_result(id: &str, call_id: &str, output: &str, offset_secs: i64) -> TraceStep {
    let mut step = result(id, Some(call_id), output, offset_secs);
    step.status = Some(StepStatus::Error);
    step
}

/// Attach an explicit phase to a step.
pub fn with_phase(mut step: TraceStep, phase: &str) -> TraceStep {
    step.metadata
        .insert("phase".to_string(), Value::String(phase.to_string()));
    step
}

pub fn todo(id: &str, title: &str, status: TodoStatus) -> TodoItem {
    TodoItem {
        id: id.to_string(),
        title: title.to_string(),
        status,
    }
}

pub fn subagent(call_id: &str, subagent_type: &str, task: &str, offset_secs: i64) -> SubagentRun {
    SubagentRun {
        tool_call_id: call_id.to_string(),
        subagent_type: subagent_type.to_string(),
        task: task.to_string(),
        thinking: None,
        excerpt: None,
        status: StepStatus::Running,
        start_time: ts(offset_secs),
        end_time: None,
    }
}
