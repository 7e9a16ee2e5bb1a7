//! Trace-log JSONL format: one tagged JSON object per line.
//!
//! ```jsonl
//! {"type":"session","session_id":"conv-42"}
//! {"type":"step","step":{"id":"a","type":"thought","content":"..."}}
//! {"type":"todos","items":[{"id":"t1","title":"...","status":"pending"}]}
//! {"type":"evidence","toolCallId":"c1","cards":[{"title":"..."}]}
//! {"type":"subagent","toolCallId":"c2","subagentType":"...","task":"...","startTime":"..."}
//! {"type":"end","signal":"done"}
//! ```
//!
//! The `step` line nests the step under `step` because a step already owns a
//! `type` field of its own. Lines are applied in order; later `todos` and
//! `subagent` lines replace earlier ones for the same key, while `evidence`
//! lines append cards not seen before for their call.

use crate::trace::{
    StreamState, SubagentRun, TerminalSignal, TodoItem, ToolEvidenceUpdateEvent, TraceInputs,
    TraceStep,
};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead};

/// A single line in a trace log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum TraceLine {
    /// Identifies the conversation the following lines belong to.
    Session { session_id: String },
    Step { step: TraceStep },
    /// Full todo-list snapshot; replaces any earlier snapshot.
    Todos { items: Vec<TodoItem> },
    Evidence(ToolEvidenceUpdateEvent),
    Subagent(SubagentRun),
    /// Stream end, optionally with a terminal signal.
    End {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<TerminalSignal>,
    },
}

/// Error types for trace-log reading
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum JsonlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Accumulated contents of a trace log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceLog {
    pub session_id: Option<String>,
    pub inputs: TraceInputs,
}

impl TraceLog {
    /// Fold one line into the log.
    pub fn apply(&mut self, line: TraceLine) {
        match line {
            TraceLine::Session { session_id } => self.session_id = Some(session_id),
            TraceLine::Step { step } => self.inputs.steps.push(step),
            TraceLine::Todos { items } => self.inputs.todos = items,
            TraceLine::Evidence(update) => {
                self.inputs.merge_evidence(update);
            }
            TraceLine::Subagent(run) => {
                self.inputs.subagents.insert(run.tool_call_id.clone(), run);
            }
            TraceLine::End { signal } => self.inputs.stream = StreamState::Ended(signal),
        }
    }
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<TraceLine>, JsonlError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| JsonlError::Json {
            line: line_number,
            source,
        })
}

/// Read a whole trace log. The first malformed line aborts the read.
pub fn read_trace_log<R: BufRead>(reader: R) -> Result<TraceLog, JsonlError> {
    let mut log = TraceLog::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(parsed) = parse_line(&line, index + 1)? {
            log.apply(parsed);
        }
    }
    Ok(log)
}

/// Read a trace log from a string
pub fn from_jsonl_str(s: &str) -> Result<TraceLog, JsonlError> {
    read_trace_log(io::BufReader::new(s.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{StepKind, TodoStatus};

    const LOG: &str = r#"{"type":"session","session_id":"conv-1"}
{"type":"step","step":{"id":"a","type":"action","toolName":"search","metadata":{"toolCallId":"c1"}}}

{"type":"step","step":{"id":"b","type":"result","metadata":{"toolCallId":"c1","output":"ok"}}}
{"type":"todos","items":[{"id":"t1","title":"plan","status":"done"}]}
{"type":"evidence","toolCallId":"c1","cards":[{"title":"Doc","url":"https://example.com"}]}
{"type":"end","signal":"done"}
"#;

    #[test]
    fn test_read_trace_log() {
        let log = from_jsonl_str(LOG).unwrap();
        assert_eq!(log.session_id.as_deref(), Some("conv-1"));
        assert_eq!(log.inputs.steps.len(), 2);
        assert_eq!(log.inputs.steps[0].kind, StepKind::Action);
        assert_eq!(log.inputs.steps[1].call_id(), Some("c1"));
        assert_eq!(log.inputs.todos[0].status, TodoStatus::Done);
        assert_eq!(log.inputs.evidence["c1"].cards.len(), 1);
        assert_eq!(
            log.inputs.stream,
            StreamState::Ended(Some(TerminalSignal::Done))
        );
    }

    #[test]
    fn test_end_without_signal() {
        let log = from_jsonl_str(r#"{"type":"end"}"#).unwrap();
        assert_eq!(log.inputs.stream, StreamState::Ended(None));
    }

    #[test]
    fn test_later_todo_snapshot_replaces_earlier() {
        let log = from_jsonl_str(
            r#"{"type":"todos","items":[{"id":"t1","title":"a","status":"pending"},{"id":"t2","title":"b","status":"pending"}]}
{"type":"todos","items":[{"id":"t1","title":"a","status":"done"}]}"#,
        )
        .unwrap();
        assert_eq!(log.inputs.todos.len(), 1);
        assert_eq!(log.inputs.todos[0].status, TodoStatus::Done);
    }

    #[test]
    fn test_evidence_lines_accumulate_per_call() {
        let log = from_jsonl_str(
            r#"{"type":"evidence","toolCallId":"c1","cards":[{"title":"one"}]}
{"type":"evidence","toolCallId":"c1","cards":[{"title":"two"},{"title":"one"}]}"#,
        )
        .unwrap();
        let titles: Vec<&str> = log.inputs.evidence["c1"]
            .cards
            .iter()
            .map(|card| card.title.as_str())
            .collect();
        assert_eq!(titles, vec!["one", "two"]);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = from_jsonl_str("{\"type\":\"end\"}\n{not json").unwrap_err();
        match err {
            JsonlError::Json { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_line_blank() {
        assert!(parse_line("   ", 1).unwrap().is_none());
    }
}
