use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata keys that may carry a tool-call id, in lookup order.
pub const CALL_ID_KEYS: &[&str] = &["toolCallId", "tool_call_id", "callId", "call_id"];
/// Metadata key for an explicit display phase.
pub const ATTR_PHASE: &str = "phase";
/// Metadata key for a todo-list snapshot carried by an action step.
pub const ATTR_TODOS: &str = "todos";
/// Metadata keys that may carry tool input, in lookup order.
pub const INPUT_KEYS: &[&str] = &["input", "args", "arguments"];
/// Metadata keys that may carry tool output, in lookup order.
pub const OUTPUT_KEYS: &[&str] = &["output", "result"];

/// Kind of an atomic trace step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thought,
    #[serde(alias = "tool_call", alias = "call")]
    Action,
    #[serde(alias = "tool_result", alias = "observation")]
    Result,
}

/// Status reported by the agent runtime on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    #[serde(alias = "in_progress", alias = "started")]
    Running,
    #[serde(alias = "success", alias = "completed", alias = "ok")]
    Done,
    #[serde(alias = "failed", alias = "failure", alias = "cancelled")]
    Error,
    #[serde(other)]
    Unknown,
}

/// One atomic event emitted by the agent runtime.
///
/// Steps are immutable once emitted. A result step refers back to its action
/// through a call id carried in `metadata` (see [`CALL_ID_KEYS`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl TraceStep {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            timestamp: None,
            content: String::new(),
            tool_name: None,
            status: None,
            metadata: HashMap::new(),
        }
    }

    /// Explicit tool-call id, if the step carries a non-empty one.
    pub fn call_id(&self) -> Option<&str> {
        CALL_ID_KEYS
            .iter()
            .find_map(|key| self.metadata_str(key))
    }

    /// Explicit display phase, if any.
    pub fn phase_hint(&self) -> Option<&str> {
        self.metadata_str(ATTR_PHASE)
    }

    pub fn is_error(&self) -> bool {
        self.status == Some(StepStatus::Error)
    }

    /// Tool name with surrounding whitespace removed; empty names count as absent.
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Non-empty string value for a metadata key.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// First metadata value present under any of `keys`.
    pub fn metadata_any(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|key| self.metadata.get(*key))
    }
}

/// Progress state of a todo entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    #[serde(alias = "in-progress", alias = "active", alias = "running")]
    InProgress,
    #[serde(alias = "completed", alias = "complete")]
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    #[serde(alias = "content")]
    pub title: String,
    pub status: TodoStatus,
}

/// A piece of evidence (search hit, fetched page, file excerpt) produced by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEvidenceCard {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ToolEvidenceCard {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: None,
            snippet: None,
            card_type: None,
            metadata: HashMap::new(),
        }
    }

    /// Identity used when merging evidence updates.
    pub fn dedup_key(&self) -> (&str, Option<&str>) {
        (self.title.as_str(), self.url.as_deref())
    }
}

/// Append `incoming` cards that are not already present (same title and url).
/// Existing cards keep their position. Returns how many were added.
pub fn merge_evidence(existing: &mut Vec<ToolEvidenceCard>, incoming: &[ToolEvidenceCard]) -> usize {
    let mut added = 0;
    for card in incoming {
        let duplicate = existing
            .iter()
            .any(|known| known.dedup_key() == card.dedup_key());
        if !duplicate {
            existing.push(card.clone());
            added += 1;
        }
    }
    added
}

/// Evidence cards reported for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEvidenceUpdateEvent {
    pub tool_call_id: String,
    #[serde(default)]
    pub cards: Vec<ToolEvidenceCard>,
}

/// A delegated sub-agent execution, correlated to its spawning tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentRun {
    pub tool_call_id: String,
    #[serde(default)]
    pub subagent_type: String,
    #[serde(default)]
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default = "default_subagent_status")]
    pub status: StepStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

fn default_subagent_status() -> StepStatus {
    StepStatus::Running
}

/// Terminal signal closing a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalSignal {
    Done,
    Error,
}

/// Whether the event stream is still producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "signal", rename_all = "snake_case")]
pub enum StreamState {
    #[default]
    Streaming,
    /// The stream stopped; `None` means it stopped without a terminal signal.
    Ended(Option<TerminalSignal>),
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

/// Everything the timeline engine recomputes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceInputs {
    pub steps: Vec<TraceStep>,
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default)]
    pub evidence: HashMap<String, ToolEvidenceUpdateEvent>,
    #[serde(default)]
    pub subagents: HashMap<String, SubagentRun>,
    #[serde(default)]
    pub stream: StreamState,
}

impl TraceInputs {
    /// Fold an evidence update into the cards already known for its call.
    /// Evidence only grows until the inputs are reset.
    pub fn merge_evidence(&mut self, update: ToolEvidenceUpdateEvent) -> usize {
        let entry = self
            .evidence
            .entry(update.tool_call_id.clone())
            .or_insert_with(|| ToolEvidenceUpdateEvent {
                tool_call_id: update.tool_call_id.clone(),
                cards: Vec::new(),
            });
        merge_evidence(&mut entry.cards, &update.cards)
    }

    /// Latest timestamp carried by any input, used as the `updated_at` watermark.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        let steps = self.steps.iter().filter_map(|s| s.timestamp);
        let runs = self
            .subagents
            .values()
            .flat_map(|run| std::iter::once(run.start_time).chain(run.end_time));
        steps.chain(runs).max()
    }
}
