//! Tool-call correlation.
//!
//! A single fold over the ordered step list turns raw steps into timeline
//! items. The pairing table lives only inside [`correlate`]; nothing survives
//! between calls, so feeding the same steps twice yields the same items.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracepanel_core::{ATTR_TODOS, ObjectiveStatus, StepKind, TodoItem, TraceStep};
use tracepanel_parsers::common::strip_system_reminders;
use tracepanel_parsers::thinking;
use tracepanel_runtime_config::ExtractorSettings;

/// Suffix of the synthetic id given to reasoning lifted out of a tool step.
pub const INJECTED_THOUGHT_SUFFIX: &str = ":thinking";

/// Prefix of the positional id given to steps that arrive without one.
pub const BLANK_STEP_ID_PREFIX: &str = "step-";

/// Pairing key. Call ids and step ids live in separate namespaces so a call
/// id that happens to equal some step id never merges unrelated calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CallKey {
    Call(String),
    Step(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem {
    Thought(ThoughtItem),
    Tool(ToolItem),
    Todo(TodoSnapshot),
    /// A result that could not be paired with any call.
    Result(TraceStep),
}

impl TimelineItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Thought(item) => &item.id,
            Self::Tool(item) => &item.id,
            Self::Todo(item) => &item.tool.id,
            Self::Result(step) => &step.id,
        }
    }

    /// Earliest timestamp the item carries.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Thought(item) => item.timestamp,
            Self::Tool(item) => item.started_at(),
            Self::Todo(item) => item.tool.started_at(),
            Self::Result(step) => step.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtItem {
    pub id: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub phase_hint: Option<String>,
    /// Lifted out of an action or result step rather than emitted on its own.
    pub injected: bool,
}

/// A tool invocation: at most one start step and at most one end step.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolItem {
    pub id: String,
    pub start: Option<TraceStep>,
    pub end: Option<TraceStep>,
    /// Call id shared by start and end, when the runtime provided one.
    pub call_id: Option<String>,
    pub tool_name: Option<String>,
}

impl ToolItem {
    fn from_start(step: TraceStep) -> Self {
        Self {
            id: step.id.clone(),
            call_id: step.call_id().map(String::from),
            tool_name: step.tool_name().map(String::from),
            start: Some(step),
            end: None,
        }
    }

    fn from_end(step: TraceStep) -> Self {
        Self {
            id: step.id.clone(),
            call_id: step.call_id().map(String::from),
            tool_name: step.tool_name().map(String::from),
            start: None,
            end: Some(step),
        }
    }

    pub fn status(&self) -> ObjectiveStatus {
        let errored = [&self.start, &self.end]
            .into_iter()
            .flatten()
            .any(TraceStep::is_error);
        if errored {
            ObjectiveStatus::Error
        } else if self.end.is_some() {
            ObjectiveStatus::Done
        } else {
            ObjectiveStatus::Running
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start
            .as_ref()
            .and_then(|step| step.timestamp)
            .or_else(|| self.ended_at())
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end.as_ref().and_then(|step| step.timestamp)
    }

    /// Explicit phase carried by either step; the start wins.
    pub fn phase_hint(&self) -> Option<&str> {
        [&self.start, &self.end]
            .into_iter()
            .flatten()
            .find_map(TraceStep::phase_hint)
    }

    fn attach_end(&mut self, step: TraceStep) {
        if self.tool_name.is_none() {
            self.tool_name = step.tool_name().map(String::from);
        }
        self.end = Some(step);
    }

    fn accepts_adjacent_result(&self, result: &TraceStep) -> bool {
        if self.call_id.is_some() || self.end.is_some() {
            return false;
        }
        match (self.tool_name.as_deref(), result.tool_name()) {
            (Some(open), Some(incoming)) => open.eq_ignore_ascii_case(incoming),
            _ => true,
        }
    }
}

/// An action step that published a todo-list snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TodoSnapshot {
    pub tool: ToolItem,
    pub items: Vec<TodoItem>,
}

/// Collapse re-emitted steps: first position, latest payload.
///
/// Steps with an empty id get a positional id. Real ids are reserved first,
/// so a generated id never lands on a step the runtime named itself.
pub fn dedupe_steps(steps: &[TraceStep]) -> Vec<TraceStep> {
    let mut out: Vec<TraceStep> = Vec::with_capacity(steps.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = steps
        .iter()
        .filter(|step| !step.id.trim().is_empty())
        .map(|step| step.id.clone())
        .collect();

    for (index, step) in steps.iter().enumerate() {
        let mut step = step.clone();
        if step.id.trim().is_empty() {
            step.id = claim_id(format!("{BLANK_STEP_ID_PREFIX}{index}"), &mut taken);
        }
        match positions.get(&step.id) {
            Some(&pos) => out[pos] = step,
            None => {
                positions.insert(step.id.clone(), out.len());
                out.push(step);
            }
        }
    }

    out
}

/// One output slot: the item plus reasoning lifted out of the steps merged into it.
struct Slot {
    thoughts: Vec<ThoughtItem>,
    item: TimelineItem,
}

impl Slot {
    fn new(item: TimelineItem) -> Self {
        Self {
            thoughts: Vec::new(),
            item,
        }
    }

    fn tool_mut(&mut self) -> Option<&mut ToolItem> {
        match &mut self.item {
            TimelineItem::Tool(tool) => Some(tool),
            TimelineItem::Todo(snapshot) => Some(&mut snapshot.tool),
            TimelineItem::Thought(_) | TimelineItem::Result(_) => None,
        }
    }
}

/// Pair calls with their results and lift inline reasoning into thought items.
///
/// Steps are expected in arrival order and already deduplicated.
pub fn correlate(steps: &[TraceStep], settings: &ExtractorSettings) -> Vec<TimelineItem> {
    let mut slots: Vec<Slot> = Vec::new();
    let mut open_calls: HashMap<CallKey, usize> = HashMap::new();

    for step in steps {
        match step.kind {
            StepKind::Thought => {
                slots.push(Slot::new(TimelineItem::Thought(thought_from_step(
                    step, settings,
                ))));
            }
            StepKind::Action => {
                let (step, injected) = lift_thinking(step, settings);
                let key = match step.call_id() {
                    Some(call_id) => CallKey::Call(call_id.to_string()),
                    None => CallKey::Step(step.id.clone()),
                };

                if let Some(&index) = open_calls.get(&key) {
                    let slot = &mut slots[index];
                    slot.thoughts.extend(injected);
                    if let Some(tool) = slot.tool_mut() {
                        merge_repeated_start(tool, step);
                    }
                    continue;
                }

                let tool = ToolItem::from_start(step);
                let item = match todo_snapshot(tool.start.as_ref()) {
                    Some(items) => TimelineItem::Todo(TodoSnapshot { tool, items }),
                    None => TimelineItem::Tool(tool),
                };
                let mut slot = Slot::new(item);
                slot.thoughts.extend(injected);
                open_calls.insert(key, slots.len());
                slots.push(slot);
            }
            StepKind::Result => {
                let (step, injected) = lift_thinking(step, settings);

                if let Some(call_id) = step.call_id() {
                    let key = CallKey::Call(call_id.to_string());
                    if let Some(&index) = open_calls.get(&key) {
                        let slot = &mut slots[index];
                        slot.thoughts.extend(injected);
                        if let Some(tool) = slot.tool_mut() {
                            tool.attach_end(step);
                        }
                    } else {
                        let mut slot = Slot::new(TimelineItem::Tool(ToolItem::from_end(step)));
                        slot.thoughts.extend(injected);
                        open_calls.insert(key, slots.len());
                        slots.push(slot);
                    }
                    continue;
                }

                let adjacent = slots
                    .last_mut()
                    .and_then(Slot::tool_mut)
                    .filter(|tool| tool.accepts_adjacent_result(&step));
                match adjacent {
                    Some(tool) => {
                        tool.attach_end(step);
                        if let Some(slot) = slots.last_mut() {
                            slot.thoughts.extend(injected);
                        }
                    }
                    None => {
                        let mut slot = Slot::new(TimelineItem::Result(step));
                        slot.thoughts.extend(injected);
                        slots.push(slot);
                    }
                }
            }
        }
    }

    // Injected ids must not shadow a step id or each other.
    let mut taken: HashSet<String> = steps.iter().map(|step| step.id.clone()).collect();
    let mut items = Vec::with_capacity(slots.len());
    for slot in slots {
        for mut thought in slot.thoughts {
            thought.id = claim_id(thought.id, &mut taken);
            items.push(TimelineItem::Thought(thought));
        }
        items.push(slot.item);
    }
    items
}

/// `base` if free, else the first free `base#N`. The result is marked taken.
fn claim_id(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}#{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// A second start for a known key: keep the first, backfill what it lacked.
fn merge_repeated_start(tool: &mut ToolItem, step: TraceStep) {
    if tool.tool_name.is_none() {
        tool.tool_name = step.tool_name().map(String::from);
    }
    if tool.start.is_none() {
        tool.start = Some(step);
    } else {
        tracing::debug!(
            "Ignoring repeated start {} for open tool call {}",
            step.id,
            tool.id
        );
    }
}

fn todo_snapshot(step: Option<&TraceStep>) -> Option<Vec<TodoItem>> {
    let value = step?.metadata.get(ATTR_TODOS)?;
    match serde_json::from_value::<Vec<TodoItem>>(value.clone()) {
        Ok(items) => Some(items),
        Err(e) => {
            tracing::debug!("Ignoring malformed todo snapshot: {}", e);
            None
        }
    }
}

fn thought_from_step(step: &TraceStep, settings: &ExtractorSettings) -> ThoughtItem {
    let content = if settings.strip_system_reminders {
        strip_system_reminders(&step.content)
    } else {
        step.content.clone()
    };
    let extracted = thinking::extract_with(&content, &settings.syntaxes);
    let text = if extracted.had_thinking {
        [extracted.thinking.as_deref(), Some(extracted.main_content.as_str())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        content.trim().to_string()
    };
    ThoughtItem {
        id: step.id.clone(),
        text,
        timestamp: step.timestamp,
        phase_hint: step.phase_hint().map(String::from),
        injected: false,
    }
}

/// Split reasoning out of a tool step's content.
fn lift_thinking(step: &TraceStep, settings: &ExtractorSettings) -> (TraceStep, Option<ThoughtItem>) {
    let mut step = step.clone();
    if settings.strip_system_reminders {
        step.content = strip_system_reminders(&step.content);
    }
    if !settings.inject_thoughts || !thinking::has_thinking_marker(&step.content, &settings.syntaxes)
    {
        return (step, None);
    }

    let extracted = thinking::extract_with(&step.content, &settings.syntaxes);
    if !extracted.had_thinking {
        return (step, None);
    }
    step.content = extracted.main_content;
    let thought = extracted.thinking.map(|text| ThoughtItem {
        id: format!("{}{}", step.id, INJECTED_THOUGHT_SUFFIX),
        text,
        timestamp: step.timestamp,
        phase_hint: step.phase_hint().map(String::from),
        injected: true,
    });
    (step, thought)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracepanel_core::testing::{action, failed_result, result, thought};
    use tracepanel_core::{StepStatus, TodoStatus};

    fn settings() -> ExtractorSettings {
        ExtractorSettings::default()
    }

    fn ids(items: &[TimelineItem]) -> Vec<&str> {
        items.iter().map(TimelineItem::id).collect()
    }

    fn tool(item: &TimelineItem) -> &ToolItem {
        match item {
            TimelineItem::Tool(tool) => tool,
            other => panic!("expected tool item, got {other:?}"),
        }
    }

    #[test]
    fn call_and_result_merge_into_one_done_item() {
        let steps = vec![
            action("a", "search", Some("c1"), 0),
            result("b", Some("c1"), "found 3", 1),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(items.len(), 1);
        let tool = tool(&items[0]);
        assert_eq!(tool.id, "a");
        assert_eq!(tool.status(), ObjectiveStatus::Done);
        assert_eq!(tool.end.as_ref().map(|s| s.content.as_str()), Some("found 3"));
    }

    #[test]
    fn correlation_keeps_position_with_intervening_events() {
        let mut steps = vec![action("a", "search", Some("c1"), 0)];
        for i in 0..25 {
            steps.push(thought(&format!("t{i}"), "pondering", i + 1));
        }
        steps.push(result("b", Some("c1"), "done", 100));

        let items = correlate(&steps, &settings());
        assert_eq!(items.len(), 26);
        assert_eq!(items[0].id(), "a");
        assert_eq!(tool(&items[0]).status(), ObjectiveStatus::Done);
    }

    #[test]
    fn open_call_is_running_and_error_wins() {
        let items = correlate(&[action("a", "bash", Some("c1"), 0)], &settings());
        assert_eq!(tool(&items[0]).status(), ObjectiveStatus::Running);

        let steps = vec![
            action("a", "bash", Some("c1"), 0),
            failed_result("b", "c1", "exit 1", 1),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(tool(&items[0]).status(), ObjectiveStatus::Error);
    }

    #[test]
    fn retried_start_does_not_duplicate_item() {
        let mut retry = action("a2", "", Some("c1"), 2);
        retry.tool_name = None;
        let mut first = action("a1", "", Some("c1"), 0);
        first.tool_name = None;
        let mut named_retry = action("a3", "fetch", Some("c1"), 3);
        named_retry.status = Some(StepStatus::Running);

        let steps = vec![first, retry, named_retry, result("r", Some("c1"), "ok", 4)];
        let items = correlate(&steps, &settings());
        assert_eq!(ids(&items), vec!["a1"]);
        let tool = tool(&items[0]);
        assert_eq!(tool.start.as_ref().map(|s| s.id.as_str()), Some("a1"));
        assert_eq!(tool.tool_name.as_deref(), Some("fetch"));
        assert_eq!(tool.status(), ObjectiveStatus::Done);
    }

    #[test]
    fn latest_result_for_a_call_wins() {
        let steps = vec![
            action("a", "fetch", Some("c1"), 0),
            result("r1", Some("c1"), "partial", 1),
            result("r2", Some("c1"), "final", 2),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(items.len(), 1);
        assert_eq!(
            tool(&items[0]).end.as_ref().map(|s| s.id.as_str()),
            Some("r2")
        );
    }

    #[test]
    fn result_without_call_id_merges_into_adjacent_open_call() {
        let steps = vec![
            action("a", "grep", None, 0),
            result("r", None, "3 matches", 1),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(items.len(), 1);
        assert_eq!(tool(&items[0]).status(), ObjectiveStatus::Done);
    }

    #[test]
    fn adjacency_fallback_requires_neighbor_and_matching_name() {
        let steps = vec![
            action("a", "grep", None, 0),
            thought("t", "hm", 1),
            result("r", None, "orphan", 2),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(ids(&items), vec!["a", "t", "r"]);
        assert!(matches!(items[2], TimelineItem::Result(_)));

        let mut named = result("r", None, "other tool", 1);
        named.tool_name = Some("bash".into());
        let items = correlate(&[action("a", "grep", None, 0), named], &settings());
        assert_eq!(items.len(), 2);

        let items = correlate(
            &[action("a", "grep", Some("c1"), 0), result("r", None, "x", 1)],
            &settings(),
        );
        assert_eq!(items.len(), 2, "explicit call ids never pair by adjacency");
    }

    #[test]
    fn result_with_unknown_call_id_becomes_end_only_tool() {
        let items = correlate(&[result("r", Some("ghost"), "late", 0)], &settings());
        let tool = tool(&items[0]);
        assert!(tool.start.is_none());
        assert_eq!(tool.call_id.as_deref(), Some("ghost"));
        assert_eq!(tool.status(), ObjectiveStatus::Done);
    }

    #[test]
    fn start_arriving_after_its_result_fills_the_same_item() {
        let steps = vec![
            result("r", Some("c1"), "early", 1),
            action("a", "fetch", Some("c1"), 0),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(items.len(), 1);
        let tool = tool(&items[0]);
        assert_eq!(tool.id, "r");
        assert!(tool.start.is_some());
    }

    #[test]
    fn injected_thought_precedes_its_tool_item() {
        let mut call = action("a", "bash", Some("c1"), 0);
        call.content = "<think>need the logs</think>tail -n 50 app.log".into();
        let items = correlate(&[call], &settings());
        assert_eq!(ids(&items), vec!["a:thinking", "a"]);
        match &items[0] {
            TimelineItem::Thought(t) => {
                assert_eq!(t.text, "need the logs");
                assert!(t.injected);
            }
            other => panic!("expected thought, got {other:?}"),
        }
        let tool = tool(&items[1]);
        assert_eq!(
            tool.start.as_ref().map(|s| s.content.as_str()),
            Some("tail -n 50 app.log")
        );
    }

    #[test]
    fn injection_can_be_disabled() {
        let mut call = action("a", "bash", Some("c1"), 0);
        call.content = "<think>x</think>ls".into();
        let settings = ExtractorSettings {
            inject_thoughts: false,
            ..ExtractorSettings::default()
        };
        let items = correlate(&[call], &settings);
        assert_eq!(ids(&items), vec!["a"]);
    }

    #[test]
    fn thought_steps_are_shown_without_markup() {
        let items = correlate(
            &[thought("t", "prefix :::thinking\nstep one:::\nrest", 0)],
            &settings(),
        );
        match &items[0] {
            TimelineItem::Thought(t) => assert_eq!(t.text, "step one\n\nprefix \nrest"),
            other => panic!("expected thought, got {other:?}"),
        }
    }

    #[test]
    fn todo_snapshot_becomes_todo_item() {
        let mut call = action("a", "TodoWrite", Some("c1"), 0);
        call.metadata.insert(
            ATTR_TODOS.into(),
            json!([
                {"id": "1", "content": "read logs", "status": "completed"},
                {"id": "2", "title": "fix bug", "status": "in_progress"}
            ]),
        );
        let items = correlate(&[call, result("r", Some("c1"), "ok", 1)], &settings());
        match &items[0] {
            TimelineItem::Todo(snapshot) => {
                assert_eq!(snapshot.items.len(), 2);
                assert_eq!(snapshot.items[1].status, TodoStatus::InProgress);
                assert_eq!(snapshot.tool.status(), ObjectiveStatus::Done);
            }
            other => panic!("expected todo, got {other:?}"),
        }
    }

    #[test]
    fn dedupe_keeps_first_position_latest_payload() {
        let mut partial = thought("t", "draft", 0);
        partial.content = "draf".into();
        let steps = vec![
            partial,
            action("a", "grep", None, 1),
            thought("t", "draft complete", 2),
        ];
        let deduped = dedupe_steps(&steps);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "t");
        assert_eq!(deduped[0].content, "draft complete");
    }

    #[test]
    fn dedupe_assigns_positional_ids_to_blank_ids() {
        let steps = vec![thought("", "a", 0), thought(" ", "b", 1)];
        let deduped = dedupe_steps(&steps);
        assert_eq!(deduped[0].id, "step-0");
        assert_eq!(deduped[1].id, "step-1");
    }

    #[test]
    fn correlation_is_stable_across_recomputation() {
        let steps = vec![
            thought("t", "plan", 0),
            action("a", "search", Some("c1"), 1),
            result("b", Some("c1"), "hits", 2),
        ];
        let first = correlate(&steps, &settings());
        let second = correlate(&steps, &settings());
        assert_eq!(first, second);
    }

    #[test]
    fn system_reminders_never_reach_thought_text() {
        let steps = vec![thought(
            "t",
            "Check the logs <system-reminder>do not mention this</system-reminder>",
            0,
        )];
        let items = correlate(&steps, &settings());
        match &items[0] {
            TimelineItem::Thought(item) => assert_eq!(item.text, "Check the logs"),
            other => panic!("expected thought, got {other:?}"),
        }
    }

    #[test]
    fn reminder_stripping_can_be_disabled() {
        let text = "Check <system-reminder>keep me</system-reminder>";
        let settings = ExtractorSettings {
            strip_system_reminders: false,
            ..ExtractorSettings::default()
        };
        let items = correlate(&[thought("t", text, 0)], &settings);
        match &items[0] {
            TimelineItem::Thought(item) => assert_eq!(item.text, text),
            other => panic!("expected thought, got {other:?}"),
        }
    }

    #[test]
    fn call_id_equal_to_another_step_id_does_not_merge() {
        let steps = vec![
            action("x", "grep", None, 0),
            action("a2", "bash", Some("x"), 1),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(ids(&items), vec!["x", "a2"]);
        assert_eq!(tool(&items[1]).tool_name.as_deref(), Some("bash"));
    }

    #[test]
    fn result_for_call_id_named_like_a_step_pairs_with_its_call() {
        let steps = vec![
            action("x", "grep", None, 0),
            action("a2", "bash", Some("x"), 1),
            result("r", Some("x"), "ok", 2),
        ];
        let items = correlate(&steps, &settings());
        assert_eq!(ids(&items), vec!["x", "a2"]);
        assert!(tool(&items[0]).end.is_none());
        assert_eq!(tool(&items[1]).end.as_ref().map(|s| s.id.as_str()), Some("r"));
    }

    #[test]
    fn injected_thought_never_reuses_an_existing_id() {
        let mut call = action("a", "bash", Some("c1"), 1);
        call.content = "<think>why</think>ls".into();
        let steps = vec![thought("a:thinking", "real one", 0), call];
        let items = correlate(&steps, &settings());
        assert_eq!(ids(&items), vec!["a:thinking", "a:thinking#2", "a"]);
    }

    #[test]
    fn positional_ids_skip_ids_the_runtime_used() {
        let steps = vec![thought("", "blank", 0), thought("step-0", "named", 1)];
        let deduped = dedupe_steps(&steps);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "step-0#2");
        assert_eq!(deduped[1].id, "step-0");
        assert_eq!(deduped[1].content, "named");
    }
}
