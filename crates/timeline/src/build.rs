//! Timeline / phase builder.
//!
//! [`build_panel`] is the single recomputation entry point: it takes every
//! input accumulated so far and returns a fresh [`PanelState`]. Callers decide
//! when to recompute; the builder keeps no state between calls.

use crate::aggregate::summarize_todos;
use crate::correlate::{TimelineItem, TodoSnapshot, ToolItem, correlate, dedupe_steps};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracepanel_core::text::{first_line, preview};
use tracepanel_core::{
    INPUT_KEYS, LaneKind, ObjectiveKind, ObjectiveStatus, OUTPUT_KEYS, PRIMARY_LANE_ID,
    PanelLane, PanelObjective, PanelPhase, PanelState, RunStatus, SUBAGENT_LANE_PREFIX, StepKind,
    StepStatus, StreamState, SubagentRun, TerminalSignal, TodoItem, TodoStatus, TraceInputs,
    TraceStep,
};
use tracepanel_parsers::common::{self, PHASE_EXECUTE, PHASE_PLAN};
use tracepanel_parsers::json_scan;
use tracepanel_runtime_config::{PanelConfig, ScannerSettings, TimelineSettings};

const PRIMARY_LANE_TITLE: &str = "Main agent";

/// Lane id for the sub-agent spawned by `tool_call_id`.
pub fn subagent_lane_id(tool_call_id: &str) -> String {
    format!("{SUBAGENT_LANE_PREFIX}{tool_call_id}")
}

/// An objective with the keys it is ordered by.
struct Placed {
    objective: PanelObjective,
    /// Own timestamp, or the last one seen before it.
    effective_at: Option<DateTime<Utc>>,
    arrival: usize,
}

/// Rebuild the whole view model from `inputs`.
pub fn build_panel(inputs: &TraceInputs, config: &PanelConfig) -> PanelState {
    let steps = dedupe_steps(&inputs.steps);
    let items = correlate(&steps, &config.extractor);

    let runs: HashMap<&str, &SubagentRun> = inputs
        .subagents
        .values()
        .map(|run| (run.tool_call_id.as_str(), run))
        .collect();

    let mut placed = Vec::with_capacity(items.len());
    let mut last_seen: Option<DateTime<Utc>> = None;
    let mut latest_snapshot: Option<&[TodoItem]> = None;

    for (arrival, item) in items.iter().enumerate() {
        if let Some(at) = item.timestamp() {
            last_seen = Some(last_seen.map_or(at, |prev| prev.max(at)));
        }
        if let TimelineItem::Todo(snapshot) = item {
            latest_snapshot = Some(snapshot.items.as_slice());
        }
        let objective = objective_for_item(item, inputs, &runs, config);
        placed.push(Placed {
            objective,
            effective_at: item.timestamp().or(last_seen),
            arrival,
        });
    }

    let mut state = PanelState::empty();

    let phases = group_into_phases(&mut placed, &config.timeline.canonical_phases);
    insert_lane(
        &mut state,
        PanelLane {
            id: PRIMARY_LANE_ID.to_string(),
            title: PRIMARY_LANE_TITLE.to_string(),
            kind: LaneKind::Primary,
            objective_ids: phases
                .iter()
                .flat_map(|phase| phase.objective_ids.iter().cloned())
                .collect(),
            phases,
        },
    );
    for p in placed {
        state.objectives.insert(p.objective.id.clone(), p.objective);
    }

    if config.timeline.subagent_lanes {
        let mut ordered_runs: Vec<&SubagentRun> = runs.values().copied().collect();
        ordered_runs.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.tool_call_id.cmp(&b.tool_call_id))
        });
        for run in ordered_runs {
            let objective_id = free_objective_id(&state, subagent_objective_id(run));
            let (lane, objective) = subagent_lane(run, objective_id, &config.timeline);
            state.objectives.insert(objective.id.clone(), objective);
            insert_lane(&mut state, lane);
        }
    }

    let todos = if inputs.todos.is_empty() {
        latest_snapshot.unwrap_or_default()
    } else {
        inputs.todos.as_slice()
    };
    state.todo_summary = summarize_todos(todos);
    state.run_status = run_status(state.objectives.values(), inputs.stream);
    state.active_objective_id = active_objective(&state);
    state.active_lane_id = state.active_objective_id.as_deref().and_then(|id| {
        state
            .ordered_lanes()
            .find(|lane| lane.objective_ids.iter().any(|oid| oid == id))
            .map(|lane| lane.id.clone())
    });
    state.updated_at = inputs.latest_timestamp();
    state
}

fn insert_lane(state: &mut PanelState, lane: PanelLane) {
    state.lane_order.push(lane.id.clone());
    state.lanes.insert(lane.id.clone(), lane);
}

/// Canonical phases first in configured order, then others in first-seen order.
/// Inside a phase: effective timestamp, then arrival.
fn group_into_phases(placed: &mut [Placed], canonical: &[String]) -> Vec<PanelPhase> {
    // `placed` is still in arrival order here.
    let mut trailing: Vec<String> = Vec::new();
    for p in placed.iter() {
        let phase = &p.objective.phase;
        if !canonical.contains(phase) && !trailing.contains(phase) {
            trailing.push(phase.clone());
        }
    }

    placed.sort_by_key(|p| (p.effective_at, p.arrival));
    let mut buckets: HashMap<&str, Vec<String>> = HashMap::new();
    for p in placed.iter() {
        buckets
            .entry(p.objective.phase.as_str())
            .or_default()
            .push(p.objective.id.clone());
    }

    canonical
        .iter()
        .chain(trailing.iter())
        .filter_map(|name| {
            buckets.remove(name.as_str()).map(|objective_ids| PanelPhase {
                name: name.clone(),
                objective_ids,
            })
        })
        .collect()
}

fn objective_for_item(
    item: &TimelineItem,
    inputs: &TraceInputs,
    runs: &HashMap<&str, &SubagentRun>,
    config: &PanelConfig,
) -> PanelObjective {
    let settings = &config.timeline;
    match item {
        TimelineItem::Thought(thought) => {
            let phase = resolve_phase(thought.phase_hint.as_deref(), || PHASE_PLAN.to_string());
            PanelObjective {
                id: thought.id.clone(),
                kind: ObjectiveKind::Thought,
                title: preview(first_line(&thought.text).unwrap_or("Thinking"), settings.title_max_chars),
                summary: preview(&thought.text, settings.summary_max_chars),
                detail: thought.text.clone(),
                status: ObjectiveStatus::Done,
                phase,
                started_at: thought.timestamp,
                ended_at: thought.timestamp,
                evidence_cards: Vec::new(),
                tool_name: None,
                call_id: None,
                linked_lane_id: None,
            }
        }
        TimelineItem::Tool(tool) => tool_objective(tool, inputs, runs, config),
        TimelineItem::Todo(snapshot) => todo_objective(snapshot, settings),
        TimelineItem::Result(step) => result_objective(step, &config.scanner, settings),
    }
}

fn tool_objective(
    tool: &ToolItem,
    inputs: &TraceInputs,
    runs: &HashMap<&str, &SubagentRun>,
    config: &PanelConfig,
) -> PanelObjective {
    let settings = &config.timeline;
    let tool_name = tool.tool_name.as_deref();
    let title = preview(tool_name.unwrap_or("Tool call"), settings.title_max_chars);

    let input = tool.start.as_ref().map(step_input).unwrap_or_default();
    let output = tool.end.as_ref().map(step_output).unwrap_or_default();
    let split = (config.scanner.split_customer_ready && !output.is_empty())
        .then(|| json_scan::split_customer_ready(&output, config.scanner.customer_ready_prefix_chars))
        .flatten();

    let summary = match &split {
        Some(split) => preview(&split.payload.customer_ready, settings.summary_max_chars),
        None if !output.is_empty() => preview(&output, settings.summary_max_chars),
        None => preview(&input, settings.summary_max_chars),
    };

    let mut detail_parts: Vec<String> = Vec::new();
    if !input.is_empty() {
        detail_parts.push(format!("Input:\n{input}"));
    }
    match &split {
        Some(split) => {
            detail_parts.push(format!("Answer:\n{}", split.payload.customer_ready));
            if !split.payload.internal_notes.is_empty() {
                detail_parts.push(format!("Internal notes:\n{}", split.payload.internal_notes));
            }
            if let Some(file_name) = &split.payload.file_name {
                detail_parts.push(format!("File: {file_name}"));
            }
        }
        None if !output.is_empty() => detail_parts.push(format!("Output:\n{output}")),
        None => {}
    }

    let call_id = tool.call_id.as_deref();
    let run = call_id.and_then(|id| runs.get(id).copied());
    let linked_lane_id = match run {
        Some(run) if settings.subagent_lanes => Some(subagent_lane_id(&run.tool_call_id)),
        Some(run) => {
            detail_parts.push(subagent_detail(run));
            None
        }
        None => None,
    };

    let evidence_cards = call_id
        .and_then(|id| inputs.evidence.get(id))
        .map(|update| update.cards.clone())
        .unwrap_or_default();

    let correlated = tool.start.is_some();
    let phase = resolve_phase(tool.phase_hint(), || {
        common::default_phase(StepKind::Action, tool_name, correlated)
    });

    PanelObjective {
        id: tool.id.clone(),
        kind: ObjectiveKind::Tool,
        title,
        summary,
        detail: detail_parts.join("\n\n"),
        status: tool.status(),
        phase,
        started_at: tool.started_at(),
        ended_at: tool.ended_at(),
        evidence_cards,
        tool_name: tool.tool_name.clone(),
        call_id: tool.call_id.clone(),
        linked_lane_id,
    }
}

fn todo_objective(snapshot: &TodoSnapshot, settings: &TimelineSettings) -> PanelObjective {
    let counts = summarize_todos(&snapshot.items);
    let detail = snapshot
        .items
        .iter()
        .map(|todo| {
            let mark = match todo.status {
                TodoStatus::Done => "[x]",
                TodoStatus::InProgress => "[~]",
                TodoStatus::Pending => "[ ]",
            };
            format!("{mark} {}", todo.title)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let current = snapshot
        .items
        .iter()
        .find(|todo| todo.status == TodoStatus::InProgress)
        .map(|todo| todo.title.as_str());

    let tool = &snapshot.tool;
    PanelObjective {
        id: tool.id.clone(),
        kind: ObjectiveKind::Todo,
        title: preview(
            &format!("Todo list ({}/{})", counts.done, counts.total),
            settings.title_max_chars,
        ),
        summary: preview(current.unwrap_or(""), settings.summary_max_chars),
        detail,
        status: tool.status(),
        phase: resolve_phase(tool.phase_hint(), || PHASE_PLAN.to_string()),
        started_at: tool.started_at(),
        ended_at: tool.ended_at(),
        evidence_cards: Vec::new(),
        tool_name: tool.tool_name.clone(),
        call_id: tool.call_id.clone(),
        linked_lane_id: None,
    }
}

fn result_objective(
    step: &TraceStep,
    scanner: &ScannerSettings,
    settings: &TimelineSettings,
) -> PanelObjective {
    let split = scanner
        .split_customer_ready
        .then(|| json_scan::split_customer_ready(&step.content, scanner.customer_ready_prefix_chars))
        .flatten();
    let (summary_source, detail) = match &split {
        Some(split) if split.payload.internal_notes.is_empty() => {
            (split.payload.customer_ready.as_str(), split.payload.customer_ready.clone())
        }
        Some(split) => (
            split.payload.customer_ready.as_str(),
            format!(
                "{}\n\nInternal notes:\n{}",
                split.payload.customer_ready, split.payload.internal_notes
            ),
        ),
        None => (step.content.as_str(), step.content.clone()),
    };
    let status = match step.status {
        Some(StepStatus::Error) => ObjectiveStatus::Error,
        _ => ObjectiveStatus::Done,
    };
    PanelObjective {
        id: step.id.clone(),
        kind: ObjectiveKind::Result,
        title: preview(step.tool_name().unwrap_or("Result"), settings.title_max_chars),
        summary: preview(summary_source, settings.summary_max_chars),
        detail,
        status,
        phase: resolve_phase(step.phase_hint(), || {
            common::default_phase(StepKind::Result, step.tool_name(), false)
        }),
        started_at: step.timestamp,
        ended_at: step.timestamp,
        evidence_cards: Vec::new(),
        tool_name: step.tool_name().map(String::from),
        call_id: None,
        linked_lane_id: None,
    }
}

fn subagent_objective_id(run: &SubagentRun) -> String {
    format!("{}:run", subagent_lane_id(&run.tool_call_id))
}

/// `base`, or `base#N` when a step already uses that id.
fn free_objective_id(state: &PanelState, base: String) -> String {
    if !state.objectives.contains_key(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}#{n}");
        if !state.objectives.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn subagent_lane(
    run: &SubagentRun,
    objective_id: String,
    settings: &TimelineSettings,
) -> (PanelLane, PanelObjective) {
    let lane_id = subagent_lane_id(&run.tool_call_id);
    let label = if run.subagent_type.trim().is_empty() {
        "Sub-agent"
    } else {
        run.subagent_type.trim()
    };

    let objective = PanelObjective {
        id: objective_id.clone(),
        kind: ObjectiveKind::Subagent,
        title: preview(label, settings.title_max_chars),
        summary: preview(
            run.excerpt.as_deref().unwrap_or(&run.task),
            settings.summary_max_chars,
        ),
        detail: subagent_detail(run),
        status: objective_status(run.status),
        phase: PHASE_EXECUTE.to_string(),
        started_at: Some(run.start_time),
        ended_at: run.end_time,
        evidence_cards: Vec::new(),
        tool_name: None,
        call_id: Some(run.tool_call_id.clone()),
        linked_lane_id: None,
    };
    let lane = PanelLane {
        id: lane_id,
        title: preview(&format!("{label}: {}", run.task), settings.title_max_chars),
        kind: LaneKind::Subagent,
        objective_ids: vec![objective_id.clone()],
        phases: vec![PanelPhase {
            name: PHASE_EXECUTE.to_string(),
            objective_ids: vec![objective_id],
        }],
    };
    (lane, objective)
}

fn subagent_detail(run: &SubagentRun) -> String {
    let mut parts = vec![format!("Sub-agent task:\n{}", run.task)];
    if let Some(thinking) = run.thinking.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(format!("Sub-agent thinking:\n{thinking}"));
    }
    if let Some(excerpt) = run.excerpt.as_deref().filter(|e| !e.trim().is_empty()) {
        parts.push(format!("Sub-agent output:\n{excerpt}"));
    }
    parts.join("\n\n")
}

fn objective_status(status: StepStatus) -> ObjectiveStatus {
    match status {
        StepStatus::Pending => ObjectiveStatus::Pending,
        StepStatus::Running => ObjectiveStatus::Running,
        StepStatus::Done => ObjectiveStatus::Done,
        StepStatus::Error => ObjectiveStatus::Error,
        StepStatus::Unknown => ObjectiveStatus::Unknown,
    }
}

fn resolve_phase(hint: Option<&str>, fallback: impl FnOnce() -> String) -> String {
    hint.and_then(common::normalize_phase).unwrap_or_else(fallback)
}

/// Tool input for display: structured metadata if present, else the step text.
fn step_input(step: &TraceStep) -> String {
    match step.metadata_any(INPUT_KEYS) {
        Some(value) => value_text(value),
        None => step.content.trim().to_string(),
    }
}

fn step_output(step: &TraceStep) -> String {
    let content = step.content.trim();
    if !content.is_empty() {
        return content.to_string();
    }
    step.metadata_any(OUTPUT_KEYS)
        .map(value_text)
        .unwrap_or_default()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Error beats open; an ended stream without a terminal signal never reads as done.
fn run_status<'a>(
    objectives: impl Iterator<Item = &'a PanelObjective>,
    stream: StreamState,
) -> RunStatus {
    let mut any = false;
    let mut any_open = false;
    let mut any_unknown = false;
    for objective in objectives {
        any = true;
        match objective.status {
            ObjectiveStatus::Error => return RunStatus::Error,
            ObjectiveStatus::Unknown => any_unknown = true,
            status if status.is_open() => any_open = true,
            _ => {}
        }
    }

    match stream {
        StreamState::Ended(Some(TerminalSignal::Error)) => RunStatus::Error,
        StreamState::Streaming if any_open => RunStatus::Running,
        StreamState::Streaming if !any => RunStatus::Pending,
        StreamState::Streaming if any_unknown => RunStatus::Unknown,
        StreamState::Streaming => RunStatus::Done,
        StreamState::Ended(Some(TerminalSignal::Done)) => RunStatus::Done,
        StreamState::Ended(None) if any_open || any_unknown || !any => RunStatus::Unknown,
        StreamState::Ended(None) => RunStatus::Done,
    }
}

/// Latest open objective, else the last one in the primary lane.
fn active_objective(state: &PanelState) -> Option<String> {
    state
        .ordered_objectives()
        .filter(|objective| objective.status.is_open())
        .max_by_key(|objective| objective.started_at)
        .or_else(|| {
            let lane = state.lane(PRIMARY_LANE_ID)?;
            lane.objective_ids.last().and_then(|id| state.objective(id))
        })
        .map(|objective| objective.id.clone())
}
