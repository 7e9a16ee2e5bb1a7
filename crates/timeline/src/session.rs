//! Host-side holder for one conversation's accumulated trace.
//!
//! [`TraceSession`] owns everything that outlives a single recomputation: the
//! growing inputs, the `updated_at` watermark, the follow controller and the
//! expanded-evidence set. The view model itself is always rebuilt from scratch
//! by [`build_panel`].

use crate::aggregate::{EvidencePreview, ExpandedEvidence, attach_evidence};
use crate::build::build_panel;
use crate::filter::{ObjectiveFilter, latest_visible_objective};
use crate::follow::{FollowController, ScrollRequest};
use chrono::{DateTime, Utc};
use tracepanel_core::jsonl::TraceLine;
use tracepanel_core::{
    PanelObjective, PanelState, StreamState, SubagentRun, TerminalSignal, TodoItem,
    ToolEvidenceUpdateEvent, TraceInputs, TraceStep,
};
use tracepanel_runtime_config::PanelConfig;

/// A batch of new events for a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Steps(Vec<TraceStep>),
    /// Full snapshot; replaces the previous list.
    Todos(Vec<TodoItem>),
    Evidence(ToolEvidenceUpdateEvent),
    Subagent(SubagentRun),
    End(Option<TerminalSignal>),
}

impl SessionUpdate {
    /// Update carried by a trace-log line. `session` lines carry none.
    pub fn from_line(line: TraceLine) -> Option<Self> {
        match line {
            TraceLine::Step { step } => Some(Self::Steps(vec![step])),
            TraceLine::Todos { items } => Some(Self::Todos(items)),
            TraceLine::Evidence(update) => Some(Self::Evidence(update)),
            TraceLine::Subagent(run) => Some(Self::Subagent(run)),
            TraceLine::End { signal } => Some(Self::End(signal)),
            _ => None,
        }
    }
}

/// Result of one recomputation plus the scroll it triggered.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub panel: PanelState,
    pub scroll: Option<ScrollRequest>,
}

#[derive(Debug, Clone)]
pub struct TraceSession {
    session_id: Option<String>,
    config: PanelConfig,
    inputs: TraceInputs,
    watermark: Option<DateTime<Utc>>,
    follow: FollowController,
    expanded: ExpandedEvidence,
    filter: ObjectiveFilter,
}

impl TraceSession {
    pub fn new(config: PanelConfig) -> Self {
        Self {
            session_id: None,
            follow: FollowController::new(&config.follow),
            config,
            inputs: TraceInputs::default(),
            watermark: None,
            expanded: ExpandedEvidence::default(),
            filter: ObjectiveFilter::All,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn inputs(&self) -> &TraceInputs {
        &self.inputs
    }

    pub fn filter(&self) -> ObjectiveFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: ObjectiveFilter) {
        self.filter = filter;
    }

    pub fn follow(&self) -> &FollowController {
        &self.follow
    }

    pub fn follow_mut(&mut self) -> &mut FollowController {
        &mut self.follow
    }

    pub fn expanded(&self) -> &ExpandedEvidence {
        &self.expanded
    }

    pub fn toggle_evidence(&mut self, objective_id: &str) -> bool {
        self.expanded.toggle(objective_id)
    }

    pub fn evidence_preview<'a>(&self, objective: &'a PanelObjective) -> EvidencePreview<'a> {
        attach_evidence(
            objective,
            self.config.timeline.evidence_preview_limit,
            &self.expanded,
        )
    }

    /// Make `session_id` the active session. A different id discards all
    /// accumulated state. Returns whether a reset happened.
    pub fn switch_session(&mut self, session_id: &str) -> bool {
        if self.session_id.as_deref() == Some(session_id) {
            return false;
        }
        tracing::debug!(
            "Switching trace session {:?} -> {}",
            self.session_id,
            session_id
        );
        self.session_id = Some(session_id.to_string());
        self.inputs = TraceInputs::default();
        self.watermark = None;
        self.expanded.clear();
        self.follow.reset();
        true
    }

    /// Merge a batch. Batches tagged with another session are dropped; an
    /// untagged batch always belongs to the current session. Returns whether
    /// the batch was applied.
    pub fn apply(&mut self, session_id: Option<&str>, update: SessionUpdate) -> bool {
        self.apply_at(session_id, update, Utc::now())
    }

    /// [`apply`](Self::apply) with an explicit arrival time. Every applied
    /// batch moves the watermark to at least `now`, whatever the batch holds.
    pub fn apply_at(
        &mut self,
        session_id: Option<&str>,
        update: SessionUpdate,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(incoming) = session_id {
            if let Some(current) = self.session_id.as_deref().filter(|c| *c != incoming) {
                tracing::warn!(
                    "Dropping batch for inactive session {} (active: {})",
                    incoming,
                    current
                );
                return false;
            }
            if self.session_id.is_none() {
                self.session_id = Some(incoming.to_string());
            }
        }

        match update {
            SessionUpdate::Steps(steps) => {
                if !steps.is_empty() {
                    self.inputs.steps.extend(steps);
                    self.inputs.stream = StreamState::Streaming;
                }
            }
            SessionUpdate::Todos(items) => self.inputs.todos = items,
            SessionUpdate::Evidence(update) => {
                self.inputs.merge_evidence(update);
            }
            SessionUpdate::Subagent(run) => {
                self.inputs.subagents.insert(run.tool_call_id.clone(), run);
            }
            SessionUpdate::End(signal) => self.inputs.stream = StreamState::Ended(signal),
        }
        self.watermark = Some(self.watermark.map_or(now, |seen| seen.max(now)));
        true
    }

    /// Apply one trace-log line. A `session` line switches sessions.
    pub fn apply_line(&mut self, line: TraceLine) -> bool {
        if let TraceLine::Session { session_id } = &line {
            self.switch_session(session_id);
            return true;
        }
        match SessionUpdate::from_line(line) {
            Some(update) => self.apply(None, update),
            None => false,
        }
    }

    /// Rebuild the view model from everything accumulated so far.
    /// `updated_at` never moves backwards within a session.
    pub fn recompute(&mut self) -> PanelState {
        let mut panel = build_panel(&self.inputs, &self.config);
        let updated_at = match (self.watermark, panel.updated_at) {
            (Some(seen), Some(now)) => Some(seen.max(now)),
            (seen, now) => seen.or(now),
        };
        self.watermark = updated_at;
        panel.updated_at = updated_at;
        panel
    }

    /// Recompute and let the follow controller react to the new view.
    pub fn refresh(&mut self) -> Frame {
        let panel = self.recompute();
        let latest = latest_visible_objective(&panel, self.filter);
        let scroll = self.follow.on_update(latest);
        Frame { panel, scroll }
    }
}
