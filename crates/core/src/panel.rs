//! Immutable view model produced by the timeline engine.
//!
//! A [`PanelState`] is rebuilt from scratch on every recomputation; nothing in
//! here is edited in place by the renderer.

use crate::trace::ToolEvidenceCard;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lane id of the main reasoning thread.
pub const PRIMARY_LANE_ID: &str = "primary";
/// Prefix of lanes created for sub-agent runs.
pub const SUBAGENT_LANE_PREFIX: &str = "subagent:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Pending,
    Running,
    Done,
    Error,
    Unknown,
}

impl ObjectiveStatus {
    /// Still waiting for a closing event.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    Thought,
    Tool,
    Todo,
    Result,
    Subagent,
}

impl ObjectiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::Tool => "tool",
            Self::Todo => "todo",
            Self::Result => "result",
            Self::Subagent => "subagent",
        }
    }
}

/// A normalized unit of displayed work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelObjective {
    pub id: String,
    pub kind: ObjectiveKind,
    pub title: String,
    pub summary: String,
    pub detail: String,
    pub status: ObjectiveStatus,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_cards: Vec<ToolEvidenceCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Lane opened by the sub-agent this objective spawned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_lane_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneKind {
    Primary,
    Subagent,
}

/// A named display section inside a lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelPhase {
    pub name: String,
    pub objective_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelLane {
    pub id: String,
    pub title: String,
    pub kind: LaneKind,
    /// Objective ids in display order (phase by phase).
    pub objective_ids: Vec<String>,
    pub phases: Vec<PanelPhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing has arrived yet.
    Pending,
    Running,
    Done,
    Error,
    /// The stream ended with open objectives and no terminal signal.
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TodoSummary {
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelState {
    pub lane_order: Vec<String>,
    pub lanes: BTreeMap<String, PanelLane>,
    pub objectives: BTreeMap<String, PanelObjective>,
    pub active_lane_id: Option<String>,
    pub active_objective_id: Option<String>,
    pub run_status: RunStatus,
    pub todo_summary: TodoSummary,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PanelState {
    pub fn empty() -> Self {
        Self {
            lane_order: Vec::new(),
            lanes: BTreeMap::new(),
            objectives: BTreeMap::new(),
            active_lane_id: None,
            active_objective_id: None,
            run_status: RunStatus::Pending,
            todo_summary: TodoSummary::default(),
            updated_at: None,
        }
    }

    pub fn objective(&self, id: &str) -> Option<&PanelObjective> {
        self.objectives.get(id)
    }

    pub fn lane(&self, id: &str) -> Option<&PanelLane> {
        self.lanes.get(id)
    }

    /// Lanes in display order.
    pub fn ordered_lanes(&self) -> impl Iterator<Item = &PanelLane> {
        self.lane_order.iter().filter_map(|id| self.lanes.get(id))
    }

    /// Every objective in display order: lane by lane, phase by phase.
    pub fn ordered_objectives(&self) -> impl Iterator<Item = &PanelObjective> {
        self.ordered_lanes()
            .flat_map(|lane| lane.objective_ids.iter())
            .filter_map(|id| self.objectives.get(id))
    }
}
