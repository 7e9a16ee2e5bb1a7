//! Objective filters. Filtering only shapes the view; the panel state is untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracepanel_core::{ObjectiveKind, ObjectiveStatus, PanelLane, PanelObjective, PanelState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveFilter {
    #[default]
    All,
    Active,
    Thought,
    Tool,
    Todo,
    Error,
}

impl ObjectiveFilter {
    pub const ALL: [ObjectiveFilter; 6] = [
        Self::All,
        Self::Active,
        Self::Thought,
        Self::Tool,
        Self::Todo,
        Self::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Thought => "thought",
            Self::Tool => "tool",
            Self::Todo => "todo",
            Self::Error => "error",
        }
    }

    /// Parse a stored filter name; anything unrecognized is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|filter| filter.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn matches(self, objective: &PanelObjective) -> bool {
        match self {
            Self::All => true,
            Self::Active => objective.status.is_open(),
            Self::Thought => objective.kind == ObjectiveKind::Thought,
            Self::Tool => matches!(
                objective.kind,
                ObjectiveKind::Tool | ObjectiveKind::Result | ObjectiveKind::Subagent
            ),
            Self::Todo => objective.kind == ObjectiveKind::Todo,
            Self::Error => objective.status == ObjectiveStatus::Error,
        }
    }
}

impl fmt::Display for ObjectiveFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let names: Vec<_> = Self::ALL.iter().map(|f| f.as_str()).collect();
            format!("unknown filter '{s}' (expected one of: {})", names.join(", "))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseView<'a> {
    pub name: &'a str,
    pub objectives: Vec<&'a PanelObjective>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneView<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub phases: Vec<PhaseView<'a>>,
}

impl LaneView<'_> {
    pub fn objective_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.objectives.len()).sum()
    }
}

/// Phases of `lane` with at least one objective passing `filter`.
pub fn visible_phases<'a>(
    state: &'a PanelState,
    lane: &'a PanelLane,
    filter: ObjectiveFilter,
) -> Vec<PhaseView<'a>> {
    lane.phases
        .iter()
        .filter_map(|phase| {
            let objectives: Vec<&PanelObjective> = phase
                .objective_ids
                .iter()
                .filter_map(|id| state.objective(id))
                .filter(|objective| filter.matches(objective))
                .collect();
            (!objectives.is_empty()).then_some(PhaseView {
                name: phase.name.as_str(),
                objectives,
            })
        })
        .collect()
}

/// Lanes in display order, dropping lanes left empty by `filter`.
pub fn visible_lanes(state: &PanelState, filter: ObjectiveFilter) -> Vec<LaneView<'_>> {
    state
        .ordered_lanes()
        .filter_map(|lane| {
            let phases = visible_phases(state, lane, filter);
            (!phases.is_empty()).then_some(LaneView {
                id: lane.id.as_str(),
                title: lane.title.as_str(),
                phases,
            })
        })
        .collect()
}

/// Last objective shown under `filter`, preferring the active lane.
pub fn latest_visible_objective(state: &PanelState, filter: ObjectiveFilter) -> Option<&str> {
    let lanes = visible_lanes(state, filter);
    let active = state.active_lane_id.as_deref();
    lanes
        .iter()
        .find(|lane| Some(lane.id) == active)
        .and_then(last_in_lane)
        .or_else(|| lanes.iter().rev().find_map(last_in_lane))
}

fn last_in_lane<'a>(lane: &LaneView<'a>) -> Option<&'a str> {
    lane.phases
        .iter()
        .flat_map(|phase| phase.objectives.iter())
        .max_by_key(|objective| objective.started_at)
        .map(|objective| objective.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_panel;
    use tracepanel_core::testing::{action, failed_result, result, thought};
    use tracepanel_core::{PRIMARY_LANE_ID, TraceInputs};
    use tracepanel_runtime_config::PanelConfig;

    fn sample_state() -> PanelState {
        let inputs = TraceInputs {
            steps: vec![
                thought("t", "plan the fix", 0),
                action("a", "Read", Some("c1"), 1),
                result("ra", Some("c1"), "contents", 2),
                action("b", "Bash", Some("c2"), 3),
                failed_result("rb", "c2", "exit 2", 4),
                action("c", "Bash", Some("c3"), 5),
            ],
            ..TraceInputs::default()
        };
        build_panel(&inputs, &PanelConfig::default())
    }

    #[test]
    fn parse_accepts_known_names_only() {
        for filter in ObjectiveFilter::ALL {
            assert_eq!(ObjectiveFilter::parse(filter.as_str()), Some(filter));
        }
        assert_eq!(ObjectiveFilter::parse(" TOOL "), Some(ObjectiveFilter::Tool));
        assert_eq!(ObjectiveFilter::parse("bogus"), None);
        assert!("bogus".parse::<ObjectiveFilter>().is_err());
    }

    #[test]
    fn empty_phases_disappear_without_losing_data() {
        let state = sample_state();
        let lane = state.lane(PRIMARY_LANE_ID).expect("primary lane");

        let thoughts = visible_phases(&state, lane, ObjectiveFilter::Thought);
        assert_eq!(thoughts.len(), 1);
        assert_eq!(thoughts[0].name, "plan");

        let errors = visible_phases(&state, lane, ObjectiveFilter::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].objectives[0].id, "b");

        let active = visible_phases(&state, lane, ObjectiveFilter::Active);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].objectives[0].id, "c");

        assert!(visible_lanes(&state, ObjectiveFilter::Todo).is_empty());
        assert_eq!(state.objectives.len(), 4);
        assert_eq!(visible_phases(&state, lane, ObjectiveFilter::All).len(), 3);
    }

    #[test]
    fn latest_visible_respects_filter() {
        let state = sample_state();
        assert_eq!(latest_visible_objective(&state, ObjectiveFilter::All), Some("c"));
        assert_eq!(latest_visible_objective(&state, ObjectiveFilter::Thought), Some("t"));
        assert_eq!(latest_visible_objective(&state, ObjectiveFilter::Todo), None);
    }
}
