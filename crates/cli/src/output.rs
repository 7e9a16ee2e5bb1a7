use serde::Serialize;
use std::fmt::Write as _;
use tracepanel_core::text::truncate_str;
use tracepanel_core::{PanelObjective, PanelState};
use tracepanel_timeline::aggregate::{ExpandedEvidence, attach_evidence};
use tracepanel_timeline::filter::{LaneView, visible_lanes};
use tracepanel_timeline::{Frame, ObjectiveFilter};

/// Output format for replayed panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// JSON document printed by `replay --format json`.
#[derive(Debug, Serialize)]
pub struct ReplayOutput<'a> {
    pub session_id: Option<&'a str>,
    pub filter: ObjectiveFilter,
    pub panel: &'a PanelState,
    pub visible: Vec<LaneView<'a>>,
}

/// One status line per recomputation.
pub fn frame_line(index: usize, frame: &Frame) -> String {
    let panel = &frame.panel;
    format!(
        "frame {index}: status={} objectives={} lanes={} active={} scroll={}",
        panel.run_status.as_str(),
        panel.objectives.len(),
        panel.lane_order.len(),
        panel.active_objective_id.as_deref().unwrap_or("-"),
        frame
            .scroll
            .as_ref()
            .map_or("-", |request| request.target_id.as_str()),
    )
}

/// Human-readable panel: lanes, phases, objectives, capped evidence.
pub fn render_text(
    panel: &PanelState,
    session_id: Option<&str>,
    filter: ObjectiveFilter,
    evidence_limit: usize,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "session {}  status {}  todos {}/{}",
        session_id.unwrap_or("-"),
        panel.run_status.as_str(),
        panel.todo_summary.done,
        panel.todo_summary.total,
    );
    if let Some(updated_at) = panel.updated_at {
        let _ = writeln!(out, "updated {}", updated_at.to_rfc3339());
    }
    let _ = writeln!(out, "filter {filter}");

    let lanes = visible_lanes(panel, filter);
    if lanes.is_empty() {
        let _ = writeln!(out, "\n(no objectives)");
        return out;
    }

    let expanded = ExpandedEvidence::default();
    for lane in lanes {
        let _ = writeln!(out, "\n== {} ({}) ==", lane.title, lane.objective_count());
        for phase in lane.phases {
            let _ = writeln!(out, "-- {} --", phase.name);
            for objective in phase.objectives {
                let active = panel.active_objective_id.as_deref() == Some(objective.id.as_str());
                write_objective(&mut out, objective, active);
                let preview = attach_evidence(objective, evidence_limit, &expanded);
                for card in preview.shown {
                    let _ = writeln!(out, "      * {}", card.title);
                }
                if let Some(label) = preview.expand_label() {
                    let _ = writeln!(out, "      ({label})");
                }
            }
        }
    }
    out
}

fn write_objective(out: &mut String, objective: &PanelObjective, active: bool) {
    let marker = if active { ">" } else { " " };
    let _ = write!(
        out,
        "{marker} [{}] {} {}",
        objective.status.as_str(),
        objective.kind.as_str(),
        objective.title
    );
    if !objective.summary.is_empty() && objective.summary != objective.title {
        let _ = write!(out, ": {}", truncate_str(&objective.summary, 100));
    }
    if let Some(lane) = &objective.linked_lane_id {
        let _ = write!(out, " -> {lane}");
    }
    out.push('\n');
}
