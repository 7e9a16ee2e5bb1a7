//! Todo progress counters and evidence previews.

use std::collections::BTreeSet;
use tracepanel_core::{PanelObjective, TodoItem, TodoStatus, TodoSummary, ToolEvidenceCard};

pub use tracepanel_core::merge_evidence;

pub fn summarize_todos(todos: &[TodoItem]) -> TodoSummary {
    TodoSummary {
        done: todos
            .iter()
            .filter(|todo| todo.status == TodoStatus::Done)
            .count(),
        total: todos.len(),
    }
}

/// Objectives whose evidence list is shown in full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedEvidence {
    ids: BTreeSet<String>,
}

impl ExpandedEvidence {
    pub fn is_expanded(&self, objective_id: &str) -> bool {
        self.ids.contains(objective_id)
    }

    /// Flip the "show all" state; returns the new state.
    pub fn toggle(&mut self, objective_id: &str) -> bool {
        if self.ids.remove(objective_id) {
            false
        } else {
            self.ids.insert(objective_id.to_string());
            true
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Borrowed view over an objective's evidence, capped unless expanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvidencePreview<'a> {
    pub shown: &'a [ToolEvidenceCard],
    /// Cards behind the "show all N" affordance.
    pub hidden: usize,
    pub total: usize,
    pub expanded: bool,
    /// More cards than the preview limit.
    pub collapsible: bool,
}

impl EvidencePreview<'_> {
    /// Label for the expand affordance, if there is anything to expand.
    pub fn expand_label(&self) -> Option<String> {
        if self.hidden > 0 {
            Some(format!("Show all {}", self.total))
        } else if self.expanded && self.collapsible {
            Some("Show less".to_string())
        } else {
            None
        }
    }
}

/// Evidence preview for `objective`: the first `limit` cards, or all of them
/// when expanded. The card list itself is never modified.
pub fn attach_evidence<'a>(
    objective: &'a PanelObjective,
    limit: usize,
    expanded: &ExpandedEvidence,
) -> EvidencePreview<'a> {
    let cards = objective.evidence_cards.as_slice();
    let is_expanded = expanded.is_expanded(&objective.id);
    let shown = if is_expanded {
        cards
    } else {
        &cards[..cards.len().min(limit)]
    };
    EvidencePreview {
        shown,
        hidden: cards.len() - shown.len(),
        total: cards.len(),
        expanded: is_expanded,
        collapsible: cards.len() > limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracepanel_core::testing::todo;
    use tracepanel_core::{ObjectiveKind, ObjectiveStatus};

    fn objective_with_cards(n: usize) -> PanelObjective {
        PanelObjective {
            id: "obj".into(),
            kind: ObjectiveKind::Tool,
            title: "search".into(),
            summary: String::new(),
            detail: String::new(),
            status: ObjectiveStatus::Done,
            phase: "search".into(),
            started_at: None,
            ended_at: None,
            evidence_cards: (0..n)
                .map(|i| ToolEvidenceCard::new(format!("card {i}")))
                .collect(),
            tool_name: None,
            call_id: None,
            linked_lane_id: None,
        }
    }

    #[test]
    fn summarize_counts_done_items() {
        let todos = vec![
            todo("1", "a", TodoStatus::Done),
            todo("2", "b", TodoStatus::InProgress),
            todo("3", "c", TodoStatus::Pending),
            todo("4", "d", TodoStatus::Done),
        ];
        assert_eq!(summarize_todos(&todos), TodoSummary { done: 2, total: 4 });
        assert_eq!(summarize_todos(&[]), TodoSummary::default());
    }

    #[test]
    fn preview_caps_at_limit_until_expanded() {
        let objective = objective_with_cards(5);
        let mut expanded = ExpandedEvidence::default();

        let preview = attach_evidence(&objective, 3, &expanded);
        assert_eq!(preview.shown.len(), 3);
        assert_eq!(preview.hidden, 2);
        assert_eq!(preview.expand_label().as_deref(), Some("Show all 5"));

        assert!(expanded.toggle("obj"));
        let preview = attach_evidence(&objective, 3, &expanded);
        assert_eq!(preview.shown.len(), 5);
        assert_eq!(preview.hidden, 0);
        assert_eq!(preview.expand_label().as_deref(), Some("Show less"));

        assert!(!expanded.toggle("obj"));
        assert_eq!(objective.evidence_cards.len(), 5);
    }

    #[test]
    fn short_lists_have_no_affordance() {
        let objective = objective_with_cards(2);
        let preview = attach_evidence(&objective, 3, &ExpandedEvidence::default());
        assert_eq!(preview.shown.len(), 2);
        assert_eq!(preview.expand_label(), None);
    }

    #[test]
    fn merge_evidence_is_append_only_and_deduplicated() {
        let mut cards = vec![ToolEvidenceCard::new("a")];
        let mut with_url = ToolEvidenceCard::new("a");
        with_url.url = Some("https://example.com".into());

        let added = merge_evidence(
            &mut cards,
            &[ToolEvidenceCard::new("a"), with_url, ToolEvidenceCard::new("b")],
        );
        assert_eq!(added, 2);
        let titles: Vec<_> = cards.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "a", "b"]);
    }
}
