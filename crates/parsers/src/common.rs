//! Name and phase heuristics shared by the timeline builder.
//!
//! Agents name their tools freely (`Read`, `read_file`, `mcp__web_search`),
//! so classification works on lowercased names and a few keyword families.

use regex::Regex;
use std::sync::LazyLock;
use tracepanel_core::StepKind;

pub const PHASE_PLAN: &str = "plan";
pub const PHASE_SEARCH: &str = "search";
pub const PHASE_EXECUTE: &str = "execute";
pub const PHASE_VERIFY: &str = "verify";
pub const PHASE_RESPOND: &str = "respond";

// ── First-wins helper ───────────────────────────────────────────────────────

/// Assign `source` to `target` if `target` is still `None`.
pub fn set_first<T>(target: &mut Option<T>, source: Option<T>) {
    if target.is_none() {
        *target = source;
    }
}

// ── Phase names ─────────────────────────────────────────────────────────────

/// Normalize a phase label: trimmed, lowercased, common synonyms folded.
///
/// Unrecognized labels are kept (lowercased) so they can form their own
/// trailing section. Empty labels yield `None`.
pub fn normalize_phase(raw: &str) -> Option<String> {
    let lower = raw.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    let canonical = match lower.as_str() {
        "plan" | "planning" | "think" | "thinking" => PHASE_PLAN,
        "search" | "research" | "explore" | "exploration" | "gather" => PHASE_SEARCH,
        "execute" | "execution" | "implement" | "act" | "run" | "build" => PHASE_EXECUTE,
        "verify" | "verification" | "test" | "validate" | "check" | "review" => PHASE_VERIFY,
        "respond" | "response" | "answer" | "final" | "report" | "summary" => PHASE_RESPOND,
        _ => return Some(lower),
    };
    Some(canonical.to_string())
}

/// Phase a tool most likely belongs to, judged by its name.
pub fn infer_tool_phase(name: &str) -> &'static str {
    let lower = name.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return PHASE_EXECUTE;
    }
    if is_todo_tool(&lower) || lower.contains("plan") {
        return PHASE_PLAN;
    }
    if ["test", "lint", "check", "verify", "clippy", "typecheck"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return PHASE_VERIFY;
    }
    if matches!(
        lower.as_str(),
        "read" | "read_file" | "view" | "cat" | "open" | "list_dir" | "ls" | "find" | "glob"
    ) || ["grep", "search", "web", "fetch", "browse", "lookup", "query"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return PHASE_SEARCH;
    }
    PHASE_EXECUTE
}

/// Default phase for a step when its metadata carries none.
///
/// `correlated` is false for a result that never found its call.
pub fn default_phase(kind: StepKind, tool_name: Option<&str>, correlated: bool) -> String {
    let phase = match kind {
        StepKind::Thought => PHASE_PLAN,
        StepKind::Result if !correlated => PHASE_RESPOND,
        StepKind::Action | StepKind::Result => tool_name.map_or(PHASE_EXECUTE, infer_tool_phase),
    };
    phase.to_string()
}

// ── Tool families ───────────────────────────────────────────────────────────

/// Tools that publish todo-list snapshots.
pub fn is_todo_tool(name: &str) -> bool {
    let lower = name.trim().to_ascii_lowercase();
    lower.contains("todo")
}

// ── System reminder stripping ───────────────────────────────────────────────

static SYSTEM_REMINDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<system-reminder>.*?</system-reminder>").unwrap());

/// Strip <system-reminder> blocks from text
pub fn strip_system_reminders(text: &str) -> String {
    if !text.contains("<system-reminder>") {
        return text.to_string();
    }
    SYSTEM_REMINDER_RE.replace_all(text, "").trim().to_string()
}
