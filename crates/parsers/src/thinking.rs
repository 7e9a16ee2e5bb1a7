//! Thinking-segment extraction.
//!
//! Model output may carry its reasoning inline, wrapped in one of several
//! marker syntaxes. [`extract`] separates that reasoning from the visible
//! answer. While a response is still streaming the closing marker may not
//! have arrived yet; an orphaned opener is treated as reasoning in progress.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracepanel_runtime_config::MarkerSyntax;

// ── Marker patterns ─────────────────────────────────────────────────────────

static COLON_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s):::(?:thinking|reasoning|thought)\b[ \t]*\n?(.*?):::").unwrap()
});
static TAG_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:think|thinking|reasoning)>(.*?)</(?:think|thinking|reasoning)>").unwrap()
});
static FENCE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:thinking|reasoning|thought)[ \t]*\n(.*?)```").unwrap()
});

static COLON_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":::(?:thinking|reasoning|thought)\b").unwrap());
static TAG_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:think|thinking|reasoning)>").unwrap());
static FENCE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:thinking|reasoning|thought)\b").unwrap());

static COLON_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":::").unwrap());
static TAG_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</(?:think|thinking|reasoning)>").unwrap());

fn block_re(syntax: MarkerSyntax) -> Option<&'static Regex> {
    match syntax {
        MarkerSyntax::Colon => Some(&COLON_BLOCK_RE),
        MarkerSyntax::Tag => Some(&TAG_BLOCK_RE),
        MarkerSyntax::Fence => Some(&FENCE_BLOCK_RE),
        MarkerSyntax::Unknown => None,
    }
}

fn open_re(syntax: MarkerSyntax) -> Option<&'static Regex> {
    match syntax {
        MarkerSyntax::Colon => Some(&COLON_OPEN_RE),
        MarkerSyntax::Tag => Some(&TAG_OPEN_RE),
        MarkerSyntax::Fence => Some(&FENCE_OPEN_RE),
        MarkerSyntax::Unknown => None,
    }
}

/// A bare fence closer is ordinary markdown, so fences have no stray-closer cleanup.
fn close_re(syntax: MarkerSyntax) -> Option<&'static Regex> {
    match syntax {
        MarkerSyntax::Colon => Some(&COLON_CLOSE_RE),
        MarkerSyntax::Tag => Some(&TAG_CLOSE_RE),
        MarkerSyntax::Fence | MarkerSyntax::Unknown => None,
    }
}

// ── Extraction ──────────────────────────────────────────────────────────────

/// Result of separating reasoning from visible content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedThinking {
    /// Reasoning bodies in order of appearance, joined by a blank line.
    pub thinking: Option<String>,
    pub main_content: String,
    /// Any marker was found, even one with an empty body.
    pub had_thinking: bool,
}

#[derive(Debug, Clone, Copy)]
struct Block<'a> {
    start: usize,
    end: usize,
    body: &'a str,
}

/// Extract thinking using every known marker syntax.
pub fn extract(text: &str) -> ExtractedThinking {
    extract_with(text, MarkerSyntax::ALL)
}

/// Extract thinking recognizing only `syntaxes`.
///
/// Text without any marker is returned untouched. Otherwise the visible
/// content is trimmed, which keeps re-extraction of `main_content` a no-op.
pub fn extract_with(text: &str, syntaxes: &[MarkerSyntax]) -> ExtractedThinking {
    let mut blocks: Vec<Block<'_>> = syntaxes
        .iter()
        .filter_map(|syntax| block_re(*syntax))
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Block {
                start: whole.start(),
                end: whole.end(),
                body: caps.get(1).map_or("", |m| m.as_str()),
            })
        })
        .collect();
    blocks.sort_by_key(|block| (block.start, std::cmp::Reverse(block.end)));

    let mut segments: Vec<String> = Vec::new();
    let mut main = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut found = false;

    for block in blocks {
        // Overlaps a block that was already taken.
        if block.start < cursor {
            continue;
        }
        main.push_str(&text[cursor..block.start]);
        cursor = block.end;
        found = true;
        push_segment(&mut segments, block.body);
    }
    main.push_str(&text[cursor..]);

    // Removing markers can splice a new marker together; repeat until stable.
    loop {
        let mut changed = false;

        if let Some((start, end)) = earliest_open_marker(&main, syntaxes) {
            found = true;
            push_segment(&mut segments, &main[end..]);
            main.truncate(start);
            changed = true;
        }

        if !segments.is_empty() {
            let stripped = strip_stray_closers(&main, syntaxes);
            if stripped != main {
                main = stripped;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    if !found {
        return ExtractedThinking {
            thinking: None,
            main_content: text.to_string(),
            had_thinking: false,
        };
    }

    ExtractedThinking {
        thinking: (!segments.is_empty()).then(|| segments.join("\n\n")),
        main_content: main.trim().to_string(),
        had_thinking: true,
    }
}

/// Text contains any opening marker of `syntaxes`. Cheap pre-check.
pub fn has_thinking_marker(text: &str, syntaxes: &[MarkerSyntax]) -> bool {
    syntaxes
        .iter()
        .filter_map(|syntax| open_re(*syntax))
        .any(|re| re.is_match(text))
}

fn push_segment(segments: &mut Vec<String>, body: &str) {
    let body = body.trim();
    if !body.is_empty() {
        segments.push(body.to_string());
    }
}

fn earliest_open_marker(text: &str, syntaxes: &[MarkerSyntax]) -> Option<(usize, usize)> {
    syntaxes
        .iter()
        .filter_map(|syntax| open_re(*syntax))
        .filter_map(|re| re.find(text))
        .map(|m| (m.start(), m.end()))
        .min_by_key(|(start, _)| *start)
}

fn strip_stray_closers(text: &str, syntaxes: &[MarkerSyntax]) -> String {
    syntaxes
        .iter()
        .filter_map(|syntax| close_re(*syntax))
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}
