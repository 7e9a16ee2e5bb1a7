use crate::config;
use crate::output::{OutputFormat, ReplayOutput, frame_line, render_text};
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;
use tracepanel_core::jsonl::{TraceLine, parse_line};
use tracepanel_local_store::{FilterPreferences, JsonFileStore};
use tracepanel_runtime_config::PanelConfig;
use tracepanel_timeline::filter::visible_lanes;
use tracepanel_timeline::{ObjectiveFilter, SessionUpdate, TraceSession};

pub struct ReplayOptions<'a> {
    pub format: OutputFormat,
    pub filter: Option<ObjectiveFilter>,
    pub session: Option<&'a str>,
    pub frames: bool,
}

/// Stream a trace log through a session, recomputing after every line.
pub fn run_replay(log: &Path, panel_config: PanelConfig, opts: ReplayOptions<'_>) -> Result<()> {
    let file = std::fs::File::open(log)
        .with_context(|| format!("Failed to open trace log {}", log.display()))?;
    let mut prefs = FilterPreferences::new(
        JsonFileStore::new(config::preferences_path()?),
        &panel_config.preferences,
    );
    let evidence_limit = panel_config.timeline.evidence_preview_limit;
    let mut session = TraceSession::new(panel_config);

    // With --session, the active session is pinned and lines belonging to
    // other sessions in the log are dropped by the session itself.
    if let Some(id) = opts.session {
        session.switch_session(id);
    }
    let mut log_session: Option<String> = None;
    let mut filter_scope: Option<Option<String>> = None;
    sync_filter(&mut session, &mut prefs, &opts, &mut filter_scope);

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", log.display()))?;
        let Some(parsed) = parse_line(&line, index + 1)
            .with_context(|| format!("Invalid trace log {}", log.display()))?
        else {
            continue;
        };

        if opts.session.is_some() {
            if let TraceLine::Session { session_id } = &parsed {
                log_session = Some(session_id.clone());
            } else if let Some(update) = SessionUpdate::from_line(parsed) {
                session.apply(log_session.as_deref(), update);
            }
        } else {
            session.apply_line(parsed);
        }
        sync_filter(&mut session, &mut prefs, &opts, &mut filter_scope);

        let frame = session.refresh();
        if let Some(request) = &frame.scroll {
            session.follow_mut().resolve_frame(request.ticket);
        }
        if opts.frames {
            println!("{}", frame_line(index + 1, &frame));
        }
    }

    if let Err(e) = prefs.flush() {
        tracing::warn!("Failed to persist filter preference: {}", e);
    }

    if opts.frames {
        return Ok(());
    }

    let panel = session.recompute();
    match opts.format {
        OutputFormat::Text => print!(
            "{}",
            render_text(&panel, session.session_id(), session.filter(), evidence_limit)
        ),
        OutputFormat::Json => {
            let doc = ReplayOutput {
                session_id: session.session_id(),
                filter: session.filter(),
                panel: &panel,
                visible: visible_lanes(&panel, session.filter()),
            };
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

/// Pick the filter whenever the session changes: the explicit one (remembered
/// for that session) or the stored one.
fn sync_filter(
    session: &mut TraceSession,
    prefs: &mut FilterPreferences<JsonFileStore>,
    opts: &ReplayOptions<'_>,
    scope: &mut Option<Option<String>>,
) {
    let current = session.session_id().map(String::from);
    if scope.as_ref() == Some(&current) {
        return;
    }
    let filter = match opts.filter {
        Some(filter) => {
            if current.is_some() {
                prefs.record(current.as_deref(), filter, Instant::now());
            }
            filter
        }
        None => prefs.load(current.as_deref()),
    };
    session.set_filter(filter);
    *scope = Some(current);
}
