//! Configuration for the timeline engine.
//!
//! Variant behavior of the engine (which thinking markers to recognize,
//! whether sub-agent runs get their own lanes, the canonical phase order,
//! auto-follow tuning) is expressed here instead of in separate code paths.
//! The CLI reads these types from `tracepanel.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "tracepanel.toml";

/// Phases of the primary lane, in display order.
pub const DEFAULT_CANONICAL_PHASES: &[&str] = &["plan", "search", "execute", "verify", "respond"];

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level engine configuration (persisted as `tracepanel.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PanelConfig {
    #[serde(default)]
    pub extractor: ExtractorSettings,
    #[serde(default)]
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub timeline: TimelineSettings,
    #[serde(default)]
    pub follow: FollowSettings,
    #[serde(default)]
    pub preferences: PreferenceSettings,
}

/// Marker syntax recognized by the thought extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSyntax {
    /// `:::thinking ... :::`
    #[serde(alias = "triple_colon")]
    Colon,
    /// `<think>...</think>` and friends.
    #[serde(alias = "tags")]
    Tag,
    /// A fenced code block labeled `thinking` or `reasoning`.
    #[serde(alias = "code_fence")]
    Fence,
    /// Unknown/invalid values are dropped by compatibility fallbacks.
    #[serde(other)]
    Unknown,
}

impl MarkerSyntax {
    pub const ALL: &'static [MarkerSyntax] =
        &[MarkerSyntax::Colon, MarkerSyntax::Tag, MarkerSyntax::Fence];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractorSettings {
    #[serde(default = "default_syntaxes")]
    pub syntaxes: Vec<MarkerSyntax>,
    /// Split thinking markup out of action/result content into its own item.
    #[serde(default = "default_true")]
    pub inject_thoughts: bool,
    /// Remove `<system-reminder>` blocks the agent runtime appends to step text.
    #[serde(default = "default_true")]
    pub strip_system_reminders: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            syntaxes: default_syntaxes(),
            inject_thoughts: true,
            strip_system_reminders: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannerSettings {
    /// How far into a text the customer-ready key is looked for.
    #[serde(default = "default_prefix_chars")]
    pub customer_ready_prefix_chars: usize,
    #[serde(default = "default_true")]
    pub split_customer_ready: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            customer_ready_prefix_chars: default_prefix_chars(),
            split_customer_ready: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineSettings {
    #[serde(default = "default_canonical_phases")]
    pub canonical_phases: Vec<String>,
    #[serde(default = "default_true")]
    pub subagent_lanes: bool,
    #[serde(default = "default_evidence_preview_limit")]
    pub evidence_preview_limit: usize,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            canonical_phases: default_canonical_phases(),
            subagent_lanes: true,
            evidence_preview_limit: default_evidence_preview_limit(),
            title_max_chars: default_title_max_chars(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowSettings {
    /// Distance from the bottom, in pixels, that still counts as "at the bottom".
    #[serde(default = "default_threshold_px")]
    pub threshold_px: f64,
    /// Platform prefers reduced motion: scroll instantly instead of easing.
    #[serde(default = "default_false")]
    pub reduced_motion: bool,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            threshold_px: default_threshold_px(),
            reduced_motion: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceSettings {
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PreferenceSettings {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_syntaxes() -> Vec<MarkerSyntax> {
    MarkerSyntax::ALL.to_vec()
}
fn default_prefix_chars() -> usize {
    2048
}
fn default_evidence_preview_limit() -> usize {
    3
}
fn default_title_max_chars() -> usize {
    80
}
fn default_summary_max_chars() -> usize {
    160
}
fn default_threshold_px() -> f64 {
    24.0
}
fn default_key_prefix() -> String {
    "tracepanel:filter".to_string()
}
fn default_debounce_ms() -> u64 {
    400
}

pub fn default_canonical_phases() -> Vec<String> {
    DEFAULT_CANONICAL_PHASES
        .iter()
        .map(|phase| (*phase).to_string())
        .collect()
}

/// Parse a config document and apply compatibility fallbacks.
pub fn from_toml_str(raw: &str) -> Result<PanelConfig, ConfigError> {
    let mut config: PanelConfig = toml::from_str(raw)?;
    apply_compat_fallbacks(&mut config);
    Ok(config)
}

/// Read and parse a config file.
pub fn load_from_path(path: &Path) -> Result<PanelConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_toml_str(&raw)
}

/// Repair values that would leave the engine without a usable setting.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut PanelConfig) -> bool {
    let mut changed = false;

    let before = config.extractor.syntaxes.len();
    config
        .extractor
        .syntaxes
        .retain(|syntax| *syntax != MarkerSyntax::Unknown);
    let mut seen = Vec::with_capacity(config.extractor.syntaxes.len());
    config.extractor.syntaxes.retain(|syntax| {
        if seen.contains(syntax) {
            false
        } else {
            seen.push(*syntax);
            true
        }
    });
    if config.extractor.syntaxes.len() != before {
        changed = true;
    }

    let phases: Vec<String> = config
        .timeline
        .canonical_phases
        .iter()
        .map(|phase| phase.trim().to_ascii_lowercase())
        .filter(|phase| !phase.is_empty())
        .collect();
    if phases.is_empty() {
        config.timeline.canonical_phases = default_canonical_phases();
        changed = true;
    } else if phases != config.timeline.canonical_phases {
        config.timeline.canonical_phases = phases;
        changed = true;
    }

    if config.timeline.evidence_preview_limit == 0 {
        config.timeline.evidence_preview_limit = default_evidence_preview_limit();
        changed = true;
    }

    if config.scanner.customer_ready_prefix_chars == 0 {
        config.scanner.customer_ready_prefix_chars = default_prefix_chars();
        changed = true;
    }

    if !config.follow.threshold_px.is_finite() || config.follow.threshold_px < 0.0 {
        config.follow.threshold_px = default_threshold_px();
        changed = true;
    }

    if config.preferences.key_prefix.trim().is_empty() {
        config.preferences.key_prefix = default_key_prefix();
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = PanelConfig::default();
        assert_eq!(cfg.extractor.syntaxes, MarkerSyntax::ALL.to_vec());
        assert!(cfg.extractor.inject_thoughts);
        assert!(cfg.extractor.strip_system_reminders);
        assert_eq!(
            cfg.timeline.canonical_phases,
            vec!["plan", "search", "execute", "verify", "respond"]
        );
        assert!(cfg.timeline.subagent_lanes);
        assert_eq!(cfg.timeline.evidence_preview_limit, 3);
        assert_eq!(cfg.scanner.customer_ready_prefix_chars, 2048);
        assert_eq!(cfg.follow.threshold_px, 24.0);
        assert_eq!(cfg.preferences.key_prefix, "tracepanel:filter");
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = from_toml_str("").expect("parse empty config");
        assert_eq!(cfg, PanelConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = from_toml_str(
            r#"
[extractor]
syntaxes = ["tag"]
strip_system_reminders = false

[timeline]
subagent_lanes = false
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.extractor.syntaxes, vec![MarkerSyntax::Tag]);
        assert!(cfg.extractor.inject_thoughts);
        assert!(!cfg.extractor.strip_system_reminders);
        assert!(!cfg.timeline.subagent_lanes);
        assert_eq!(cfg.timeline.evidence_preview_limit, 3);
    }

    #[test]
    fn syntax_aliases_are_accepted_and_unknown_values_dropped() {
        let cfg = from_toml_str(
            r#"
[extractor]
syntaxes = ["triple_colon", "code_fence", "smoke_signals", "code_fence"]
"#,
        )
        .expect("parse config");
        assert_eq!(
            cfg.extractor.syntaxes,
            vec![MarkerSyntax::Colon, MarkerSyntax::Fence]
        );
    }

    #[test]
    fn apply_compat_fallbacks_repairs_unusable_values() {
        let mut cfg = PanelConfig::default();
        cfg.timeline.canonical_phases = vec!["  ".to_string()];
        cfg.timeline.evidence_preview_limit = 0;
        cfg.follow.threshold_px = -3.0;
        cfg.preferences.key_prefix = String::new();

        assert!(apply_compat_fallbacks(&mut cfg));
        assert_eq!(cfg.timeline.canonical_phases, default_canonical_phases());
        assert_eq!(cfg.timeline.evidence_preview_limit, 3);
        assert_eq!(cfg.follow.threshold_px, 24.0);
        assert_eq!(cfg.preferences.key_prefix, "tracepanel:filter");
    }

    #[test]
    fn apply_compat_fallbacks_normalizes_phase_names() {
        let mut cfg = PanelConfig::default();
        cfg.timeline.canonical_phases = vec![" Plan ".to_string(), "SHIP".to_string()];
        assert!(apply_compat_fallbacks(&mut cfg));
        assert_eq!(cfg.timeline.canonical_phases, vec!["plan", "ship"]);
    }

    #[test]
    fn apply_compat_fallbacks_is_noop_for_defaults() {
        let mut cfg = PanelConfig::default();
        assert!(!apply_compat_fallbacks(&mut cfg));
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[follow]\nthreshold_px = 8.0\nreduced_motion = true\n")
            .expect("write config");
        let cfg = load_from_path(&path).expect("load config");
        assert_eq!(cfg.follow.threshold_px, 8.0);
        assert!(cfg.follow.reduced_motion);
    }

    #[test]
    fn load_from_path_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_from_path(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn config_serializes_back_to_toml() {
        let encoded = toml::to_string(&PanelConfig::default()).expect("serialize config");
        assert!(encoded.contains("canonical_phases"));
        assert!(encoded.contains("threshold_px"));
    }
}
