//! Per-event text normalization for streamed agent output.
//!
//! - [`thinking`] separates inline reasoning from visible content.
//! - [`json_scan`] recovers JSON objects embedded in narration.
//! - [`common`] holds the tool-name and phase heuristics.

pub mod common;
pub mod json_scan;
pub mod thinking;

pub use json_scan::{CustomerReadyPayload, CustomerReadySplit, extract_json_objects};
pub use thinking::{ExtractedThinking, extract, extract_with};
