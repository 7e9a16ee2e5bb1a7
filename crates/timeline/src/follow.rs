//! Auto-follow: keep the newest item in view until the user scrolls away.

use serde::Serialize;
use tracepanel_runtime_config::FollowSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowMode {
    Following,
    /// The user scrolled away; only [`FollowController::follow_latest`] leaves this.
    Manual,
}

/// Scroll position reported by the host, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.client_height - self.scroll_top).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// Identifies one scheduled scroll. Tickets from before a reset never resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrollTicket {
    generation: u64,
    seq: u64,
}

/// A scroll-into-view the host should perform on its next animation frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrollRequest {
    pub ticket: ScrollTicket,
    pub target_id: String,
    pub behavior: ScrollBehavior,
}

#[derive(Debug, Clone)]
pub struct FollowController {
    mode: FollowMode,
    threshold_px: f64,
    reduced_motion: bool,
    generation: u64,
    next_seq: u64,
    pending: Option<ScrollTicket>,
}

impl Default for FollowController {
    fn default() -> Self {
        Self::new(&FollowSettings::default())
    }
}

impl FollowController {
    pub fn new(settings: &FollowSettings) -> Self {
        Self {
            mode: FollowMode::Following,
            threshold_px: settings.threshold_px,
            reduced_motion: settings.reduced_motion,
            generation: 0,
            next_seq: 0,
            pending: None,
        }
    }

    pub fn mode(&self) -> FollowMode {
        self.mode
    }

    pub fn is_following(&self) -> bool {
        self.mode == FollowMode::Following
    }

    pub fn set_reduced_motion(&mut self, reduced_motion: bool) {
        self.reduced_motion = reduced_motion;
    }

    /// User scroll. Leaving the bottom by more than the threshold detaches;
    /// returning to the bottom does not reattach.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) {
        if self.mode == FollowMode::Following && metrics.distance_from_bottom() > self.threshold_px {
            tracing::debug!(
                "Detaching auto-follow at {:.0}px from bottom",
                metrics.distance_from_bottom()
            );
            self.detach();
        }
    }

    pub fn detach(&mut self) {
        self.mode = FollowMode::Manual;
        self.pending = None;
    }

    /// Explicit "follow latest": reattach and jump to `latest_id` if given.
    pub fn follow_latest(&mut self, latest_id: Option<&str>) -> Option<ScrollRequest> {
        self.mode = FollowMode::Following;
        latest_id.map(|id| self.schedule(id))
    }

    /// Called once per view-model update. While following, schedules exactly
    /// one scroll to `latest_id`, superseding any request not yet resolved.
    pub fn on_update(&mut self, latest_id: Option<&str>) -> Option<ScrollRequest> {
        if self.mode != FollowMode::Following {
            return None;
        }
        latest_id.map(|id| self.schedule(id))
    }

    /// Animation frame fired for `ticket`. Returns whether the scroll should run.
    pub fn resolve_frame(&mut self, ticket: ScrollTicket) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                "Ignoring scroll ticket from generation {} (current {})",
                ticket.generation,
                self.generation
            );
            return false;
        }
        if self.pending != Some(ticket) {
            tracing::debug!("Ignoring superseded scroll ticket {}", ticket.seq);
            return false;
        }
        self.pending = None;
        self.mode == FollowMode::Following
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Back to the initial state; outstanding tickets become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.next_seq = 0;
        self.pending = None;
        self.mode = FollowMode::Following;
    }

    fn schedule(&mut self, target_id: &str) -> ScrollRequest {
        let ticket = ScrollTicket {
            generation: self.generation,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending = Some(ticket);
        ScrollRequest {
            ticket,
            target_id: target_id.to_string(),
            behavior: if self.reduced_motion {
                ScrollBehavior::Instant
            } else {
                ScrollBehavior::Smooth
            },
        }
    }
}
