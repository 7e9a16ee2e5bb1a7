//! Timeline reconstruction for agent traces.
//!
//! Data flows one way: steps are deduplicated and correlated
//! ([`correlate`]), grouped into lanes and phases ([`build`]), and viewed
//! through a filter ([`filter`]). [`session::TraceSession`] holds the state a
//! host keeps between recomputations, including auto-follow ([`follow`]).

pub mod aggregate;
pub mod build;
pub mod correlate;
pub mod filter;
pub mod follow;
pub mod session;

pub use build::build_panel;
pub use correlate::{TimelineItem, correlate};
pub use filter::ObjectiveFilter;
pub use follow::{FollowController, FollowMode, ScrollRequest};
pub use session::{Frame, SessionUpdate, TraceSession};
