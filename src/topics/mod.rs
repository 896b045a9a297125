//! Candidate topic gathering and selection.
//!
//! - [`collector`] - gathers a user's candidate new topics, applying the
//!   minimum-age throttle, read tracking, and authorization filtering
//! - [`selector`] - ranks candidates and truncates to the configured cap

pub mod collector;
pub mod selector;

pub use collector::collect;
pub use selector::{select, select_with};
