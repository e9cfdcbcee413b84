//! Whether an animated element should be on screen, judged from a collector's
//! surroundings: what is sounding, what comes next and what just finished.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::condition::{ReleaseCondition, TriggerCondition};
use super::{EventCollector, TimedArcCollector};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibilityParams {
    /// Show this long before the next note starts.
    pub show_before: Duration,
    /// Stay visible through gaps no longer than this.
    pub show_between: Duration,
    /// Keep showing this long after the last note.
    pub show_after: Duration,
}

impl Default for VisibilityParams {
    fn default() -> Self {
        Self {
            show_before: Duration::from_secs(1),
            show_between: Duration::from_secs(7),
            show_after: Duration::from_secs(2),
        }
    }
}

pub fn arcs_visible<R: ReleaseCondition>(
    collector: &TimedArcCollector<R>,
    time: Duration,
    params: &VisibilityParams,
) -> bool {
    if collector.active_len() > 0 {
        return true;
    }

    let next = collector.peek();
    let prev = collector.prev();

    if next.is_some_and(|next| next.start.saturating_sub(time) <= params.show_before) {
        return true;
    }
    if let (Some(prev), Some(next)) = (prev, next) {
        if next.start.saturating_sub(prev.end) <= params.show_between {
            return true;
        }
    }
    prev.is_some_and(|prev| time.saturating_sub(prev.end) <= params.show_after)
}

pub fn events_visible<T: TriggerCondition>(
    collector: &EventCollector<T>,
    time: Duration,
    params: &VisibilityParams,
) -> bool {
    let next = collector.peek();
    let prev = collector.prev();

    if next.is_some_and(|next| next.time.saturating_sub(time) <= params.show_before) {
        return true;
    }
    if let (Some(prev), Some(next)) = (prev, next) {
        if next.time.saturating_sub(prev.time) <= params.show_between {
            return true;
        }
    }
    prev.is_some_and(|prev| time.saturating_sub(prev.time) <= params.show_after)
}
