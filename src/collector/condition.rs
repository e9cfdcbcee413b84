//! Release and trigger strategies injected into the collectors.
//!
//! Any closure with the right shape works as well as the named strategies:
//!
//! ```
//! use std::time::Duration;
//! use stagetime::collector::TimedArcCollector;
//! use stagetime::timing::TimedArc;
//!
//! let collector = TimedArcCollector::with_release(Vec::new(), |time: Duration, arc: &TimedArc| {
//!     time + Duration::from_millis(33) >= arc.end
//! });
//! assert!(collector.current_arcs().next().is_none());
//! ```

use std::time::Duration;

use crate::events::TimedEvent;
use crate::timing::TimedArc;

/// Decides when an active arc leaves the active set.
pub trait ReleaseCondition {
    fn should_release(&self, time: Duration, arc: &TimedArc) -> bool;
}

impl<F> ReleaseCondition for F
where
    F: Fn(Duration, &TimedArc) -> bool,
{
    fn should_release(&self, time: Duration, arc: &TimedArc) -> bool {
        self(time, arc)
    }
}

/// Release once `time` reaches the arc's end.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtEnd;

impl ReleaseCondition for AtEnd {
    fn should_release(&self, time: Duration, arc: &TimedArc) -> bool {
        time >= arc.end
    }
}

/// Release the given amount of time before the arc ends.
#[derive(Debug, Clone, Copy)]
pub struct Early(pub Duration);

impl ReleaseCondition for Early {
    fn should_release(&self, time: Duration, arc: &TimedArc) -> bool {
        time + self.0 >= arc.end
    }
}

/// Hold the arc for the given amount of time past its end.
#[derive(Debug, Clone, Copy)]
pub struct Late(pub Duration);

impl ReleaseCondition for Late {
    fn should_release(&self, time: Duration, arc: &TimedArc) -> bool {
        time >= arc.end + self.0
    }
}

/// Release once this fraction (clamped to `0.0..=1.0`) of the arc has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct FractionElapsed(pub f64);

impl ReleaseCondition for FractionElapsed {
    fn should_release(&self, time: Duration, arc: &TimedArc) -> bool {
        let fraction = if self.0.is_nan() { 1.0 } else { self.0.clamp(0.0, 1.0) };
        time >= arc.start + arc.duration().mul_f64(fraction)
    }
}

/// Decides whether the event under the cursor has been reached.
pub trait TriggerCondition {
    fn is_triggered(&self, event: &TimedEvent, time: Duration) -> bool;
}

impl<F> TriggerCondition for F
where
    F: Fn(&TimedEvent, Duration) -> bool,
{
    fn is_triggered(&self, event: &TimedEvent, time: Duration) -> bool {
        self(event, time)
    }
}

/// Trigger once `time` reaches the event's mapped time.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtTime;

impl TriggerCondition for AtTime {
    fn is_triggered(&self, event: &TimedEvent, time: Duration) -> bool {
        event.time <= time
    }
}

/// Trigger the given amount of time ahead of the event.
#[derive(Debug, Clone, Copy)]
pub struct Lookahead(pub Duration);

impl TriggerCondition for Lookahead {
    fn is_triggered(&self, event: &TimedEvent, time: Duration) -> bool {
        event.time <= time + self.0
    }
}
