mod arc;
mod condition;
mod event;
pub mod visibility;

pub use arc::TimedArcCollector;
pub use condition::{
    AtEnd, AtTime, Early, FractionElapsed, Late, Lookahead, ReleaseCondition, TriggerCondition,
};
pub use event::EventCollector;
pub use visibility::{VisibilityParams, arcs_visible, events_visible};
