mod arc;
mod tempo;
mod timeline;

pub use arc::{ArcGroup, TimedArc, contiguous_groups};
pub use tempo::{DEFAULT_MICROS_PER_QUARTER, TempoMap};
pub use timeline::Timeline;
