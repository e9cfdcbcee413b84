//! Real-time temporal event engine: timelines of channel messages, collectors
//! that answer "what is active now" for visualization, and a sequencer that
//! dispatches events to an output device in step with the wall clock.

pub mod apq;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod sequencer;
pub mod timing;

#[cfg(test)]
mod rng;

pub use apq::{AdaptablePriorityQueue, Handle};
pub use collector::{EventCollector, TimedArcCollector, VisibilityParams};
pub use config::{EngineConfig, NotesOffMode};
pub use error::{ConfigError, DeviceError, SequencerError};
pub use events::{Destination, Event, MidiMessage, Tick, TimedEvent};
pub use sequencer::{
    Clock, MidiDevice, MidirDevice, RecordingDevice, Sequencer, SequencerUpdate, StopReason,
};
pub use timing::{TempoMap, TimedArc, Timeline};
