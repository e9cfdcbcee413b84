use std::collections::BTreeSet;
use std::time::Duration;

use crate::events::{Destination, Event, TimedEvent};
use crate::timing::{TempoMap, TimedArc};

/// Merged, tick-sorted event stream with the tempo map that times it.
#[derive(Debug, Clone)]
pub struct Timeline {
    tempo: TempoMap,
    events: Vec<TimedEvent>,
    duration: Duration,
}

impl Timeline {
    /// Sorts `events` by tick, keeping the original order between equal ticks.
    pub fn new(mut events: Vec<Event>, tempo: TempoMap) -> Self {
        events.sort_by_key(|e| e.tick);
        let events: Vec<TimedEvent> = events
            .into_iter()
            .map(|event| TimedEvent {
                time: tempo.tick_to_time(event.tick),
                event,
            })
            .collect();
        let duration = events.last().map(|e| e.time).unwrap_or_default();

        Self {
            tempo,
            events,
            duration,
        }
    }

    /// Merges several tracks; track order breaks ties between equal ticks.
    pub fn from_tracks(tracks: Vec<Vec<Event>>, tempo: TempoMap) -> Self {
        Self::new(tracks.into_iter().flatten().collect(), tempo)
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    /// Time of the last event.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Index of the first event at or after `time`.
    pub fn index_at(&self, time: Duration) -> usize {
        self.events.partition_point(|e| e.time < time)
    }

    /// Index of the first event strictly after `time`.
    pub fn index_after(&self, time: Duration) -> usize {
        self.events.partition_point(|e| e.time <= time)
    }

    pub fn destinations(&self) -> BTreeSet<Destination> {
        self.events.iter().map(|e| e.event.destination).collect()
    }

    pub fn events_for(&self, destination: Destination) -> Vec<TimedEvent> {
        self.events
            .iter()
            .filter(|e| e.event.destination == destination)
            .cloned()
            .collect()
    }

    pub fn arcs_for(&self, destination: Destination) -> Vec<TimedArc> {
        TimedArc::from_events(
            self.events
                .iter()
                .filter(|e| e.event.destination == destination)
                .map(|e| &e.event),
            &self.tempo,
        )
    }
}
