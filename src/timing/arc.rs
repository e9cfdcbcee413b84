use std::time::Duration;

use crate::events::{Event, MidiMessage, NOTES};
use crate::timing::TempoMap;

/// One sounding note: the half-open interval `[start, end)` with its pitch and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimedArc {
    pub start: Duration,
    pub end: Duration,
    pub pitch: u8,
    pub velocity: u8,
}

impl TimedArc {
    /// Returns `None` unless `start < end`.
    pub fn new(start: Duration, end: Duration, pitch: u8, velocity: u8) -> Option<Self> {
        (start < end).then_some(Self {
            start,
            end,
            pitch,
            velocity,
        })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, time: Duration) -> bool {
        self.start <= time && time < self.end
    }

    /// Fraction of the arc elapsed at `time`, clamped to `0.0..=1.0`.
    pub fn progress(&self, time: Duration) -> f64 {
        if time <= self.start {
            return 0.0;
        }
        let elapsed = (time - self.start).as_secs_f64();
        (elapsed / self.duration().as_secs_f64()).min(1.0)
    }

    /// Pairs every note-on with the next note-off of the same pitch.
    ///
    /// `events` must be tick-sorted. A second note-on before the note-off
    /// replaces the pending one; unmatched note-ons and zero-length pairs are
    /// dropped, as are exact duplicates. The result is sorted by start time.
    pub fn from_events<'a>(
        events: impl IntoIterator<Item = &'a Event>,
        tempo: &TempoMap,
    ) -> Vec<TimedArc> {
        let mut pending: [Option<(Duration, u8)>; NOTES as usize] = [None; NOTES as usize];
        let mut arcs = Vec::new();

        for event in events {
            match event.message {
                MidiMessage::NoteOn { pitch, velocity } if velocity > 0 => {
                    pending[(pitch & 0x7F) as usize] =
                        Some((tempo.tick_to_time(event.tick), velocity));
                }
                MidiMessage::NoteOn { pitch, .. } | MidiMessage::NoteOff { pitch, .. } => {
                    let pitch = pitch & 0x7F;
                    if let Some((start, velocity)) = pending[pitch as usize].take() {
                        let end = tempo.tick_to_time(event.tick);
                        arcs.extend(TimedArc::new(start, end, pitch, velocity));
                    }
                }
                _ => {}
            }
        }

        arcs.sort_by_key(|a| (a.start, a.pitch, a.end, a.velocity));
        arcs.dedup();
        arcs
    }
}

/// Run of arcs that overlap one another without a gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcGroup {
    pub arcs: Vec<TimedArc>,
}

impl ArcGroup {
    pub fn start(&self) -> Duration {
        self.arcs.iter().map(|a| a.start).min().unwrap_or_default()
    }

    pub fn end(&self) -> Duration {
        self.arcs.iter().map(|a| a.end).max().unwrap_or_default()
    }

    pub fn duration(&self) -> Duration {
        self.end() - self.start()
    }
}

/// Splits start-sorted arcs into groups; an arc starting at or after the
/// furthest end seen so far opens a new group.
pub fn contiguous_groups(arcs: &[TimedArc]) -> Vec<ArcGroup> {
    let mut groups = Vec::new();
    let mut current: Vec<TimedArc> = Vec::new();
    let mut furthest = Duration::ZERO;

    for arc in arcs {
        if !current.is_empty() && arc.start >= furthest {
            groups.push(ArcGroup {
                arcs: std::mem::take(&mut current),
            });
            furthest = arc.end;
        } else {
            furthest = furthest.max(arc.end);
        }
        current.push(*arc);
    }

    if !current.is_empty() {
        groups.push(ArcGroup { arcs: current });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn on(tick: u64, pitch: u8) -> Event {
        Event::new(tick, 0, MidiMessage::NoteOn { pitch, velocity: 90 })
    }

    fn off(tick: u64, pitch: u8) -> Event {
        Event::new(tick, 0, MidiMessage::NoteOff { pitch, velocity: 0 })
    }

    #[test]
    fn rejects_empty_intervals() {
        assert!(TimedArc::new(ms(5), ms(5), 60, 1).is_none());
        assert!(TimedArc::new(ms(6), ms(5), 60, 1).is_none());
        assert!(TimedArc::new(ms(5), ms(6), 60, 1).is_some());
    }

    #[test]
    fn progress_is_clamped() {
        let arc = TimedArc::new(ms(100), ms(300), 60, 1).unwrap();
        assert_eq!(arc.progress(ms(50)), 0.0);
        assert_eq!(arc.progress(ms(200)), 0.5);
        assert_eq!(arc.progress(ms(900)), 1.0);
        assert!(arc.contains(ms(100)));
        assert!(!arc.contains(ms(300)));
    }

    #[test]
    fn pairs_note_on_with_note_off() {
        // 480 ticks per quarter at 120 BPM: one tick is 1/960 s.
        let tempo = TempoMap::new(480);
        let events = vec![
            on(0, 60),
            on(480, 64),
            off(960, 60),
            Event::new(960, 0, MidiMessage::NoteOn { pitch: 64, velocity: 0 }),
            on(1_000, 67),
        ];

        let arcs = TimedArc::from_events(&events, &tempo);
        assert_eq!(arcs.len(), 2);
        assert_eq!((arcs[0].pitch, arcs[0].start, arcs[0].end), (60, ms(0), ms(1_000)));
        assert_eq!((arcs[1].pitch, arcs[1].start, arcs[1].end), (64, ms(500), ms(1_000)));
    }

    #[test]
    fn drops_zero_length_and_duplicate_pairs() {
        let tempo = TempoMap::new(480);
        let events = vec![on(0, 60), off(0, 60), on(10, 62), off(20, 62)];
        let arcs = TimedArc::from_events(events.iter().chain(events.iter()), &tempo);
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].pitch, 62);
    }

    #[test]
    fn groups_contiguous_runs() {
        let arcs = [
            TimedArc::new(ms(0), ms(10), 60, 1).unwrap(),
            TimedArc::new(ms(5), ms(20), 62, 1).unwrap(),
            TimedArc::new(ms(20), ms(30), 64, 1).unwrap(),
            TimedArc::new(ms(40), ms(50), 65, 1).unwrap(),
        ];
        let groups = contiguous_groups(&arcs);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].arcs.len(), 2);
        assert_eq!((groups[0].start(), groups[0].end()), (ms(0), ms(20)));
        assert_eq!(groups[2].duration(), ms(10));
        assert!(contiguous_groups(&[]).is_empty());
    }
}
