//! State reconstruction on seek.
//!
//! Replaying a timeline up to a seek target would re-trigger every note, so
//! instead the events before the target are folded into the last value of
//! each piece of channel state, and one message per touched value is sent.

use crate::events::{CHANNELS, Event, MidiMessage, NOTES, TimedEvent};

#[derive(Debug, Clone)]
struct ChannelState {
    program: Option<u8>,
    pitch_bend: Option<u16>,
    channel_pressure: Option<u8>,
    poly_pressure: [Option<u8>; NOTES as usize],
    controllers: [Option<u8>; NOTES as usize],
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            program: None,
            pitch_bend: None,
            channel_pressure: None,
            poly_pressure: [None; NOTES as usize],
            controllers: [None; NOTES as usize],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChaseState {
    channels: Vec<ChannelState>,
}

impl Default for ChaseState {
    fn default() -> Self {
        Self {
            channels: vec![ChannelState::default(); CHANNELS as usize],
        }
    }
}

impl ChaseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds every event in `events` into a fresh state.
    pub fn scan(events: &[TimedEvent]) -> Self {
        let mut state = Self::new();
        for timed in events {
            state.apply(&timed.event);
        }
        state
    }

    pub fn apply(&mut self, event: &Event) {
        let channel = &mut self.channels[(event.channel() & 0x0F) as usize];
        match event.message {
            MidiMessage::ProgramChange { program } => channel.program = Some(program),
            MidiMessage::PitchBend { value } => channel.pitch_bend = Some(value),
            MidiMessage::ChannelPressure { pressure } => channel.channel_pressure = Some(pressure),
            MidiMessage::PolyPressure { pitch, pressure } => {
                channel.poly_pressure[(pitch & 0x7F) as usize] = Some(pressure)
            }
            MidiMessage::ControlChange { controller, value } => {
                channel.controllers[(controller & 0x7F) as usize] = Some(value)
            }
            MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. } | MidiMessage::Opaque(_) => {}
        }
    }

    /// One message per touched value: controllers, key pressures, program,
    /// pitch bend, then channel pressure, channel by channel.
    pub fn messages(&self) -> Vec<(u8, MidiMessage)> {
        let mut messages = Vec::new();

        for (channel, state) in self.channels.iter().enumerate() {
            let channel = channel as u8;

            for (controller, value) in state.controllers.iter().enumerate() {
                if let Some(value) = *value {
                    messages.push((
                        channel,
                        MidiMessage::ControlChange {
                            controller: controller as u8,
                            value,
                        },
                    ));
                }
            }
            for (pitch, pressure) in state.poly_pressure.iter().enumerate() {
                if let Some(pressure) = *pressure {
                    messages.push((
                        channel,
                        MidiMessage::PolyPressure {
                            pitch: pitch as u8,
                            pressure,
                        },
                    ));
                }
            }
            if let Some(program) = state.program {
                messages.push((channel, MidiMessage::ProgramChange { program }));
            }
            if let Some(value) = state.pitch_bend {
                messages.push((channel, MidiMessage::PitchBend { value }));
            }
            if let Some(pressure) = state.channel_pressure {
                messages.push((channel, MidiMessage::ChannelPressure { pressure }));
            }
        }

        messages
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(|c| {
            c.program.is_none()
                && c.pitch_bend.is_none()
                && c.channel_pressure.is_none()
                && c.poly_pressure.iter().all(Option::is_none)
                && c.controllers.iter().all(Option::is_none)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timed(tick: u64, channel: u8, message: MidiMessage) -> TimedEvent {
        TimedEvent {
            time: Duration::from_millis(tick),
            event: Event::new(tick, channel, message),
        }
    }

    #[test]
    fn keeps_latest_value_per_channel() {
        let events = vec![
            timed(0, 0, MidiMessage::ProgramChange { program: 5 }),
            timed(10, 0, MidiMessage::ProgramChange { program: 19 }),
            timed(20, 0, MidiMessage::ControlChange { controller: 64, value: 127 }),
            timed(30, 0, MidiMessage::ControlChange { controller: 64, value: 0 }),
            timed(40, 3, MidiMessage::PitchBend { value: 0x3000 }),
            timed(50, 3, MidiMessage::PolyPressure { pitch: 60, pressure: 9 }),
            timed(60, 3, MidiMessage::ChannelPressure { pressure: 44 }),
        ];

        let messages = ChaseState::scan(&events).messages();
        assert_eq!(
            messages,
            vec![
                (0, MidiMessage::ControlChange { controller: 64, value: 0 }),
                (0, MidiMessage::ProgramChange { program: 19 }),
                (3, MidiMessage::PolyPressure { pitch: 60, pressure: 9 }),
                (3, MidiMessage::PitchBend { value: 0x3000 }),
                (3, MidiMessage::ChannelPressure { pressure: 44 }),
            ]
        );
    }

    #[test]
    fn notes_are_never_chased() {
        let events = vec![
            timed(0, 1, MidiMessage::NoteOn { pitch: 60, velocity: 100 }),
            timed(5, 1, MidiMessage::NoteOff { pitch: 60, velocity: 0 }),
            timed(6, 1, MidiMessage::Opaque(vec![0xFF, 0x51, 0x03])),
        ];
        let state = ChaseState::scan(&events);
        assert!(state.is_empty());
        assert!(state.messages().is_empty());
    }

    #[test]
    fn controller_127_is_chased() {
        let events = vec![timed(0, 15, MidiMessage::ControlChange { controller: 127, value: 1 })];
        assert_eq!(
            ChaseState::scan(&events).messages(),
            vec![(15, MidiMessage::ControlChange { controller: 127, value: 1 })]
        );
    }
}
