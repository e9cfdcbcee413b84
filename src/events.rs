use std::time::Duration;

/// Logical position in the timeline, converted to time by a [`TempoMap`](crate::timing::TempoMap).
pub type Tick = u64;

pub const CHANNELS: u8 = 16;
pub const NOTES: u8 = 128;
pub const PITCH_BEND_CENTER: u16 = 0x2000;

/// Independent event stream: a channel on a given output port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    pub port: u8,
    pub channel: u8,
}

impl Destination {
    pub fn new(port: u8, channel: u8) -> Self {
        Self {
            port,
            channel: channel & 0x0F,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    /// 14-bit value, centered at [`PITCH_BEND_CENTER`].
    PitchBend { value: u16 },
    ChannelPressure { pressure: u8 },
    PolyPressure { pitch: u8, pressure: u8 },
    /// Anything the engine does not interpret (meta, sysex, ...). Never dispatched.
    Opaque(Vec<u8>),
}

impl MidiMessage {
    /// A note-on with zero velocity is a note-off.
    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiMessage::NoteOn { velocity, .. } if *velocity > 0)
    }

    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            MidiMessage::NoteOff { .. } | MidiMessage::NoteOn { velocity: 0, .. }
        )
    }

    pub fn is_note(&self) -> bool {
        matches!(self, MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. })
    }

    /// Encodes the message as a channel voice message, `None` for opaque payloads.
    pub fn to_bytes(&self, channel: u8) -> Option<ShortMessage> {
        let channel = channel & 0x0F;
        let message = match *self {
            MidiMessage::NoteOff { pitch, velocity } => {
                ShortMessage::three(0x80 | channel, pitch, velocity)
            }
            MidiMessage::NoteOn { pitch, velocity } => {
                ShortMessage::three(0x90 | channel, pitch, velocity)
            }
            MidiMessage::PolyPressure { pitch, pressure } => {
                ShortMessage::three(0xA0 | channel, pitch, pressure)
            }
            MidiMessage::ControlChange { controller, value } => {
                ShortMessage::three(0xB0 | channel, controller, value)
            }
            MidiMessage::ProgramChange { program } => ShortMessage::two(0xC0 | channel, program),
            MidiMessage::ChannelPressure { pressure } => {
                ShortMessage::two(0xD0 | channel, pressure)
            }
            MidiMessage::PitchBend { value } => {
                let value = value.min(0x3FFF);
                ShortMessage::three(0xE0 | channel, (value & 0x7F) as u8, (value >> 7) as u8)
            }
            MidiMessage::Opaque(_) => return None,
        };
        Some(message)
    }
}

/// Encoded channel voice message, two or three bytes long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortMessage {
    bytes: [u8; 3],
    len: usize,
}

impl ShortMessage {
    fn two(status: u8, data: u8) -> Self {
        Self {
            bytes: [status, data & 0x7F, 0],
            len: 2,
        }
    }

    fn three(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            bytes: [status, data1 & 0x7F, data2 & 0x7F],
            len: 3,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub tick: Tick,
    pub destination: Destination,
    pub message: MidiMessage,
}

impl Event {
    /// Event on port 0.
    pub fn new(tick: Tick, channel: u8, message: MidiMessage) -> Self {
        Self {
            tick,
            destination: Destination::new(0, channel),
            message,
        }
    }

    pub fn channel(&self) -> u8 {
        self.destination.channel
    }
}

/// An event together with its playback time under the timeline's tempo map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub time: Duration,
    pub event: Event,
}
