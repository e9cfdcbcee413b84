use std::path::PathBuf;
use std::process::ExitCode;

use stagetime::{
    EngineConfig, Event, MidiMessage, MidirDevice, Sequencer, SequencerUpdate, StopReason,
    TempoMap, Tick, Timeline,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const TICKS_PER_QUARTER: u16 = 480;

/// Two bars of a C major arpeggio on channel 0 with a sustain swell.
fn demo_timeline() -> Timeline {
    let eighth: Tick = TICKS_PER_QUARTER as Tick / 2;
    let pitches = [60u8, 64, 67, 72, 67, 64, 60, 55];

    let mut events = vec![
        Event::new(0, 0, MidiMessage::ProgramChange { program: 0 }),
        Event::new(0, 0, MidiMessage::ControlChange { controller: 7, value: 100 }),
    ];
    for bar in 0..2u64 {
        for (step, pitch) in pitches.iter().copied().enumerate() {
            let start = (bar * pitches.len() as u64 + step as u64) * eighth;
            let velocity = if step % 4 == 0 { 110 } else { 80 };
            events.push(Event::new(start, 0, MidiMessage::NoteOn { pitch, velocity }));
            events.push(Event::new(
                start + eighth - 10,
                0,
                MidiMessage::NoteOff { pitch, velocity: 0 },
            ));
        }
    }
    events.push(Event::new(0, 0, MidiMessage::ControlChange { controller: 64, value: 127 }));
    events.push(Event::new(
        16 * eighth - 1,
        0,
        MidiMessage::ControlChange { controller: 64, value: 0 },
    ));

    Timeline::new(events, TempoMap::new(TICKS_PER_QUARTER).with_bpm(0, 132.0))
}

fn load_config() -> EngineConfig {
    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        return EngineConfig::default();
    };
    match EngineConfig::load(&path) {
        Ok(config) => {
            info!(path = %path.display(), "loaded config");
            config
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "falling back to default config");
            EngineConfig::default()
        }
    }
}

fn run() -> stagetime::error::Result<()> {
    let config = load_config();

    match MidirDevice::port_names(&config.client_name) {
        Ok(ports) => info!(?ports, "available MIDI outputs"),
        Err(err) => warn!(%err, "could not list MIDI outputs"),
    }

    let device = MidirDevice::from_config(&config);
    let mut sequencer = Sequencer::new(config);
    let updates = sequencer.subscribe();

    sequencer.open(Box::new(device))?;
    sequencer.set_timeline(Some(demo_timeline()))?;
    sequencer.start()?;

    for update in updates.iter() {
        match update {
            SequencerUpdate::Started { position } => info!(?position, "playing"),
            SequencerUpdate::Chased { position, messages } => {
                info!(?position, messages, "chased")
            }
            SequencerUpdate::DeviceError { message } => error!(%message, "device error"),
            SequencerUpdate::Stopped { reason } if reason == StopReason::Seek => {}
            SequencerUpdate::Stopped { reason } => {
                info!(?reason, position = ?sequencer.position(), "stopped");
                break;
            }
        }
    }

    sequencer.close()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "stagetime failed");
            ExitCode::FAILURE
        }
    }
}
