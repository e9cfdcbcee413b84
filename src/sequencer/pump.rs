//! Clock pump: keeps virtual time in step with the wall clock and dispatches
//! every event that has come due.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::Receiver;
use crossbeam::select;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::chase::ChaseState;
use super::clock::Clock;
use super::device::MidiDevice;
use super::updates::{SequencerUpdate, StopReason, UpdateBus};
use crate::config::NotesOffMode;
use crate::error::DeviceError;
use crate::events::{CHANNELS, MidiMessage, NOTES, TimedEvent};
use crate::timing::Timeline;

pub(crate) type SharedDevice = Arc<Mutex<Box<dyn MidiDevice>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpStatus {
    Playing,
    Finished,
}

pub(crate) struct Pump {
    timeline: Arc<Timeline>,
    clock: Arc<dyn Clock>,
    wall_checkpoint: Duration,
    virtual_checkpoint: Duration,
    virtual_now: Duration,
    next_index: usize,
    /// Events before this index that are not notes were already sent by chase.
    chased_until: usize,
}

impl Pump {
    pub fn new(timeline: Arc<Timeline>, clock: Arc<dyn Clock>) -> Self {
        Self {
            wall_checkpoint: clock.now(),
            timeline,
            clock,
            virtual_checkpoint: Duration::ZERO,
            virtual_now: Duration::ZERO,
            next_index: 0,
            chased_until: 0,
        }
    }

    pub fn position(&self) -> Duration {
        self.virtual_now
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Pins virtual time to the wall clock, optionally jumping to `at` first.
    pub fn checkpoint(&mut self, at: Option<Duration>) {
        self.wall_checkpoint = self.clock.now();
        if let Some(at) = at {
            self.virtual_now = at;
        }
        self.virtual_checkpoint = self.virtual_now;
    }

    /// Dispatches everything due at the current virtual time.
    pub fn tick(&mut self, device: &mut dyn MidiDevice) -> Result<PumpStatus, DeviceError> {
        let elapsed = self.clock.now().saturating_sub(self.wall_checkpoint);
        self.virtual_now = self.virtual_now.max(self.virtual_checkpoint + elapsed);

        let events = self.timeline.events();
        while let Some(event) = events.get(self.next_index) {
            if event.time > self.virtual_now {
                break;
            }
            if self.next_index < self.chased_until && !event.event.message.is_note() {
                trace!(tick = event.event.tick, "already chased");
            } else {
                dispatch(device, event)?;
            }
            self.next_index += 1;
        }

        if self.virtual_now > self.timeline.duration() {
            Ok(PumpStatus::Finished)
        } else {
            Ok(PumpStatus::Playing)
        }
    }

    /// Sends the state accumulated up to and including `target` and moves the
    /// cursor to the first event at or after it. Notes at `target` are left
    /// for the next tick. Returns the number of messages sent.
    pub fn chase(
        &mut self,
        target: Duration,
        device: &mut dyn MidiDevice,
        enabled: bool,
    ) -> Result<usize, DeviceError> {
        let index = self.timeline.index_at(target);
        let mut sent = 0;

        self.next_index = index;
        self.chased_until = index;
        if enabled {
            let folded = self.timeline.index_after(target);
            let state = ChaseState::scan(&self.timeline.events()[..folded]);
            self.chased_until = folded;
            for (channel, message) in state.messages() {
                device.send(channel, &message)?;
                sent += 1;
            }
        }

        debug!(position = ?target, next_index = index, sent, "chased timeline state");
        Ok(sent)
    }
}

fn dispatch(device: &mut dyn MidiDevice, timed: &TimedEvent) -> Result<(), DeviceError> {
    match &timed.event.message {
        MidiMessage::Opaque(_) => {
            trace!(tick = timed.event.tick, "skipping opaque event");
            Ok(())
        }
        message => {
            trace!(tick = timed.event.tick, channel = timed.event.channel(), ?message, "dispatch");
            device.send(timed.event.channel(), message)
        }
    }
}

/// Silences every channel. Keeps going past failures and reports the first one.
pub(crate) fn send_all_notes_off(
    device: &mut dyn MidiDevice,
    mode: NotesOffMode,
) -> Result<(), DeviceError> {
    let mut first_error = None;
    let mut send = |channel: u8, message: MidiMessage| {
        if let Err(err) = device.send(channel, &message) {
            first_error.get_or_insert(err);
        }
    };

    for channel in 0..CHANNELS {
        match mode {
            NotesOffMode::NoteOffFlood => {
                for pitch in 0..NOTES {
                    send(channel, MidiMessage::NoteOff { pitch, velocity: 0 });
                }
            }
            NotesOffMode::ChannelMode => send(
                channel,
                MidiMessage::ControlChange {
                    controller: 123,
                    value: 0,
                },
            ),
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Runs the notes-off flood when the poll thread exits, whichever way it exits.
struct NotesOffGuard {
    device: SharedDevice,
    mode: NotesOffMode,
    running: Arc<AtomicBool>,
}

impl Drop for NotesOffGuard {
    fn drop(&mut self) {
        let mut device = self.device.lock();
        if let Err(err) = send_all_notes_off(&mut **device, self.mode) {
            warn!(%err, "all-notes-off flood incomplete");
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

pub(crate) struct PollContext {
    pub pump: Arc<Mutex<Pump>>,
    pub device: SharedDevice,
    pub position: Arc<AtomicU64>,
    pub running: Arc<AtomicBool>,
    pub updates: Arc<UpdateBus>,
    pub poll_interval: Duration,
    pub notes_off: NotesOffMode,
}

pub(crate) fn poll_loop(ctx: PollContext, cancel: Receiver<StopReason>) {
    let guard = NotesOffGuard {
        device: ctx.device.clone(),
        mode: ctx.notes_off,
        running: ctx.running.clone(),
    };

    let reason = loop {
        let cancelled = select! {
            recv(cancel) -> reason => Some(reason.unwrap_or(StopReason::Requested)),
            default(ctx.poll_interval) => None,
        };
        if let Some(reason) = cancelled {
            break reason;
        }

        let status = {
            let mut pump = ctx.pump.lock();
            let mut device = ctx.device.lock();
            let status = pump.tick(&mut **device);
            ctx.position
                .store(pump.position().as_micros() as u64, Ordering::SeqCst);
            status
        };

        match status {
            Ok(PumpStatus::Playing) => {}
            Ok(PumpStatus::Finished) => {
                debug!("reached end of timeline");
                break StopReason::EndOfTimeline;
            }
            Err(err) => {
                error!(%err, "device failed during dispatch");
                ctx.updates.publish(SequencerUpdate::DeviceError {
                    message: err.to_string(),
                });
                break StopReason::DeviceError;
            }
        }
    };

    drop(guard);
    ctx.updates.publish(SequencerUpdate::Stopped { reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::rng::SplitMix64;
    use crate::sequencer::clock::ManualClock;
    use crate::sequencer::device::{RecordingDevice, Sent};
    use crate::timing::TempoMap;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    /// 1000 ticks per quarter at 60 BPM: one tick per millisecond.
    fn millisecond_tempo() -> TempoMap {
        TempoMap::new(1_000).with_tempo(0, 1_000_000)
    }

    fn note_timeline() -> Arc<Timeline> {
        let events = vec![
            Event::new(0, 0, MidiMessage::NoteOn { pitch: 60, velocity: 90 }),
            Event::new(100, 0, MidiMessage::NoteOff { pitch: 60, velocity: 0 }),
            Event::new(100, 0, MidiMessage::NoteOn { pitch: 62, velocity: 90 }),
            Event::new(150, 0, MidiMessage::Opaque(vec![0xFF, 0x06])),
            Event::new(200, 0, MidiMessage::NoteOff { pitch: 62, velocity: 0 }),
        ];
        Arc::new(Timeline::new(events, millisecond_tempo()))
    }

    fn open_device() -> (RecordingDevice, RecordingDevice) {
        let mut device = RecordingDevice::new();
        device.open().unwrap();
        (device.clone(), device)
    }

    #[test]
    fn dispatches_events_as_they_fall_due() {
        let clock = ManualClock::new();
        let (recorder, mut device) = open_device();
        let mut pump = Pump::new(note_timeline(), Arc::new(clock.clone()));
        pump.checkpoint(None);

        assert_eq!(pump.tick(&mut device).unwrap(), PumpStatus::Playing);
        assert_eq!(recorder.sent_len(), 1);

        clock.advance(ms(99));
        pump.tick(&mut device).unwrap();
        assert_eq!(recorder.sent_len(), 1);

        clock.advance(ms(1));
        pump.tick(&mut device).unwrap();
        assert_eq!(recorder.sent_len(), 3);

        // The opaque event is consumed without reaching the device.
        clock.advance(ms(100));
        assert_eq!(pump.tick(&mut device).unwrap(), PumpStatus::Playing);
        assert_eq!(recorder.sent_len(), 4);
        assert_eq!(pump.next_index(), 5);

        clock.advance(ms(1));
        assert_eq!(pump.tick(&mut device).unwrap(), PumpStatus::Finished);
    }

    #[test]
    fn late_tick_catches_up_in_order() {
        let clock = ManualClock::new();
        let (recorder, mut device) = open_device();
        let mut pump = Pump::new(note_timeline(), Arc::new(clock.clone()));
        pump.checkpoint(None);

        clock.advance(ms(500));
        assert_eq!(pump.tick(&mut device).unwrap(), PumpStatus::Finished);

        let pitches: Vec<(bool, u8)> = recorder
            .sent()
            .iter()
            .map(|s| match s.message {
                MidiMessage::NoteOn { pitch, .. } => (true, pitch),
                MidiMessage::NoteOff { pitch, .. } => (false, pitch),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(pitches, vec![(true, 60), (false, 60), (true, 62), (false, 62)]);
    }

    #[test]
    fn virtual_time_never_decreases() {
        let clock = ManualClock::new();
        let (_recorder, mut device) = open_device();
        let mut pump = Pump::new(note_timeline(), Arc::new(clock.clone()));
        pump.checkpoint(Some(ms(20)));

        let mut rng = SplitMix64::new(7);
        let mut last = pump.position();
        for _ in 0..500 {
            clock.advance(Duration::from_micros(rng.below(700)));
            pump.tick(&mut device).unwrap();
            assert!(pump.position() >= last);
            last = pump.position();
        }
        assert!(last >= ms(20));
    }

    #[test]
    fn checkpoint_resumes_from_paused_position() {
        let clock = ManualClock::new();
        let (_recorder, mut device) = open_device();
        let mut pump = Pump::new(note_timeline(), Arc::new(clock.clone()));
        pump.checkpoint(None);

        clock.advance(ms(50));
        pump.tick(&mut device).unwrap();
        assert_eq!(pump.position(), ms(50));

        // Paused for a second of wall time.
        clock.advance(ms(1_000));
        pump.checkpoint(None);
        clock.advance(ms(10));
        pump.tick(&mut device).unwrap();
        assert_eq!(pump.position(), ms(60));
    }

    #[test]
    fn chase_skips_notes_and_positions_cursor() {
        let events = vec![
            Event::new(0, 2, MidiMessage::ProgramChange { program: 33 }),
            Event::new(0, 2, MidiMessage::NoteOn { pitch: 40, velocity: 100 }),
            Event::new(100, 2, MidiMessage::PitchBend { value: 0x1000 }),
            Event::new(150, 2, MidiMessage::NoteOn { pitch: 43, velocity: 100 }),
            Event::new(300, 2, MidiMessage::PitchBend { value: 0x2000 }),
        ];
        let timeline = Arc::new(Timeline::new(events, millisecond_tempo()));
        let (recorder, mut device) = open_device();
        let mut pump = Pump::new(timeline, Arc::new(ManualClock::new()));

        let sent = pump.chase(ms(150), &mut device, true).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(pump.next_index(), 3);
        assert!(recorder.sent().iter().all(|s| !s.message.is_note()));

        recorder.clear();
        assert_eq!(pump.chase(ms(150), &mut device, false).unwrap(), 0);
        assert_eq!(recorder.sent_len(), 0);
    }

    #[test]
    fn state_at_seek_target_is_chased_once_and_notes_still_play() {
        let events = vec![
            Event::new(0, 1, MidiMessage::ProgramChange { program: 7 }),
            Event::new(100, 1, MidiMessage::PitchBend { value: 0x3000 }),
            Event::new(100, 1, MidiMessage::NoteOn { pitch: 50, velocity: 80 }),
            Event::new(100, 1, MidiMessage::ControlChange { controller: 64, value: 127 }),
            Event::new(200, 1, MidiMessage::NoteOff { pitch: 50, velocity: 0 }),
        ];
        let timeline = Arc::new(Timeline::new(events, millisecond_tempo()));
        let clock = ManualClock::new();
        let (recorder, mut device) = open_device();
        let mut pump = Pump::new(timeline, Arc::new(clock.clone()));

        assert_eq!(pump.chase(ms(100), &mut device, true).unwrap(), 3);
        assert_eq!(pump.next_index(), 1);
        pump.checkpoint(Some(ms(100)));

        recorder.clear();
        pump.tick(&mut device).unwrap();
        assert_eq!(
            recorder.sent(),
            vec![Sent {
                channel: 1,
                message: MidiMessage::NoteOn { pitch: 50, velocity: 80 }
            }]
        );

        // Without chase, everything at the target is dispatched by the pump.
        pump.chase(ms(100), &mut device, false).unwrap();
        pump.checkpoint(Some(ms(100)));
        recorder.clear();
        pump.tick(&mut device).unwrap();
        assert_eq!(recorder.sent_len(), 3);
    }

    #[test]
    fn notes_off_modes_cover_every_channel() {
        let (recorder, mut device) = open_device();
        send_all_notes_off(&mut device, NotesOffMode::NoteOffFlood).unwrap();
        assert_eq!(recorder.sent_len(), 16 * 128);

        recorder.clear();
        send_all_notes_off(&mut device, NotesOffMode::ChannelMode).unwrap();
        let channels: Vec<u8> = recorder.sent().iter().map(|s| s.channel).collect();
        assert_eq!(channels, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn notes_off_reports_failure_but_keeps_going() {
        let mut device = RecordingDevice::failing_after(3);
        let recorder = device.clone();
        device.open().unwrap();
        assert!(send_all_notes_off(&mut device, NotesOffMode::ChannelMode).is_err());
        assert_eq!(recorder.sent_len(), 3);
    }
}
