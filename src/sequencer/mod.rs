//! Real-time transport over an output device.
//!
//! `Closed -> Open -> {Stopped <-> Running}`. While running, a background
//! thread polls the clock pump at the configured cadence. Dispatch always
//! catches up to virtual time, so a late poll only delays events; it never
//! skips or reorders them.

mod chase;
mod clock;
mod device;
mod pump;
mod updates;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::{Result, SequencerError};
use crate::events::Tick;
use crate::timing::Timeline;
use pump::{PollContext, Pump, SharedDevice};
use updates::UpdateBus;

pub use chase::ChaseState;
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{MidiDevice, MidirDevice, RecordingDevice, Sent};
pub use updates::{SequencerUpdate, StopReason};

struct Worker {
    cancel: Sender<StopReason>,
    handle: JoinHandle<()>,
}

pub struct Sequencer {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    device: Option<SharedDevice>,
    timeline: ArcSwapOption<Timeline>,
    pump: Option<Arc<Mutex<Pump>>>,
    /// Virtual time in microseconds, readable from any thread.
    position: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    worker: Option<Worker>,
    updates: Arc<UpdateBus>,
}

impl Sequencer {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::default()))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            device: None,
            timeline: ArcSwapOption::empty(),
            pump: None,
            position: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            updates: Arc::new(UpdateBus::default()),
        }
    }

    pub fn open(&mut self, mut device: Box<dyn MidiDevice>) -> Result<()> {
        if self.device.is_some() {
            return Err(SequencerError::AlreadyOpen);
        }
        device.open().map_err(SequencerError::DeviceUnavailable)?;
        self.device = Some(Arc::new(Mutex::new(device)));
        info!("sequencer opened");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.stop()?;
        if let Some(device) = self.device.take() {
            device.lock().close();
        }
        info!("sequencer closed");
        Ok(())
    }

    /// Replaces the timeline. Only valid while stopped.
    pub fn set_timeline(&mut self, timeline: Option<Timeline>) -> Result<()> {
        self.ensure_open()?;
        if self.is_running() {
            return Err(SequencerError::Running);
        }
        self.reap_worker();

        match timeline {
            Some(timeline) => {
                let timeline = Arc::new(timeline);
                debug!(
                    events = timeline.len(),
                    duration = ?timeline.duration(),
                    "timeline set"
                );
                self.pump = Some(Arc::new(Mutex::new(Pump::new(
                    timeline.clone(),
                    self.clock.clone(),
                ))));
                self.timeline.store(Some(timeline));
            }
            None => {
                self.pump = None;
                self.timeline.store(None);
            }
        }
        self.position.store(0, Ordering::SeqCst);
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.is_running() {
            return Ok(());
        }
        self.reap_worker();

        let pump = self.pump.clone().ok_or(SequencerError::NoTimeline)?;
        let device = self.device.clone().ok_or(SequencerError::NotOpen)?;
        pump.lock().checkpoint(None);

        let (cancel, cancel_rx) = crossbeam::channel::bounded(1);
        let ctx = PollContext {
            pump,
            device,
            position: self.position.clone(),
            running: self.running.clone(),
            updates: self.updates.clone(),
            poll_interval: self.config.poll_interval,
            notes_off: self.config.notes_off,
        };

        // `Started` must precede this run's `Stopped`.
        let position = self.position();
        self.updates.publish(SequencerUpdate::Started { position });

        self.running.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("stagetime-pump".to_string())
            .spawn(move || pump::poll_loop(ctx, cancel_rx));
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                self.updates.publish(SequencerUpdate::Stopped {
                    reason: StopReason::Requested,
                });
                return Err(err.into());
            }
        };
        self.worker = Some(Worker { cancel, handle });

        info!(?position, "sequencer started");
        Ok(())
    }

    /// Stops the poll thread. Returns once the all-notes-off flood has been sent.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.halt(StopReason::Requested);
        Ok(())
    }

    /// Seeks to `target`, chasing channel state, and resumes if it was running.
    pub fn set_position(&mut self, target: Duration) -> Result<()> {
        self.ensure_open()?;
        let pump = self.pump.clone().ok_or(SequencerError::NoTimeline)?;
        let device = self.device.clone().ok_or(SequencerError::NotOpen)?;

        let was_running = self.is_running();
        self.halt(StopReason::Seek);

        let messages = {
            let mut pump = pump.lock();
            let mut device = device.lock();
            let messages = pump.chase(target, &mut **device, self.config.chase)?;
            pump.checkpoint(Some(target));
            messages
        };
        self.position
            .store(target.as_micros() as u64, Ordering::SeqCst);
        self.updates.publish(SequencerUpdate::Chased {
            position: target,
            messages,
        });

        if was_running {
            self.start()?;
        }
        Ok(())
    }

    pub fn set_position_tick(&mut self, tick: Tick) -> Result<()> {
        let timeline = self.timeline().ok_or(SequencerError::NoTimeline)?;
        self.set_position(timeline.tempo().tick_to_time(tick))
    }

    /// Snapshot of the virtual playback time.
    pub fn position(&self) -> Duration {
        Duration::from_micros(self.position.load(Ordering::SeqCst))
    }

    /// Shareable handle to the playback position for readers on other threads.
    pub fn position_handle(&self) -> PositionHandle {
        PositionHandle {
            micros: self.position.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn timeline(&self) -> Option<Arc<Timeline>> {
        self.timeline.load_full()
    }

    /// New receiver of every update published from now on. Each subscriber
    /// gets its own copy of the stream.
    pub fn subscribe(&self) -> Receiver<SequencerUpdate> {
        self.updates.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.device.is_some() {
            Ok(())
        } else {
            Err(SequencerError::NotOpen)
        }
    }

    /// Cancels the poll thread and waits for its notes-off flood.
    fn halt(&mut self, reason: StopReason) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = worker.cancel.send(reason);
        if worker.handle.join().is_err() {
            error!("poll thread panicked");
        }
        self.running.store(false, Ordering::SeqCst);
        info!(position = ?self.position(), ?reason, "sequencer stopped");
    }

    /// Joins a poll thread that already stopped by itself.
    fn reap_worker(&mut self) {
        if self.is_running() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.handle.join().is_err() {
                error!("poll thread panicked");
            }
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.halt(StopReason::Requested);
        if let Some(device) = self.device.take() {
            device.lock().close();
        }
    }
}

/// Read-only view of a sequencer's playback position.
#[derive(Debug, Clone)]
pub struct PositionHandle {
    micros: Arc<AtomicU64>,
}

impl PositionHandle {
    pub fn get(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}
