//! Transport notifications, fanned out to every subscriber.

use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    /// Stopped to seek; playback resumes right after if it was running.
    Seek,
    EndOfTimeline,
    DeviceError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerUpdate {
    Started { position: Duration },
    Stopped { reason: StopReason },
    Chased { position: Duration, messages: usize },
    DeviceError { message: String },
}

impl SequencerUpdate {
    /// `Stopped` for any reason other than a seek.
    pub fn is_final_stop(&self) -> bool {
        matches!(self, SequencerUpdate::Stopped { reason } if *reason != StopReason::Seek)
    }
}

/// One unbounded channel per subscriber. Subscribers that hung up are pruned
/// on the next publish.
#[derive(Debug, Default)]
pub(crate) struct UpdateBus {
    subscribers: Mutex<Vec<Sender<SequencerUpdate>>>,
}

impl UpdateBus {
    pub fn subscribe(&self) -> Receiver<SequencerUpdate> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, update: SequencerUpdate) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(update.clone()).is_ok());
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }
}
