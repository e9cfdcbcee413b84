use std::time::Duration;

use super::condition::{AtTime, TriggerCondition};
use crate::events::TimedEvent;

/// Cursor over a time-sorted event list, advanced by repeated time queries.
pub struct EventCollector<T = AtTime> {
    events: Vec<TimedEvent>,
    trigger: T,
    cursor: usize,
}

impl EventCollector<AtTime> {
    pub fn new(events: Vec<TimedEvent>) -> Self {
        Self::with_trigger(events, AtTime)
    }
}

impl<T: TriggerCondition> EventCollector<T> {
    pub fn with_trigger(mut events: Vec<TimedEvent>, trigger: T) -> Self {
        events.sort_by_key(|e| e.time);
        Self {
            events,
            trigger,
            cursor: 0,
        }
    }

    /// Every event passed since the previous call, in order.
    pub fn advance_collect_all(&mut self, time: Duration) -> &[TimedEvent] {
        let start = self.cursor;
        self.advance(time);
        &self.events[start..self.cursor]
    }

    /// Only the last event passed since the previous call.
    pub fn advance_collect_one(&mut self, time: Duration) -> Option<&TimedEvent> {
        let start = self.cursor;
        self.advance(time);
        if self.cursor > start {
            self.events.get(self.cursor - 1)
        } else {
            None
        }
    }

    /// Jumps to the first event at or after `time`, without replaying anything.
    pub fn seek(&mut self, time: Duration) {
        self.cursor = self.events.partition_point(|e| e.time < time);
    }

    /// Next event to be triggered.
    pub fn peek(&self) -> Option<&TimedEvent> {
        self.events.get(self.cursor)
    }

    /// Most recently consumed event.
    pub fn prev(&self) -> Option<&TimedEvent> {
        self.cursor.checked_sub(1).and_then(|i| self.events.get(i))
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.events.len()
    }

    fn advance(&mut self, time: Duration) {
        while let Some(event) = self.events.get(self.cursor) {
            if !self.trigger.is_triggered(event, time) {
                break;
            }
            self.cursor += 1;
        }
    }
}
