use std::collections::VecDeque;

use crate::api::types::SchedulerEvent;

/// Events kept between drains. Older events are dropped first.
pub const EVENT_CAPACITY: usize = 256;

/// Bounded queue of scheduler events.
/// The scheduler pushes as things happen; callers drain whenever they like.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<SchedulerEvent>,
    dropped: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(32),
            dropped: 0,
        }
    }

    /// Push an event, evicting the oldest one when full.
    pub fn push(&mut self, event: SchedulerEvent) {
        if self.events.len() == EVENT_CAPACITY {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Drain all pending events in the order they happened.
    pub fn drain(&mut self) -> Vec<SchedulerEvent> {
        self.events.drain(..).collect()
    }

    /// Iterate over pending events without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = &SchedulerEvent> {
        self.events.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Events evicted because nobody drained the queue in time.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
