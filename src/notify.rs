use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{DateId, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Per-date broadcast of committed events.
pub struct NotifyHub {
    channels: DashMap<DateId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes on a date. Creates the channel if needed.
    pub fn subscribe(&self, date: DateId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(date)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, date: DateId, event: &Event) {
        if let Some(sender) = self.channels.get(&date) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose receivers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
