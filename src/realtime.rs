// realtime.rs
use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use uuid::Uuid;

/// Trigger event: "the tally changed, re-fetch". Deliberately payload-free so
/// viewers always re-derive truth from the results endpoint; missed,
/// duplicated or reordered deliveries are all harmless.
#[derive(Debug, Clone, Copy)]
pub struct PollChanged;

/// Per-subscriber buffer depth. Triggers are collapsible, so a lagged
/// receiver just re-fetches once and is current again.
const TOPIC_CAPACITY: usize = 16;

/// One broadcast topic per poll, created lazily on first subscribe and pruned
/// once the last subscriber is gone. Publishing to a poll nobody watches is a
/// no-op, not an error.
pub struct PollEvents {
    topics: Mutex<HashMap<Uuid, broadcast::Sender<PollChanged>>>,
}

impl PollEvents {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, poll_id: Uuid) -> broadcast::Receiver<PollChanged> {
        let mut topics = self.topics.lock().expect("fanout topics poisoned");
        topics
            .entry(poll_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Fire-and-forget delivery to the poll's current subscribers only.
    pub fn publish(&self, poll_id: Uuid) {
        let mut topics = self.topics.lock().expect("fanout topics poisoned");
        if let Some(sender) = topics.get(&poll_id) {
            if sender.send(PollChanged).is_err() {
                // Last subscriber left; reclaim the topic.
                topics.remove(&poll_id);
            }
        }
    }

    #[cfg(test)]
    fn topic_count(&self) -> usize {
        self.topics.lock().expect("fanout topics poisoned").len()
    }
}

impl Default for PollEvents {
    fn default() -> Self {
        Self::new()
    }
}
