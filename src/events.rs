//! Consolidation event system
//!
//! Domain-specific events emitted while the engine runs, delivered over a
//! topic-keyed subscriber map backed by `std::sync::mpsc` channels. Event
//! payloads describe wallet state (output counts, amounts, unit hashes) and
//! should be treated accordingly by subscribers; they never contain key
//! material.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Events emitted during consolidation and splitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsolidationEvent {
    /// A consolidation unit was composed and broadcast
    UnitBroadcast {
        /// Unit hash
        unit: String,
        /// Number of inputs consumed
        input_count: usize,
        /// Total amount carried by the inputs
        input_amount: u64,
        /// Address receiving the consolidated balance
        destination: String,
    },
    /// A pass finished without composing anything
    PassSkipped {
        /// Why nothing was done ("catching_up", "below_target")
        reason: String,
    },
    /// A pass aborted before broadcast
    PassFailed {
        reason: String,
    },
    /// One scheduled tick finished draining
    DrainCompleted {
        /// Units broadcast during the tick
        broadcasts: usize,
    },
    /// The largest output on an address was split into chunks
    OutputSplit {
        address: String,
        unit: String,
        chunk_amount: u64,
        chunk_count: u32,
    },
}

impl ConsolidationEvent {
    /// Topic name used for filtered subscriptions.
    pub fn event_name(&self) -> &'static str {
        match self {
            ConsolidationEvent::UnitBroadcast { .. } => "unit_broadcast",
            ConsolidationEvent::PassSkipped { .. } => "pass_skipped",
            ConsolidationEvent::PassFailed { .. } => "pass_failed",
            ConsolidationEvent::DrainCompleted { .. } => "drain_completed",
            ConsolidationEvent::OutputSplit { .. } => "output_split",
        }
    }
}

/// Topic-keyed event bus for consolidation events
///
/// Subscribers register for a named topic (or `"all"`) and receive events
/// over an `mpsc` channel. Senders whose receiver has been dropped are
/// pruned lazily on the next publish.
pub struct ConsolidationEventBus {
    subscribers: Arc<Mutex<HashMap<String, Vec<std::sync::mpsc::Sender<ConsolidationEvent>>>>>,
}

impl ConsolidationEventBus {
    /// Create a new event bus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> std::sync::mpsc::Receiver<ConsolidationEvent> {
        self.subscribe("all")
    }

    /// Subscribe to a specific topic.
    ///
    /// # Arguments
    ///
    /// * `event_type` - topic name (e.g. "unit_broadcast", "pass_failed")
    ///   or "all" for every event
    pub fn subscribe(&self, event_type: &str) -> std::sync::mpsc::Receiver<ConsolidationEvent> {
        let (sender, receiver) = std::sync::mpsc::channel();
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers
            .entry(event_type.to_string())
            .or_insert_with(Vec::new)
            .push(sender);
        receiver
    }

    /// Publish an event to its topic and to "all" subscribers.
    pub fn publish(&self, event: ConsolidationEvent) {
        let name = event.event_name();
        let mut subscribers = self.subscribers.lock().unwrap();
        for topic in [name, "all"] {
            if let Some(senders) = subscribers.get_mut(topic) {
                senders.retain(|sender| sender.send(event.clone()).is_ok());
            }
        }
    }
}

impl Default for ConsolidationEventBus {
    fn default() -> Self {
        Self::new()
    }
}
