//! Tracks event listeners with per-listener filter predicates.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::packet::Packet;

/// A filter deciding whether a given packet should be delivered to a
/// subscriber. The default (used by `StartListening` with no predicate) is
/// always-true.
pub type Predicate = Box<dyn Fn(&Packet) -> bool + Send + Sync>;

pub struct Subscriber {
    tx: mpsc::Sender<Packet>,
    predicate: Predicate,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<u64, Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `StartListening`: insert or replace the entry for `key`.
    pub fn start_listening(&mut self, key: u64, tx: mpsc::Sender<Packet>, predicate: Predicate) {
        self.subscribers.insert(key, Subscriber { tx, predicate });
    }

    /// `StopListening`, or removal on originator death.
    pub fn stop_listening(&mut self, key: u64) {
        self.subscribers.remove(&key);
    }

    pub fn contains(&self, key: u64) -> bool {
        self.subscribers.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `packet` to every subscriber whose predicate matches.
    ///
    /// Best-effort: a subscriber whose channel is full has the event dropped
    /// but stays registered; a subscriber whose channel is closed is removed.
    pub fn dispatch(&mut self, packet: &Packet) {
        let mut dead = Vec::new();
        for (key, sub) in &self.subscribers {
            if !(sub.predicate)(packet) {
                continue;
            }
            match sub.tx.try_send(packet.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = key, "subscriber channel full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*key);
                }
            }
        }
        for key in dead {
            tracing::debug!(subscriber = key, "removing dead subscriber");
            self.subscribers.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn event_packet(name: &str) -> Packet {
        let mut parsed = Map::new();
        parsed.insert("event-name".to_string(), name.to_string());
        Packet {
            packet_type: "text/event-plain".to_string(),
            headers: Map::new(),
            body: Vec::new(),
            parsed,
            success: false,
            job_id: None,
            rest: None,
        }
    }

    #[test]
    fn predicate_filters_delivery() {
        let mut reg = SubscriberRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        reg.start_listening(
            1,
            tx_a,
            Box::new(|p: &Packet| p.event_name().is_some_and(|n| n.starts_with("CHANNEL_"))),
        );
        reg.start_listening(2, tx_b, Box::new(|_| true));

        reg.dispatch(&event_packet("CHANNEL_CREATE"));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());

        reg.dispatch(&event_packet("HEARTBEAT"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn closed_channel_is_removed_on_next_dispatch() {
        let mut reg = SubscriberRegistry::new();
        let (tx, rx) = mpsc::channel(8);
        reg.start_listening(1, tx, Box::new(|_| true));
        drop(rx);

        reg.dispatch(&event_packet("HEARTBEAT"));
        assert!(!reg.contains(1));
    }

    #[test]
    fn full_channel_drops_event_but_keeps_subscriber() {
        let mut reg = SubscriberRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        reg.start_listening(1, tx, Box::new(|_| true));

        reg.dispatch(&event_packet("A"));
        reg.dispatch(&event_packet("B")); // channel full, dropped

        assert!(reg.contains(1));
        let first = rx.try_recv().unwrap();
        assert_eq!(first.event_name(), Some("A"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_listening_removes_entry() {
        let mut reg = SubscriberRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        reg.start_listening(1, tx, Box::new(|_| true));
        reg.stop_listening(1);
        assert!(!reg.contains(1));
    }
}
