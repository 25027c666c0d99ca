//! Maps background-job identifiers to the originator awaiting a result.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::packet::Packet;

#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<String, oneshot::Sender<Packet>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the mapping at the moment `bgapi` is dispatched.
    pub fn register(&mut self, job_id: String, originator: oneshot::Sender<Packet>) {
        self.jobs.insert(job_id, originator);
    }

    /// Remove and return the originator waiting on `job_id`, if any.
    pub fn resolve(&mut self, job_id: &str) -> Option<oneshot::Sender<Packet>> {
        self.jobs.remove(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop all outstanding originators, e.g. on a reconnect that invalidates
    /// any previously dispatched `bgapi` job (the server never echoes a
    /// result for work it no longer remembers).
    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> Packet {
        Packet {
            packet_type: "command/reply".to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            parsed: HashMap::new(),
            success: true,
            job_id: None,
            rest: None,
        }
    }

    #[test]
    fn resolve_removes_the_mapping() {
        let mut reg = JobRegistry::new();
        let (tx, rx) = oneshot::channel();
        reg.register("J1".to_string(), tx);
        assert!(reg.contains("J1"));

        let originator = reg.resolve("J1").unwrap();
        originator.send(packet()).unwrap();
        assert!(!reg.contains("J1"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn resolve_unknown_job_returns_none() {
        let mut reg = JobRegistry::new();
        assert!(reg.resolve("nope").is_none());
    }

    #[test]
    fn clear_drops_all_outstanding_originators() {
        let mut reg = JobRegistry::new();
        let (tx, _rx) = oneshot::channel();
        reg.register("J1".to_string(), tx);
        reg.clear();
        assert!(reg.is_empty());
        assert!(reg.resolve("J1").is_none());
    }
}
