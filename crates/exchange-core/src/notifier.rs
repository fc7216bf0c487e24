use std::sync::Arc;
use tokio::sync::watch;

/// Change counter shared by a session and its quote manager. Observers wait on
/// [`watch::Receiver::changed`] and then read a fresh snapshot.
#[derive(Debug, Clone)]
pub struct StateNotifier {
    revision: Arc<watch::Sender<u64>>,
}

impl StateNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            revision: Arc::new(tx),
        }
    }

    pub fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}
