//! Bounded feeds from external collaborators
//!
//! Producers (sensor or spike observers, the simulated feed task) push samples
//! without blocking; the step loop drains the queue only at step boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One scalar sample for a named stream
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSample {
    pub stream: String,
    pub value: f64,
}

/// Producer half; cheap to clone
#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::Sender<FeedSample>,
    dropped: Arc<AtomicU64>,
}

impl FeedSender {
    /// Push without waiting; a full or closed queue drops the sample
    pub fn try_send(&self, sample: FeedSample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the step loop
#[derive(Debug)]
pub struct FeedQueue {
    rx: mpsc::Receiver<FeedSample>,
    dropped: Arc<AtomicU64>,
}

impl FeedQueue {
    /// Create a queue holding at most `capacity` samples
    pub fn bounded(capacity: usize) -> (FeedSender, FeedQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        (
            FeedSender {
                tx,
                dropped: Arc::clone(&dropped),
            },
            FeedQueue { rx, dropped },
        )
    }

    /// Take up to `max` queued samples without blocking
    pub fn drain(&mut self, max: usize) -> Vec<FeedSample> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.rx.try_recv() {
                Ok(sample) => out.push(sample),
                Err(_) => break,
            }
        }
        out
    }

    /// Samples dropped by producers because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
