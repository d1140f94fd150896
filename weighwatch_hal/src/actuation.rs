//! Cross-thread actuation requests.
//!
//! Threads that are not the orchestrator never touch pins. They push an
//! [`ActuationRequest`] through an [`ActuationSender`]; the orchestrator
//! owns the single [`ActuationQueue`] and drains it once per loop
//! iteration, so every pin keeps exactly one writer.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;
use weighwatch_common::melody::Melody;

/// Work the orchestrator performs on behalf of another thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ActuationRequest {
    /// Flash the status LED (at least the configured minimum).
    FlashLed {
        /// Requested flashes.
        count: u32,
    },
    /// Start a melody on the buzzer unless one is already playing.
    PlayMelody(Melody),
    /// Stop the playing melody.
    StopMelody,
}

type Shared = Arc<Mutex<VecDeque<ActuationRequest>>>;

/// Consumer side, owned by the orchestrator.
#[derive(Debug, Default)]
pub struct ActuationQueue {
    inner: Shared,
}

/// Producer side. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct ActuationSender {
    inner: Shared,
}

impl ActuationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// New producer handle.
    pub fn sender(&self) -> ActuationSender {
        ActuationSender {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take every pending request in FIFO order.
    pub fn drain(&self) -> Vec<ActuationRequest> {
        self.inner.lock().drain(..).collect()
    }

    /// Pending requests.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl ActuationSender {
    /// Queue a request for the orchestrator.
    pub fn push(&self, request: ActuationRequest) {
        trace!("Actuation request queued: {:?}", request);
        self.inner.lock().push_back(request);
    }

    /// Queue a LED flash.
    pub fn flash_led(&self, count: u32) {
        self.push(ActuationRequest::FlashLed { count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_is_fifo() {
        let queue = ActuationQueue::new();
        let tx = queue.sender();
        tx.flash_led(1);
        tx.push(ActuationRequest::StopMelody);
        tx.flash_led(5);

        assert_eq!(queue.len(), 3);
        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![
                ActuationRequest::FlashLed { count: 1 },
                ActuationRequest::StopMelody,
                ActuationRequest::FlashLed { count: 5 },
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn producers_on_other_threads() {
        let queue = ActuationQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tx = queue.sender();
                thread::spawn(move || {
                    for _ in 0..10 {
                        tx.flash_led(i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queue.drain().len(), 40);
    }
}
