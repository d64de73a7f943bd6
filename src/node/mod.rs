use std::sync::atomic::{AtomicUsize, Ordering};

use crate::util::statistic::Statistic;

pub mod echo;
pub mod receiver;
pub mod sender;

pub trait Node {
    fn run(&mut self) -> Result<Statistic, &'static str>;
}

/// Credit-based backpressure for connectionless transports: caps how many
/// bytes the sender may have outstanding before the receiver has drained
/// them. UDP provides no flow control of its own, so without this cap the
/// sender overruns the peer's buffers and datagrams are silently dropped.
///
/// Owned by the engine instance running the session, shared between exactly
/// one sender and one receiver task.
pub struct InFlightWindow {
    bytes: AtomicUsize,
    cap: usize,
}

impl InFlightWindow {
    pub fn new(cap: usize) -> InFlightWindow {
        InFlightWindow {
            bytes: AtomicUsize::new(0),
            cap,
        }
    }

    /// Reserves `len` bytes of the window. Fails when the reservation would
    /// push the outstanding byte count beyond the cap; the sender retries
    /// after the receiver has acknowledged some data.
    pub fn try_reserve(&self, len: usize) -> bool {
        let mut current = self.bytes.load(Ordering::Acquire);
        loop {
            if current + len > self.cap {
                return false;
            }
            match self.bytes.compare_exchange(
                current,
                current + len,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Receiver-side draw-down after `len` bytes arrived.
    pub fn acknowledge(&self, len: usize) {
        // The peer may echo more than is outstanding (stray datagrams from a
        // previous run); saturate instead of wrapping.
        let _ = self
            .bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(len))
            });
    }

    pub fn outstanding(&self) -> usize {
        self.bytes.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_window_blocks_at_cap() {
        let window = InFlightWindow::new(4096);
        assert!(window.try_reserve(4096));
        assert!(!window.try_reserve(1));
        window.acknowledge(1);
        assert!(window.try_reserve(1));
        assert_eq!(window.outstanding(), 4096);
    }

    #[test]
    fn test_window_acknowledge_saturates() {
        let window = InFlightWindow::new(128);
        window.try_reserve(64);
        window.acknowledge(1000);
        assert_eq!(window.outstanding(), 0);
    }

    #[test]
    fn test_window_never_exceeds_cap_under_contention() {
        let window = Arc::new(InFlightWindow::new(4096));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let window = Arc::clone(&window);
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    if window.try_reserve(128) {
                        assert!(window.outstanding() <= 4096);
                        window.acknowledge(128);
                    }
                    assert!(window.outstanding() <= 4096);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(window.outstanding(), 0);
    }
}
