//! Progress accounting for an upload session.
//!
//! Throughput comes from a sliding measurement window and is advisory only:
//! nothing in the scheduler gates on it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::watch;

const WINDOW: Duration = Duration::from_secs(10);

/// A point-in-time view of upload progress.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Parts recorded as completed so far.
    pub completed_parts: u64,
    /// Plaintext bytes those parts covered.
    pub completed_bytes: u64,
    /// Sliding-window throughput estimate. Advisory only.
    pub bytes_per_sec: f64,
}

/// Owned by the scheduler loop; mutated only at part settlement.
pub(crate) struct ProgressTracker {
    tx: watch::Sender<ProgressSnapshot>,
    window: VecDeque<(Instant, u64)>,
    completed_parts: u64,
    completed_bytes: u64,
}

impl ProgressTracker {
    pub(crate) fn new() -> (Self, watch::Receiver<ProgressSnapshot>) {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        (
            Self {
                tx,
                window: VecDeque::new(),
                completed_parts: 0,
                completed_bytes: 0,
            },
            rx,
        )
    }

    pub(crate) fn record_part(&mut self, plain_bytes: u64) {
        let now = Instant::now();
        self.completed_parts += 1;
        self.completed_bytes += plain_bytes;

        self.window.push_back((now, plain_bytes));
        while let Some(&(t, _)) = self.window.front() {
            if now.duration_since(t) > WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }

        let windowed: u64 = self.window.iter().map(|&(_, b)| b).sum();
        let span = self
            .window
            .front()
            .map(|&(t, _)| now.duration_since(t))
            .unwrap_or_default()
            .max(Duration::from_millis(1));

        let _ = self.tx.send(ProgressSnapshot {
            completed_parts: self.completed_parts,
            completed_bytes: self.completed_bytes,
            bytes_per_sec: windowed as f64 / span.as_secs_f64(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let (mut tracker, rx) = ProgressTracker::new();
        tracker.record_part(10);
        tracker.record_part(10);
        tracker.record_part(5);

        let snap = *rx.borrow();
        assert_eq!(snap.completed_parts, 3);
        assert_eq!(snap.completed_bytes, 25);
        assert!(snap.bytes_per_sec > 0.0);
    }

    #[test]
    fn test_initial_snapshot_is_zero() {
        let (_tracker, rx) = ProgressTracker::new();
        assert_eq!(*rx.borrow(), ProgressSnapshot::default());
    }
}
