//! Transfer rate estimation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_SAMPLE_INTERVAL, DEFAULT_SPEED_WINDOW};

/// Rolling average of the upload speed.
#[derive(Debug, Clone)]
pub struct TransferStats {
    timestamp: Instant,
    last_sent: Option<u64>,
    total: u64,
    samples: VecDeque<f64>,
    min_interval: Duration,
    window: usize,
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL, DEFAULT_SPEED_WINDOW)
    }
}

impl TransferStats {
    pub fn new(min_interval: Duration, window: usize) -> Self {
        Self {
            timestamp: Instant::now(),
            last_sent: None,
            total: 0,
            samples: VecDeque::new(),
            min_interval,
            window: window.max(1),
        }
    }

    pub fn update(&mut self, sent: u64, total: u64) {
        self.update_at(sent, total, Instant::now());
    }

    /// Record that `sent` of `total` bytes were transferred at `now`.
    ///
    /// Updates closer than the sampling interval to the previous sample are
    /// ignored.
    pub fn update_at(&mut self, sent: u64, total: u64, now: Instant) {
        self.total = total;
        let Some(last_sent) = self.last_sent else {
            self.last_sent = Some(sent);
            self.timestamp = now;
            return;
        };
        let elapsed = now.saturating_duration_since(self.timestamp);
        if elapsed < self.min_interval || elapsed.is_zero() {
            return;
        }

        let added = sent.saturating_sub(last_sent);
        self.samples.push_back(added as f64 / elapsed.as_secs_f64());
        if self.samples.len() > self.window {
            self.samples.pop_front();
        }
        self.timestamp = now;
        self.last_sent = Some(sent);
    }

    /// Average speed in bytes per second, 0 before the first sample.
    pub fn speed(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Estimated seconds left. Infinite while the speed is unknown.
    pub fn remaining(&self) -> f64 {
        let left = self.total.saturating_sub(self.last_sent.unwrap_or(0)) as f64;
        if left == 0.0 {
            return 0.0;
        }
        left / self.speed()
    }
}
