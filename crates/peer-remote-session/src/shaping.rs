//! Client-side shaping of high-frequency input.

use std::time::Duration;

use tokio::time::Instant;

/// Scales drag deltas, accumulates them and releases whole units at a
/// bounded rate.
///
/// The fractional remainder of every flush stays in the accumulator, so the
/// total sent never drifts more than one unit from the scaled input.
#[derive(Debug, Clone)]
pub struct DragThrottle {
    gain: f64,
    interval: Duration,
    acc_x: f64,
    acc_y: f64,
    last_flush: Option<Instant>,
}

impl DragThrottle {
    #[must_use]
    pub const fn new(gain: f64, interval: Duration) -> Self {
        Self {
            gain,
            interval,
            acc_x: 0.0,
            acc_y: 0.0,
            last_flush: None,
        }
    }

    /// Pending scaled delta not yet sent.
    #[must_use]
    pub const fn pending(&self) -> (f64, f64) {
        (self.acc_x, self.acc_y)
    }

    /// Add a raw drag delta observed at `now`.
    ///
    /// Returns the whole units to send if the flush interval has elapsed
    /// and at least one unit is pending.
    pub fn push(&mut self, dx: f64, dy: f64, now: Instant) -> Option<(i64, i64)> {
        if dx.is_finite() && dy.is_finite() {
            self.acc_x += dx * self.gain;
            self.acc_y += dy * self.gain;
        }

        if let Some(last) = self.last_flush {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }

        let flushed = self.take_whole()?;
        self.last_flush = Some(now);
        Some(flushed)
    }

    /// Touch released: flush whole units regardless of rate and reset.
    pub fn finish(&mut self) -> Option<(i64, i64)> {
        let flushed = self.take_whole();
        self.acc_x = 0.0;
        self.acc_y = 0.0;
        self.last_flush = None;
        flushed
    }

    #[allow(clippy::cast_possible_truncation)]
    fn take_whole(&mut self) -> Option<(i64, i64)> {
        let (wx, wy) = (self.acc_x.trunc(), self.acc_y.trunc());
        if wx == 0.0 && wy == 0.0 {
            return None;
        }
        self.acc_x -= wx;
        self.acc_y -= wy;
        Some((wx as i64, wy as i64))
    }
}

/// Split a total delta into `steps` equal parts.
#[must_use]
pub fn precision_steps(dx: f64, dy: f64, steps: u32) -> Vec<(f64, f64)> {
    let steps = steps.max(1);
    let n = f64::from(steps);
    (0..steps).map(|_| (dx / n, dy / n)).collect()
}
