use std::collections::VecDeque;

use serde::Serialize;

/// Number of slots in a rolling window: "6 units ago" through "now".
pub const WINDOW_SLOTS: usize = 7;

/// Battery buffers start from a plausible decline instead of zeros so the
/// first render shows a falling bar chart rather than a cliff.
pub const BATTERY_SEED: [f64; WINDOW_SLOTS] = [100.0, 98.0, 96.0, 93.0, 91.0, 89.0, 87.0];

/// Fixed-length ring of the most recent values for one metric.
///
/// Feeds sparklines and the short-horizon trend; the full-history aggregator
/// never reads it.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RollingBuffer {
    values: VecDeque<f64>,
}

impl RollingBuffer {
    /// Buffer pre-filled with zeros.
    pub fn zeroed() -> Self {
        Self::seeded(&[0.0])
    }

    /// Buffer pre-filled from a seed sequence, padded at the front with the
    /// seed's first value when shorter than the window.
    pub fn seeded(seed: &[f64]) -> Self {
        let mut values: VecDeque<f64> = seed
            .iter()
            .copied()
            .skip(seed.len().saturating_sub(WINDOW_SLOTS))
            .collect();
        let pad = seed.first().copied().unwrap_or(0.0);
        while values.len() < WINDOW_SLOTS {
            values.push_front(pad);
        }
        Self { values }
    }

    /// Append a value, evicting the oldest entry past the window length.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > WINDOW_SLOTS {
            self.values.pop_front();
        }
    }

    /// Entries ordered oldest to newest.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Percent change between the two most recent entries, rounded to one
    /// decimal place. Returns 0 when there are fewer than two entries or the
    /// previous entry is zero, so the result is never NaN or infinite.
    pub fn trend(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let last = self.values[self.values.len() - 1];
        let prev = self.values[self.values.len() - 2];
        if prev == 0.0 {
            return 0.0;
        }
        round1((last - prev) / prev * 100.0)
    }

    /// Battery variant of [`trend`]: the sign is forced negative because the
    /// fleet's sensors only ever discharge between readings. An externally
    /// powered sensor would need this lifted.
    ///
    /// [`trend`]: RollingBuffer::trend
    pub fn battery_trend(&self) -> f64 {
        -self.trend().abs()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
