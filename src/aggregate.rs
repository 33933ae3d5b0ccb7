use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Bucket granularity for historical aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Hour,
    Day,
    Month,
    Year,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Hour,
        Resolution::Day,
        Resolution::Month,
        Resolution::Year,
    ];

    /// Fixed output array length for this resolution.
    pub fn bucket_len(&self) -> usize {
        match self {
            Resolution::Hour => 60,
            Resolution::Day => 24,
            Resolution::Month => 30,
            Resolution::Year => 12,
        }
    }

    /// Wall-clock width of one bucket step, used by the CSV export. Year
    /// steps are the fixed 30-day approximation the export contract calls
    /// for, not calendar months.
    pub fn step(&self) -> chrono::Duration {
        match self {
            Resolution::Hour => chrono::Duration::minutes(1),
            Resolution::Day => chrono::Duration::hours(1),
            Resolution::Month => chrono::Duration::days(1),
            Resolution::Year => chrono::Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hour => "hour",
            Resolution::Day => "day",
            Resolution::Month => "month",
            Resolution::Year => "year",
        }
    }

    pub fn parse(value: &str) -> Option<Resolution> {
        match value.to_ascii_lowercase().as_str() {
            "hour" => Some(Resolution::Hour),
            "day" => Some(Resolution::Day),
            "month" => Some(Resolution::Month),
            "year" => Some(Resolution::Year),
            _ => None,
        }
    }
}

/// How readings map onto buckets.
///
/// `Calendar` reproduces the deployed behavior: a Day bucket holds *all
/// history ever seen* at that hour-of-day, not the trailing 24 hours. It is
/// easy to "fix" this into a sliding window by accident, which silently
/// changes the data semantics, so the sliding variant is an explicit opt-in
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    #[default]
    Calendar,
    Sliding,
}

/// One timestamped value for a single metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricSample {
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
}

/// Fixed-length bucket arrays for one metric across all four resolutions.
///
/// `None` marks a bucket no reading fell into, which is distinct from a
/// computed average of zero.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryBuckets {
    pub hour: Vec<Option<f64>>,
    pub day: Vec<Option<f64>>,
    pub month: Vec<Option<f64>>,
    pub year: Vec<Option<f64>>,
}

impl HistoryBuckets {
    /// All-empty buckets at the fixed lengths.
    pub fn empty() -> Self {
        Self {
            hour: vec![None; Resolution::Hour.bucket_len()],
            day: vec![None; Resolution::Day.bucket_len()],
            month: vec![None; Resolution::Month.bucket_len()],
            year: vec![None; Resolution::Year.bucket_len()],
        }
    }

    /// Aggregate one metric's samples at every resolution.
    pub fn from_samples(samples: &[MetricSample], strategy: AggregationStrategy) -> Self {
        Self {
            hour: aggregate(samples, Resolution::Hour, strategy),
            day: aggregate(samples, Resolution::Day, strategy),
            month: aggregate(samples, Resolution::Month, strategy),
            year: aggregate(samples, Resolution::Year, strategy),
        }
    }

    pub fn get(&self, resolution: Resolution) -> &[Option<f64>] {
        match resolution {
            Resolution::Hour => &self.hour,
            Resolution::Day => &self.day,
            Resolution::Month => &self.month,
            Resolution::Year => &self.year,
        }
    }
}

impl Default for HistoryBuckets {
    fn default() -> Self {
        Self::empty()
    }
}

/// Group samples into the resolution's fixed-length bucket array and average
/// each bucket.
///
/// Input may arrive in any order; it is sorted descending by timestamp
/// before bucketing, and non-finite values are discarded. Empty input
/// produces an all-`None` array. The function never fails and is idempotent.
pub fn aggregate(
    samples: &[MetricSample],
    resolution: Resolution,
    strategy: AggregationStrategy,
) -> Vec<Option<f64>> {
    let len = resolution.bucket_len();
    let mut sums = vec![0.0_f64; len];
    let mut counts = vec![0_u32; len];

    let mut sorted: Vec<&MetricSample> = samples.iter().filter(|s| s.value.is_finite()).collect();
    sorted.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));

    let Some(newest) = sorted.first() else {
        return vec![None; len];
    };
    let reference = newest.recorded_at;

    for sample in &sorted {
        if let Some(idx) = bucket_index(resolution, strategy, reference, sample.recorded_at) {
            sums[idx] += sample.value;
            counts[idx] += 1;
        }
    }

    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count > 0 {
                Some(sum / count as f64)
            } else {
                None
            }
        })
        .collect()
}

/// Bucket index for a sample, or `None` when it falls outside the array.
///
/// Calendar buckets key on a calendar field of the timestamp, except Hour,
/// which is the literal whole-minute offset from the most recent reading
/// (index 0 = newest). Sliding buckets use the offset rule at every
/// resolution. Day-of-month 31 clamps into the last Month bucket.
fn bucket_index(
    resolution: Resolution,
    strategy: AggregationStrategy,
    reference: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
) -> Option<usize> {
    let len = resolution.bucket_len();
    match (strategy, resolution) {
        (AggregationStrategy::Calendar, Resolution::Hour)
        | (AggregationStrategy::Sliding, Resolution::Hour) => {
            offset_index(reference.signed_duration_since(recorded_at).num_minutes(), len)
        }
        (AggregationStrategy::Calendar, Resolution::Day) => Some(recorded_at.hour() as usize),
        (AggregationStrategy::Calendar, Resolution::Month) => {
            Some((recorded_at.day().min(30) - 1) as usize)
        }
        (AggregationStrategy::Calendar, Resolution::Year) => Some(recorded_at.month0() as usize),
        (AggregationStrategy::Sliding, Resolution::Day) => {
            offset_index(reference.signed_duration_since(recorded_at).num_hours(), len)
        }
        (AggregationStrategy::Sliding, Resolution::Month) => {
            offset_index(reference.signed_duration_since(recorded_at).num_days(), len)
        }
        (AggregationStrategy::Sliding, Resolution::Year) => {
            offset_index(reference.signed_duration_since(recorded_at).num_days() / 30, len)
        }
    }
}

fn offset_index(offset: i64, len: usize) -> Option<usize> {
    if (0..len as i64).contains(&offset) {
        Some(offset as usize)
    } else {
        None
    }
}
