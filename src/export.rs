use chrono::{DateTime, SecondsFormat, Utc};

use crate::aggregate::Resolution;
use crate::state::LocationState;

pub const CSV_HEADER: &str = "Timestamp,Temperature (°C),Noise Level (dB),Humidity (%)";

/// Render one location's data as the downstream CSV contract.
///
/// One row for the current reading at the export instant, then one row per
/// historical bucket, bucket index i stamped `now - i * step`. The Year step
/// is a fixed 30 days; the bucket arrays carry no real calendar months to
/// recover. Empty buckets render empty cells, which keeps "no data" distinct
/// from a zero average in the output as well.
pub fn export_csv(location: &LocationState, resolution: Resolution, now: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(4 * 1024);
    out.push_str(CSV_HEADER);
    out.push('\n');

    if let Some(current) = &location.current {
        out.push_str(&format!(
            "{},{:.1},{:.1},{:.1}\n",
            timestamp(now),
            current.temperature_c,
            current.sound_db,
            current.humidity_pct,
        ));
    }

    let temperature = location.history.temperature.get(resolution);
    let noise = location.history.noise.get(resolution);
    let humidity = location.history.humidity.get(resolution);
    let step = resolution.step();

    for i in 0..resolution.bucket_len() {
        let ts = now - step * i as i32;
        out.push_str(&format!(
            "{},{},{},{}\n",
            timestamp(ts),
            cell(temperature.get(i).copied().flatten()),
            cell(noise.get(i).copied().flatten()),
            cell(humidity.get(i).copied().flatten()),
        ));
    }

    out
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => String::new(),
    }
}
