use chrono::{DateTime, TimeZone, Utc};
use envmon::aggregate::{AggregationStrategy, MetricSample, Resolution, aggregate};

fn sample(ts: DateTime<Utc>, value: f64) -> MetricSample {
    MetricSample {
        recorded_at: ts,
        value,
    }
}

fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, hour, 0, 0).unwrap()
}

#[test]
fn output_length_is_fixed_regardless_of_input_size() {
    let many: Vec<MetricSample> = (0..500)
        .map(|i| {
            sample(
                Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i),
                20.0 + (i % 10) as f64,
            )
        })
        .collect();

    for resolution in Resolution::ALL {
        for input in [&[][..], &many[..]] {
            let buckets = aggregate(input, resolution, AggregationStrategy::Calendar);
            assert_eq!(
                buckets.len(),
                resolution.bucket_len(),
                "length must be fixed for {:?}",
                resolution
            );
        }
    }
}

#[test]
fn aggregation_is_idempotent() {
    let readings = vec![
        sample(at_hour(0), 20.0),
        sample(at_hour(7), 23.5),
        sample(at_hour(22), 19.0),
    ];
    for resolution in Resolution::ALL {
        let first = aggregate(&readings, resolution, AggregationStrategy::Calendar);
        let second = aggregate(&readings, resolution, AggregationStrategy::Calendar);
        assert_eq!(first, second, "same input must yield identical buckets");
    }
}

#[test]
fn day_example_from_three_readings() {
    // Readings at hours [0, 0, 12] with temperatures [20, 22, 30]:
    // bucket 0 averages to 21, bucket 12 holds 30, all 22 others stay empty.
    let readings = vec![
        sample(at_hour(0), 20.0),
        sample(at_hour(0), 22.0),
        sample(at_hour(12), 30.0),
    ];

    let buckets = aggregate(&readings, Resolution::Day, AggregationStrategy::Calendar);

    assert_eq!(buckets[0], Some(21.0));
    assert_eq!(buckets[12], Some(30.0));
    let empty = buckets.iter().filter(|b| b.is_none()).count();
    assert_eq!(empty, 22, "every other bucket must stay null");
}

#[test]
fn unsorted_input_is_tolerated() {
    let newest = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
    let shuffled = vec![
        sample(newest - chrono::Duration::minutes(30), 10.0),
        sample(newest, 40.0),
        sample(newest - chrono::Duration::minutes(10), 20.0),
    ];

    let buckets = aggregate(&shuffled, Resolution::Hour, AggregationStrategy::Calendar);

    // Offsets are measured against the true newest reading, wherever it
    // appears in the input.
    assert_eq!(buckets[0], Some(40.0));
    assert_eq!(buckets[10], Some(20.0));
    assert_eq!(buckets[30], Some(10.0));
}

#[test]
fn empty_buckets_are_distinct_from_zero_averages() {
    let readings = vec![sample(at_hour(5), 0.0)];
    let buckets = aggregate(&readings, Resolution::Day, AggregationStrategy::Calendar);
    assert_eq!(buckets[5], Some(0.0), "a zero average is a value");
    assert_eq!(buckets[6], None, "an untouched bucket is null");
}

#[test]
fn calendar_and_sliding_strategies_diverge_on_old_readings() {
    // A reading from two days ago at 08:00: calendar files it under the
    // hour-of-day bucket, sliding drops it from the 24-hour window.
    let newest = Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap();
    let readings = vec![
        sample(newest, 24.0),
        sample(newest - chrono::Duration::days(2), 18.0),
    ];

    let calendar = aggregate(&readings, Resolution::Day, AggregationStrategy::Calendar);
    assert_eq!(calendar[8], Some(21.0), "calendar averages across days");

    let sliding = aggregate(&readings, Resolution::Day, AggregationStrategy::Sliding);
    assert_eq!(sliding[0], Some(24.0));
    assert_eq!(
        sliding.iter().flatten().count(),
        1,
        "sliding keeps only the trailing window"
    );
}

#[test]
fn year_buckets_group_by_calendar_month() {
    let january = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
    let january_again = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();
    let july = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();

    let readings = vec![
        sample(january, 16.0),
        sample(january_again, 20.0),
        sample(july, 28.0),
    ];

    let buckets = aggregate(&readings, Resolution::Year, AggregationStrategy::Calendar);
    assert_eq!(buckets[0], Some(18.0), "both januaries share bucket 0");
    assert_eq!(buckets[6], Some(28.0));
}
