use chrono::{TimeZone, Utc};
use envmon::aggregate::Resolution;
use envmon::classify::ThresholdTable;
use envmon::config::{LocationConfig, LocationId};
use envmon::export::{CSV_HEADER, export_csv};
use envmon::source::CurrentReading;
use envmon::state::LocationState;

fn location_state() -> LocationState {
    let config = LocationConfig {
        id: LocationId::new("living-room").unwrap(),
        name: "Living Room".to_string(),
    };
    LocationState::new(&config).with_reading(
        CurrentReading {
            temperature_c: 23.42,
            sound_db: 41.0,
            humidity_pct: 48.0,
            battery_pct: Some(88.0),
            recorded_at: Utc::now(),
        },
        &ThresholdTable::default(),
    )
}

#[test]
fn header_matches_the_contract_exactly() {
    let csv = export_csv(&location_state(), Resolution::Day, Utc::now());
    assert_eq!(
        csv.lines().next().unwrap(),
        "Timestamp,Temperature (°C),Noise Level (dB),Humidity (%)"
    );
    assert_eq!(csv.lines().next().unwrap(), CSV_HEADER);
}

#[test]
fn one_current_row_plus_one_row_per_bucket() {
    let state = location_state();
    let now = Utc::now();
    for (resolution, buckets) in [
        (Resolution::Hour, 60),
        (Resolution::Day, 24),
        (Resolution::Month, 30),
        (Resolution::Year, 12),
    ] {
        let csv = export_csv(&state, resolution, now);
        assert_eq!(csv.lines().count(), 1 + 1 + buckets, "{:?}", resolution);
    }
}

#[test]
fn bucket_rows_step_back_from_the_export_instant() {
    let state = location_state();
    let now = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();

    let csv = export_csv(&state, Resolution::Day, now);
    let lines: Vec<&str> = csv.lines().collect();

    // line 1 = current reading at the export instant
    assert!(lines[1].starts_with("2025-03-14T12:00:00"));
    // line 2 = bucket 0 at now, line 3 = bucket 1 one hour back
    assert!(lines[2].starts_with("2025-03-14T12:00:00"));
    assert!(lines[3].starts_with("2025-03-14T11:00:00"));

    let hourly = export_csv(&state, Resolution::Hour, now);
    let lines: Vec<&str> = hourly.lines().collect();
    assert!(lines[3].starts_with("2025-03-14T11:59:00"), "{}", lines[3]);
}

#[test]
fn current_row_carries_the_reading_values() {
    let csv = export_csv(&location_state(), Resolution::Day, Utc::now());
    let current_row = csv.lines().nth(1).unwrap();
    let cells: Vec<&str> = current_row.split(',').collect();
    assert_eq!(cells[1], "23.4", "one decimal place");
    assert_eq!(cells[2], "41.0");
    assert_eq!(cells[3], "48.0");
}
