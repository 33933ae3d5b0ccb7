use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use crate::alerts;
use crate::app::AppContext;
use crate::classify::MetricKind;
use crate::config::LocationId;
use crate::source::CurrentReading;

/// Fast cycle: refresh every location's current reading.
///
/// All fetches run concurrently and each failure is isolated to its
/// location: the stale LocationState is kept with its error flag set while
/// the others update. The cycle itself only fails when no location could be
/// refreshed at all, so /healthz reflects a total source outage but not a
/// flaky corner sensor.
#[instrument(skip_all)]
pub async fn run(ctx: &AppContext) -> Result<()> {
    let mut fetches: JoinSet<(LocationId, Result<CurrentReading>)> = JoinSet::new();
    for location in &ctx.config.locations {
        let source = ctx.source.clone();
        let id = location.id.clone();
        fetches.spawn(async move {
            let result = source.fetch_current(&id).await;
            (id, result)
        });
    }

    let mut results: BTreeMap<LocationId, Result<CurrentReading>> = BTreeMap::new();
    while let Some(joined) = fetches.join_next().await {
        let (id, result) = joined?;
        results.insert(id, result);
    }

    let mut updated = 0_usize;
    let mut outcomes: BTreeMap<LocationId, Option<CurrentReading>> = BTreeMap::new();
    for (id, result) in results {
        match result {
            Ok(reading) => match reading.validate() {
                Ok(()) => {
                    updated += 1;
                    outcomes.insert(id, Some(reading));
                }
                Err(err) => {
                    warn!(location = %id, error = %err, "rejected malformed reading");
                    ctx.metrics.inc_fetch_failure(id.as_str());
                    outcomes.insert(id, None);
                }
            },
            Err(err) => {
                warn!(location = %id, error = %err, "failed to fetch current reading");
                ctx.metrics.inc_fetch_failure(id.as_str());
                outcomes.insert(id, None);
            }
        }
    }

    if updated == 0 {
        bail!(
            "no location could be refreshed ({} fetches failed)",
            outcomes.len()
        );
    }

    let thresholds = ctx.config.thresholds.clone();
    ctx.state
        .replace_snapshot(|prev| {
            let mut next = prev.clone();
            for (id, outcome) in &outcomes {
                let Some(prev_location) = prev.locations.get(id) else {
                    continue;
                };
                let next_location = match outcome {
                    Some(reading) => prev_location.with_reading(reading.clone(), &thresholds),
                    None => prev_location.with_error("reading unavailable; kept last known state"),
                };
                next.locations.insert(id.clone(), next_location);
            }

            let latest: Vec<(&LocationId, &CurrentReading)> = next
                .locations
                .iter()
                .filter_map(|(id, loc)| loc.current.as_ref().map(|r| (id, r)))
                .collect();
            next.alerts = alerts::derive_alerts(latest, &thresholds);
            next.generated_at = Some(Utc::now());
            next
        })
        .await;

    publish_metrics(ctx).await;
    Ok(())
}

/// Mirror the fresh snapshot into prometheus gauges.
async fn publish_metrics(ctx: &AppContext) {
    let snapshot = ctx.state.snapshot().await;
    for (id, location) in &snapshot.locations {
        if let Some(reading) = &location.current {
            ctx.metrics
                .set_reading(id.as_str(), MetricKind::Temperature, reading.temperature_c);
            ctx.metrics
                .set_reading(id.as_str(), MetricKind::Noise, reading.sound_db);
            ctx.metrics
                .set_reading(id.as_str(), MetricKind::Humidity, reading.humidity_pct);
            ctx.metrics.set_reading(
                id.as_str(),
                MetricKind::Battery,
                location.battery_level as f64,
            );
        }
        ctx.metrics.set_composite(id.as_str(), location.composite);
    }
    for alert in &snapshot.alerts {
        ctx.metrics.inc_alert(alert.metric, alert.severity);
    }
    ctx.metrics.set_active_alerts(snapshot.alerts.len());
}
