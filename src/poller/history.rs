use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use crate::aggregate::{HistoryBuckets, MetricSample};
use crate::app::AppContext;
use crate::config::LocationId;
use crate::source::HistoryReading;
use crate::state::PerMetric;

/// Slow cycle: re-aggregate every location's historical readings into the
/// four-resolution bucket arrays.
///
/// History arrives in arbitrary order; the aggregator sorts it. Battery has
/// no historical feed, so its buckets stay empty while remaining present on
/// every location.
#[instrument(skip_all)]
pub async fn run(ctx: &AppContext) -> Result<()> {
    let mut fetches: JoinSet<(LocationId, Result<Vec<HistoryReading>>)> = JoinSet::new();
    for location in &ctx.config.locations {
        let source = ctx.source.clone();
        let id = location.id.clone();
        fetches.spawn(async move {
            let result = source.fetch_history(&id).await;
            (id, result)
        });
    }

    let strategy = ctx.config.aggregation.strategy;
    let mut aggregated: BTreeMap<LocationId, Option<PerMetric<HistoryBuckets>>> = BTreeMap::new();
    while let Some(joined) = fetches.join_next().await {
        let (id, result) = joined?;
        match result {
            Ok(readings) => {
                let temperature: Vec<MetricSample> = samples(&readings, |r| r.temperature_c);
                let noise: Vec<MetricSample> = samples(&readings, |r| r.sound_db);
                let humidity: Vec<MetricSample> = samples(&readings, |r| r.humidity_pct);

                aggregated.insert(
                    id,
                    Some(PerMetric {
                        temperature: HistoryBuckets::from_samples(&temperature, strategy),
                        noise: HistoryBuckets::from_samples(&noise, strategy),
                        humidity: HistoryBuckets::from_samples(&humidity, strategy),
                        battery: HistoryBuckets::empty(),
                    }),
                );
            }
            Err(err) => {
                warn!(location = %id, error = %err, "failed to fetch history");
                ctx.metrics.inc_fetch_failure(id.as_str());
                aggregated.insert(id, None);
            }
        }
    }

    ctx.state
        .replace_snapshot(|prev| {
            let mut next = prev.clone();
            for (id, buckets) in aggregated {
                let Some(prev_location) = prev.locations.get(&id) else {
                    continue;
                };
                let next_location = match buckets {
                    Some(history) => prev_location.with_history(history),
                    None => {
                        prev_location.with_error("history unavailable; kept last aggregation")
                    }
                };
                next.locations.insert(id, next_location);
            }
            next.generated_at = Some(Utc::now());
            next
        })
        .await;

    Ok(())
}

fn samples(readings: &[HistoryReading], value: impl Fn(&HistoryReading) -> f64) -> Vec<MetricSample> {
    readings
        .iter()
        .map(|r| MetricSample {
            recorded_at: r.recorded_at,
            value: value(r),
        })
        .collect()
}
