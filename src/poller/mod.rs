use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::app::AppContext;

mod current;
mod history;

pub const CURRENT_LOOP: &str = "current";
pub const HISTORY_LOOP: &str = "history";

/// Which refresh cycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Current,
    History,
}

impl RefreshKind {
    pub fn loop_name(&self) -> &'static str {
        match self {
            RefreshKind::Current => CURRENT_LOOP,
            RefreshKind::History => HISTORY_LOOP,
        }
    }

    pub fn parse(value: &str) -> Option<RefreshKind> {
        match value {
            CURRENT_LOOP => Some(RefreshKind::Current),
            HISTORY_LOOP => Some(RefreshKind::History),
            _ => None,
        }
    }
}

/// Per-kind in-flight guards shared between the timers and the manual
/// refresh endpoint. A tick or trigger that finds its guard taken is
/// skipped, never queued, so cycles of one kind can't overlap.
#[derive(Clone, Default)]
pub struct RefreshGuards {
    current: Arc<Mutex<()>>,
    history: Arc<Mutex<()>>,
}

impl RefreshGuards {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_kind(&self, kind: RefreshKind) -> &Arc<Mutex<()>> {
        match kind {
            RefreshKind::Current => &self.current,
            RefreshKind::History => &self.history,
        }
    }
}

/// Outcome of a refresh trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed,
    /// A cycle of the same kind was already running.
    Busy,
}

/// Handle over the two spawned refresh loops.
///
/// Dropping the coordinator does not stop the loops; call [`stop`] to halt
/// both timers deterministically. No state replacement happens after that.
///
/// [`stop`]: Coordinator::stop
pub struct Coordinator {
    handles: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Spawn both refresh loops. Each loop ticks immediately on startup, so
    /// the first snapshot appears without waiting a full interval.
    pub fn start(ctx: AppContext) -> Self {
        let intervals = ctx.config.sample_intervals.clone();
        let handles = vec![
            spawn_loop(ctx.clone(), RefreshKind::Current, intervals.current),
            spawn_loop(ctx, RefreshKind::History, intervals.history),
        ];
        Self { handles }
    }

    /// Halt both timers. In-flight fetches are abandoned, not awaited.
    pub fn stop(self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn spawn_loop(ctx: AppContext, kind: RefreshKind, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            loop_name = kind.loop_name(),
            interval = ?interval,
            "starting refresh loop"
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match trigger(&ctx, kind).await {
                Ok(TriggerOutcome::Completed) => {}
                Ok(TriggerOutcome::Busy) => {
                    warn!(
                        loop_name = kind.loop_name(),
                        "previous cycle still running; skipping tick"
                    );
                }
                Err(err) => {
                    error!(loop_name = kind.loop_name(), error = ?err, "refresh cycle failed");
                }
            }
        }
    })
}

/// Run one cycle of the given kind unless one is already in flight.
///
/// Shared by the timer loops and the manual refresh endpoint, so both paths
/// go through the same guard and the same health accounting.
pub async fn trigger(ctx: &AppContext, kind: RefreshKind) -> Result<TriggerOutcome> {
    let guard = ctx.guards.for_kind(kind).clone();
    let Ok(_held) = guard.try_lock() else {
        ctx.metrics.inc_skipped(kind.loop_name());
        return Ok(TriggerOutcome::Busy);
    };

    run_cycle(ctx, kind).await?;
    Ok(TriggerOutcome::Completed)
}

async fn run_cycle(ctx: &AppContext, kind: RefreshKind) -> Result<()> {
    let loop_name = kind.loop_name();
    let start = Instant::now();

    let result = match kind {
        RefreshKind::Current => current::run(ctx).await,
        RefreshKind::History => history::run(ctx).await,
    };

    match result {
        Ok(()) => {
            let elapsed = start.elapsed();
            ctx.metrics.observe_duration(loop_name, elapsed);
            ctx.metrics.record_success(loop_name, true);
            ctx.state.record_loop_success(loop_name).await;
            info!(loop_name, elapsed = ?elapsed, "cycle completed");
            Ok(())
        }
        Err(err) => {
            ctx.metrics.record_success(loop_name, false);
            ctx.metrics.inc_error(loop_name);
            ctx.state
                .record_loop_failure(loop_name, err.to_string())
                .await;
            Err(err)
        }
    }
}
