use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use glanceship_core::config::OverlapPolicy;
use glanceship_core::error::{Result, ShipError};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, info, warn};

use crate::points::PointBuilder;
use crate::sink::Sink;
use crate::source::MetricSource;

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub host: String,
    pub ts: DateTime<Utc>,
    pub points: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Written(CycleReport),
    Failed(ShipError),
}

impl CycleOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub overlap: OverlapPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            overlap: OverlapPolicy::Serialize,
        }
    }
}

/// One fetch → build → write pass. Errors are returned, not logged.
pub async fn run_cycle<S, K>(source: &S, builder: &PointBuilder, sink: &K) -> Result<CycleReport>
where
    S: MetricSource,
    K: Sink,
{
    let snapshot = source.fetch_all().await?;
    let ts = Utc::now();
    let points = builder.build(&snapshot, ts)?;
    let report = CycleReport {
        host: builder.host_for(&snapshot).to_string(),
        ts,
        points: points.len(),
    };
    sink.write(points).await?;
    Ok(report)
}

#[derive(Debug, Default)]
struct Counters {
    running: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Drives cycles on a fixed interval.
pub struct Scheduler<S, K> {
    source: Arc<S>,
    sink: Arc<K>,
    builder: Arc<PointBuilder>,
    cfg: SchedulerConfig,
    counters: Arc<Counters>,
}

impl<S: MetricSource, K: Sink> Scheduler<S, K> {
    pub fn new(source: Arc<S>, sink: Arc<K>, builder: PointBuilder, cfg: SchedulerConfig) -> Self {
        Self {
            source,
            sink,
            builder: Arc::new(builder),
            cfg,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Runs one cycle now. Failures are logged and returned as an outcome, never raised.
    pub async fn tick(&self) -> CycleOutcome {
        execute(
            self.source.clone(),
            self.builder.clone(),
            self.sink.clone(),
            self.counters.clone(),
        )
        .await
    }

    /// Starts the timer loop. The first cycle runs immediately.
    ///
    /// Cycles start on multiples of the interval from the first one. Under
    /// `Serialize`, boundaries passed while a cycle was running are dropped and
    /// the next cycle waits for the following boundary.
    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let counters = self.counters.clone();

        let task = tokio::spawn(async move {
            let start = Instant::now();
            let mut ticker = tokio::time::interval_at(start, self.cfg.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight = JoinSet::new();

            info!(
                interval_secs = self.cfg.interval.as_secs_f64(),
                overlap = %self.cfg.overlap,
                "scheduler started"
            );

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => match self.cfg.overlap {
                        OverlapPolicy::Serialize => {
                            self.tick().await;
                            let next = next_boundary(start, self.cfg.interval, Instant::now());
                            ticker.reset_at(next);
                        }
                        OverlapPolicy::AllowOverlap => {
                            in_flight.spawn(execute(
                                self.source.clone(),
                                self.builder.clone(),
                                self.sink.clone(),
                                self.counters.clone(),
                            ));
                        }
                    },
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }

            // Let writes already on the wire finish.
            while in_flight.join_next().await.is_some() {}
            info!("scheduler stopped");
        });

        SchedulerHandle {
            stop: stop_tx,
            task,
            counters,
        }
    }
}

/// First `start + k * period` strictly after `now`.
fn next_boundary(start: Instant, period: Duration, now: Instant) -> Instant {
    let period_ns = period.as_nanos().max(1);
    let elapsed_ns = now.saturating_duration_since(start).as_nanos();
    let ticks = elapsed_ns / period_ns + 1;
    u64::try_from(ticks * period_ns)
        .ok()
        .and_then(|ns| start.checked_add(Duration::from_nanos(ns)))
        .unwrap_or(now + period)
}

async fn execute<S, K>(
    source: Arc<S>,
    builder: Arc<PointBuilder>,
    sink: Arc<K>,
    counters: Arc<Counters>,
) -> CycleOutcome
where
    S: MetricSource,
    K: Sink,
{
    counters.running.fetch_add(1, Ordering::SeqCst);
    let span = tracing::info_span!("cycle");
    let outcome = async {
        match run_cycle(&*source, &builder, &*sink).await {
            Ok(report) => {
                info!(host = %report.host, points = report.points, "cycle written");
                CycleOutcome::Written(report)
            }
            Err(err) => {
                warn!(
                    stage = %err.stage(),
                    category = err.category().unwrap_or("-"),
                    error = %err,
                    "cycle failed"
                );
                CycleOutcome::Failed(err)
            }
        }
    }
    .instrument(span)
    .await;

    if outcome.is_written() {
        counters.completed.fetch_add(1, Ordering::SeqCst);
    } else {
        counters.failed.fetch_add(1, Ordering::SeqCst);
    }
    counters.running.fetch_sub(1, Ordering::SeqCst);
    outcome
}

/// Handle to a spawned scheduler. Dropping it stops the loop as well.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        if self.counters.running.load(Ordering::SeqCst) > 0 {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn cycles_written(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }

    /// Stops ticking and waits for in-flight cycles to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = ?e, "scheduler task ended abnormally");
        }
    }
}
