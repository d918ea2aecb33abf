//! Pipeline Driver
//!
//! Polls every source, keeps their checkpoints and hands the artifacts to
//! every operator:
//! - Sources run concurrently, one task each, every poll
//! - A checkpoint is only replaced when its source succeeds
//! - Each operator sees the merged artifacts in emission order
//! - Operators run concurrently with each other

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use ingest_core::Artifact;
use ingest_operators::{DispatchStats, Operator};
use ingest_sources::Source;

use crate::state::CheckpointStore;

/// Default polling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Summary of one poll across all sources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub sources_polled: usize,
    pub sources_failed: usize,
    pub artifacts: usize,
    pub dispatch: DispatchStats,
}

/// The ingestion pipeline
pub struct Pipeline {
    sources: Vec<Box<dyn Source>>,
    operators: Vec<Box<dyn Operator>>,
    store: Box<dyn CheckpointStore>,
    interval: Duration,
}

impl Pipeline {
    pub fn new(store: Box<dyn CheckpointStore>) -> Self {
        Self {
            sources: Vec::new(),
            operators: Vec::new(),
            store,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn add_source(&mut self, source: Box<dyn Source>) {
        info!("Registered {} source {}", source.kind(), source.name());
        self.sources.push(source);
    }

    pub fn add_operator(&mut self, operator: Box<dyn Operator>) {
        info!("Registered {} operator {}", operator.kind(), operator.name());
        self.operators.push(operator);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    /// Poll every source once and dispatch what they found
    pub async fn run_once(&mut self) -> RunReport {
        let mut report = RunReport {
            sources_polled: self.sources.len(),
            ..Default::default()
        };

        let polls = join_all(self.sources.iter().map(|source| {
            let saved_state = self.store.get(source.name());
            async move {
                debug!("Polling {} with checkpoint {:?}", source.name(), saved_state);
                (source.name().to_string(), source.run(saved_state).await)
            }
        }))
        .await;

        let mut batch: Vec<Artifact> = Vec::new();
        for (name, result) in polls {
            match result {
                Ok(output) => {
                    debug!("Source {} returned {} artifacts", name, output.artifacts.len());
                    if let Err(e) = self.store.set(&name, output.checkpoint) {
                        error!("Failed to save checkpoint for {}: {}", name, e);
                    }
                    batch.extend(output.artifacts);
                }
                Err(e) => {
                    warn!("Source {} failed, keeping previous checkpoint: {}", name, e);
                    report.sources_failed += 1;
                }
            }
        }

        report.artifacts = batch.len();
        report.dispatch = self.dispatch(&batch).await;
        report
    }

    async fn dispatch(&self, batch: &[Artifact]) -> DispatchStats {
        if batch.is_empty() {
            return DispatchStats::default();
        }

        let results = join_all(self.operators.iter().map(|operator| operator.process(batch))).await;

        results
            .into_iter()
            .fold(DispatchStats::default(), |total, stats| DispatchStats {
                handled: total.handled + stats.handled,
                filtered: total.filtered + stats.filtered,
                failed: total.failed + stats.failed,
            })
    }

    /// Poll on the configured interval until `max_runs` polls have completed
    /// (forever when `None`) or the process is interrupted
    pub async fn run(&mut self, max_runs: Option<u64>) -> Vec<RunReport> {
        self.run_until(max_runs, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Like [`Pipeline::run`], stopping as soon as `shutdown` resolves, even
    /// in the middle of a poll
    pub async fn run_until<F>(&mut self, max_runs: Option<u64>, shutdown: F) -> Vec<RunReport>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.interval);
        let mut reports = Vec::new();
        tokio::pin!(shutdown);

        info!(
            "Pipeline starting with {} sources and {} operators",
            self.sources.len(),
            self.operators.len()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    warn!("Interrupted, stopping pipeline");
                    break;
                }
            }

            let report = tokio::select! {
                report = self.run_once() => report,
                _ = &mut shutdown => {
                    warn!("Interrupted during poll, stopping pipeline");
                    break;
                }
            };

            info!(
                "Poll complete: {} sources ({} failed), {} artifacts, {} handled, {} failed",
                report.sources_polled,
                report.sources_failed,
                report.artifacts,
                report.dispatch.handled,
                report.dispatch.failed
            );
            reports.push(report);

            if max_runs.is_some_and(|max| reports.len() as u64 >= max) {
                break;
            }
        }

        reports
    }
}
