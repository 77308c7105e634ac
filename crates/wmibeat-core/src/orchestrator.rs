//! `Orchestrator`: starts one task per query and coordinates shutdown
//!
//! The orchestrator owns the provider's process-wide lifecycle: it
//! initializes the provider before any runner starts and tears it down once
//! after every runner has exited.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wmibeat_provider::ManagementProvider;

use crate::config::QueryConfig;
use crate::error::CoreError;
use crate::runner::QueryRunner;
use crate::sink::SinkFactory;
use crate::state::RunnerStats;

/// Starts engines for a provider and a sink factory
pub struct Orchestrator {
    /// Management provider shared by all runners
    provider: Arc<dyn ManagementProvider>,
    /// Source of one sink per query
    sink_factory: Arc<dyn SinkFactory>,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(provider: Arc<dyn ManagementProvider>, sink_factory: Arc<dyn SinkFactory>) -> Self {
        Self {
            provider,
            sink_factory,
        }
    }

    /// Initialize the provider and start one task per valid query
    ///
    /// Queries with an unusable configuration are dropped with a warning.
    /// Sinks for all remaining queries are connected before any task is
    /// spawned, so a sink failure starts nothing.
    ///
    /// # Errors
    /// Returns [`CoreError::Provider`] if the provider cannot be initialized,
    /// or [`CoreError::Sink`] if a query's sink cannot be obtained.
    pub async fn start(&self, configs: Vec<QueryConfig>) -> Result<Engine, CoreError> {
        self.provider.initialize().map_err(CoreError::from)?;
        info!(provider = self.provider.name(), "provider initialized");

        let mut runners = Vec::with_capacity(configs.len());
        for config in configs {
            match QueryRunner::new(config, Arc::clone(&self.provider)) {
                Ok(runner) => runners.push(runner),
                Err(e) => warn!(error = %e, "skipping query"),
            }
        }

        let mut bound = Vec::with_capacity(runners.len());
        for runner in runners {
            match self.sink_factory.connect(runner.config()).await {
                Ok(sink) => bound.push((runner, sink)),
                Err(e) => {
                    let class = runner.config().class.clone();
                    error!(%class, error = %e, "unable to connect sink");
                    self.provider.teardown();
                    return Err(CoreError::Sink {
                        class,
                        message: e.to_string(),
                    });
                }
            }
        }

        if bound.is_empty() {
            warn!("no valid queries configured");
        }

        let stop = StopHandle::new();
        let tasks = bound
            .into_iter()
            .map(|(runner, sink)| {
                let class = runner.config().class.clone();
                let cancel = stop.token.clone();
                let handle = tokio::spawn(runner.run(sink, cancel));
                (class, handle)
            })
            .collect::<Vec<_>>();

        info!(queries = tasks.len(), "wmibeat is running");

        Ok(Engine {
            stop,
            tasks,
            provider: Arc::clone(&self.provider),
            finished: false,
        })
    }
}

/// Idempotent shutdown trigger shared by every runner
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal every runner to stop; later calls are no-ops
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("stopping all queries");
        self.token.cancel();
    }

    /// Check whether stop has been requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Final report of one query
#[derive(Debug, Clone)]
pub struct QueryReport {
    /// Queried class
    pub class: String,
    /// Runner counters, `None` if the task panicked
    pub stats: Option<RunnerStats>,
}

/// A set of running queries
///
/// [`Engine::run`] must be awaited for the provider to be torn down. Dropping
/// an engine that was never run stops its runners but skips the teardown.
#[must_use = "an engine does nothing useful unless it is run"]
pub struct Engine {
    stop: StopHandle,
    tasks: Vec<(String, JoinHandle<RunnerStats>)>,
    provider: Arc<dyn ManagementProvider>,
    finished: bool,
}

impl Engine {
    /// Number of running queries
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.tasks.len()
    }

    /// Handle that can stop the engine from another task
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Signal every runner to stop; idempotent
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for every runner to exit, then tear down the provider
    pub async fn run(mut self) -> Vec<QueryReport> {
        let tasks = std::mem::take(&mut self.tasks);
        let mut reports = Vec::with_capacity(tasks.len());

        for (class, handle) in tasks {
            let stats = match handle.await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    error!(%class, error = %e, "query task failed");
                    None
                }
            };
            reports.push(QueryReport { class, stats });
        }

        self.provider.teardown();
        self.finished = true;
        info!("provider torn down");

        reports
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(
            queries = self.tasks.len(),
            "engine dropped without being run, provider is not torn down"
        );
        self.stop.stop();
    }
}
