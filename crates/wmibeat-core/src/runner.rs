//! `QueryRunner`: per-query polling loop
//!
//! Each runner owns one query's schedule. Ticks never overlap: the next tick
//! is only awaited once the previous one has been emitted, and missed ticks
//! are not caught up.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use wmibeat_provider::{ManagementProvider, ManagementSession};

use crate::coerce::coerce;
use crate::config::QueryConfig;
use crate::error::CoreError;
use crate::event::{Event, FieldSet};
use crate::query::{BuiltQuery, QueryBuilder};
use crate::sink::Sink;
use crate::state::{RunnerState, RunnerStats};
use crate::worker::ProviderWorker;

/// Rows extracted by one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutput {
    /// Field sets in provider enumeration order
    pub rows: Vec<FieldSet>,
    /// Fields that were left out because they could not be read or coerced
    pub skipped_fields: u64,
}

/// Execute one query against the provider and extract every row
///
/// Connect, execute and enumeration failures abort the tick. A field that
/// cannot be read or coerced is left out of its row and extraction continues.
/// Every provider handle is released before this returns.
///
/// # Errors
/// Returns [`CoreError::Connection`] or [`CoreError::Execution`] for
/// tick-aborting failures.
#[instrument(skip_all, fields(class = %config.class))]
pub fn execute_tick(
    provider: &dyn ManagementProvider,
    config: &QueryConfig,
    query: &BuiltQuery,
) -> Result<TickOutput, CoreError> {
    let session = ManagementSession::open(provider, &config.namespace)?;
    debug!(query = %query, "executing query");
    let result = session.execute(query.as_str())?;

    let mut output = TickOutput::default();
    for row in result.rows()? {
        let row = row?;
        let mut fields = FieldSet::new();

        for spec in &config.fields {
            let value = row
                .get(&spec.name)
                .map_err(CoreError::from)
                .and_then(|raw| coerce(spec, raw));

            match value {
                Ok(value) => {
                    fields.insert(spec.name.clone(), value);
                }
                Err(e) => {
                    warn!(
                        class = %config.class,
                        field = %spec.name,
                        stage = e.stage(),
                        error = %e,
                        "field skipped"
                    );
                    output.skipped_fields += 1;
                }
            }
        }

        output.rows.push(fields);
    }

    Ok(output)
}

/// Polls one configured query until cancelled
pub struct QueryRunner {
    config: Arc<QueryConfig>,
    query: BuiltQuery,
    provider: Arc<dyn ManagementProvider>,
    state: RunnerState,
    stats: RunnerStats,
}

impl QueryRunner {
    /// Validate the configuration and build the query
    ///
    /// # Errors
    /// Returns [`CoreError::Configuration`] if no fields are configured or the
    /// period is zero.
    pub fn new(
        config: QueryConfig,
        provider: Arc<dyn ManagementProvider>,
    ) -> Result<Self, CoreError> {
        if config.period.is_zero() {
            return Err(CoreError::Configuration {
                class: config.class,
                message: "period must be positive".to_string(),
            });
        }
        let query = QueryBuilder::from_config(&config)?;

        Ok(Self {
            config: Arc::new(config),
            query,
            provider,
            state: RunnerState::Idle,
            stats: RunnerStats::default(),
        })
    }

    /// Query configuration
    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Built query string
    #[must_use]
    pub fn query(&self) -> &BuiltQuery {
        &self.query
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.state
    }

    fn transition_to(&mut self, next: RunnerState) {
        if !self.state.can_transition_to(next) {
            warn!(class = %self.config.class, from = %self.state, to = %next, "invalid state transition");
            return;
        }
        debug!(class = %self.config.class, from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    /// Poll until `cancel` fires, publishing every extracted row to `sink`
    ///
    /// The first tick fires one period after start. Cancellation wins over a
    /// ready tick, but an in-flight tick is always finished first.
    pub async fn run(mut self, sink: Arc<dyn Sink>, cancel: CancellationToken) -> RunnerStats {
        let worker = match ProviderWorker::spawn(
            Arc::clone(&self.provider),
            Arc::clone(&self.config),
            self.query.clone(),
        ) {
            Ok(worker) => worker,
            Err(e) => {
                error!(class = %self.config.class, error = %e, "query not started");
                self.stats.last_error = Some(e.to_string());
                self.transition_to(RunnerState::Stopped);
                return self.stats;
            }
        };

        let period = self.config.period;
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(class = %self.config.class, period = ?period, "query started");
        self.transition_to(RunnerState::Ticking);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            self.tick(&worker, sink.as_ref()).await;
        }

        worker.shutdown().await;
        self.transition_to(RunnerState::Stopped);
        info!(
            class = %self.config.class,
            ticks = self.stats.ticks,
            events = self.stats.events,
            "query stopped"
        );

        self.stats
    }

    async fn tick(&mut self, worker: &ProviderWorker, sink: &dyn Sink) {
        self.transition_to(RunnerState::Executing);
        self.stats.ticks += 1;

        match worker.run_tick().await {
            Ok(output) => {
                self.transition_to(RunnerState::Emitting);
                self.stats.skipped_fields += output.skipped_fields;
                self.emit(sink, output);
                self.stats.last_success = Some(Utc::now());
            }
            Err(e) => {
                error!(
                    class = %self.config.class,
                    stage = e.stage(),
                    error = %e,
                    "unable to run WMI query"
                );
                self.stats.failed_ticks += 1;
                self.stats.last_error = Some(e.to_string());
            }
        }

        self.transition_to(RunnerState::Ticking);
    }

    fn emit(&mut self, sink: &dyn Sink, output: TickOutput) {
        let count = output.rows.len();
        for fields in output.rows {
            sink.publish(Event::new(self.config.class.as_str(), fields, Utc::now()));
        }
        self.stats.events += count as u64;
        debug!(class = %self.config.class, events = count, "events published");
    }
}
