//! Dedicated provider thread for one runner
//!
//! Provider interop may be bound to the thread that initialized it, so every
//! provider call of a runner is made from the same OS thread. The async side
//! sends one job per tick and awaits the reply.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;
use tracing::{debug, error};
use wmibeat_provider::ManagementProvider;

use crate::config::QueryConfig;
use crate::error::CoreError;
use crate::query::BuiltQuery;
use crate::runner::{TickOutput, execute_tick};

type Reply = oneshot::Sender<Result<TickOutput, CoreError>>;

pub(crate) struct ProviderWorker {
    jobs: mpsc::Sender<Reply>,
    thread: JoinHandle<()>,
    class: String,
}

impl ProviderWorker {
    /// Start the thread and attach it to the provider
    pub(crate) fn spawn(
        provider: Arc<dyn ManagementProvider>,
        config: Arc<QueryConfig>,
        query: BuiltQuery,
    ) -> Result<Self, CoreError> {
        let (jobs, rx) = mpsc::channel::<Reply>();
        let class = config.class.clone();

        let thread = thread::Builder::new()
            .name(format!("wmibeat-{class}"))
            .spawn(move || worker_loop(provider.as_ref(), &config, &query, &rx))
            .map_err(|e| CoreError::Provider(format!("failed to spawn worker thread: {e}")))?;

        Ok(Self {
            jobs,
            thread,
            class,
        })
    }

    /// Run one tick on the worker thread
    ///
    /// Not cancellable: once sent, the tick runs to completion.
    pub(crate) async fn run_tick(&self) -> Result<TickOutput, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(tx)
            .map_err(|_| CoreError::Provider("worker thread has exited".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Provider("worker thread dropped the tick".to_string()))?
    }

    /// Close the job queue and join the thread
    pub(crate) async fn shutdown(self) {
        let Self {
            jobs,
            thread,
            class,
        } = self;
        drop(jobs);

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => debug!(%class, "worker thread joined"),
            Ok(Err(_)) => error!(%class, "worker thread panicked"),
            Err(e) => error!(%class, error = %e, "failed to join worker thread"),
        }
    }
}

fn worker_loop(
    provider: &dyn ManagementProvider,
    config: &QueryConfig,
    query: &BuiltQuery,
    jobs: &mpsc::Receiver<Reply>,
) {
    let attached = provider.attach_thread();
    if let Err(ref e) = attached {
        error!(class = %config.class, error = %e, "unable to attach worker thread to provider");
    }

    while let Ok(reply) = jobs.recv() {
        let result = match attached {
            Ok(()) => run_guarded(provider, config, query),
            Err(ref e) => Err(CoreError::from(e.clone())),
        };
        // The runner may have gone away; nothing to report to.
        let _ = reply.send(result);
    }

    if attached.is_ok() {
        provider.detach_thread();
    }
}

/// Run one tick, turning a provider panic into a tick-aborting error
///
/// Handles acquired before the panic are released while unwinding.
fn run_guarded(
    provider: &dyn ManagementProvider,
    config: &QueryConfig,
    query: &BuiltQuery,
) -> Result<TickOutput, CoreError> {
    panic::catch_unwind(AssertUnwindSafe(|| execute_tick(provider, config, query))).unwrap_or_else(
        |payload| {
            let message = panic_message(payload.as_ref());
            error!(class = %config.class, %message, "provider panicked during tick");
            Err(CoreError::Provider(format!("provider panicked: {message}")))
        },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
