//! wmibeat-core: query polling and extraction engine
//!
//! Builds provider queries from configuration, runs each query on its own
//! schedule against a [`ManagementProvider`](wmibeat_provider::ManagementProvider),
//! coerces row fields into events and publishes them to a [`Sink`].

pub mod coerce;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod query;
pub mod runner;
pub mod sink;
pub mod state;
mod worker;

pub use coerce::coerce;
pub use config::{FieldSpec, QueryConfig, parse_duration};
pub use error::CoreError;
pub use event::{EVENT_TYPE, Event, FieldSet};
pub use orchestrator::{Engine, Orchestrator, QueryReport, StopHandle};
pub use query::{BuiltQuery, QueryBuilder};
pub use runner::{QueryRunner, TickOutput, execute_tick};
pub use sink::{ChannelSink, ChannelSinkFactory, Sink, SinkError, SinkFactory};
pub use state::{RunnerState, RunnerStats};
