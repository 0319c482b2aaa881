pub mod coercion;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filters;
pub mod kpi;
pub mod pagination;
pub mod query_builder;
pub mod runtime;
pub mod server;
pub mod sql_ast;
pub mod telemetry;

pub use config::ServiceConfig;
pub use engine::{ExecutionId, ExecutionScript, ExecutionState, QueryEngine, ScriptedEngine};
pub use error::{KpiError, Result};
pub use executor::{QueryExecutor, QueryResult};
pub use kpi::{KpiKind, KpiQuery};
pub use pagination::{ClientPage, PageMeta, PageRequest};
pub use query_builder::SqlBuilder;
pub use runtime::KpiRuntime;
pub use server::Server;

#[cfg(feature = "athena")]
pub use engine::AthenaEngine;
