//! Shared application service layer for scalebench.
//!
//! Front ends go through this crate to discover runs, query them, execute
//! sweep plans and manage the sweep cache.

pub mod discovery;
pub mod error;
pub mod progress;
pub mod query;
pub mod sweep_service;

pub use discovery::{Catalog, RunDiscovery, scan};
pub use error::{AppError, AppResult};
pub use progress::{PlanProgressEvent, PlanStage};
pub use query::{
    BestRow, ComparisonEntry, IdealSpeedup, NoDataReason, QueryFilter, QueryOutcome, QueryReport,
    QuerySummary, SpeedupSeries, TidyRow, query, rows_to_csv, select_rows,
};
pub use sweep_service::{
    PlanOptions, PlanResponse, clear_cache, execute_plan, execute_plan_with_progress, list_cache,
    load_sweep_config,
};
