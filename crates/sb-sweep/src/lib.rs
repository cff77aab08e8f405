//! sb-sweep: thread-count scaling sweeps against an external simulation engine.
//!
//! A sweep runs one model with one executable at increasing thread counts,
//! turns the engine's phase timings into particle rates, and records the
//! eigenvalue and flux spectrum from the densest run. Results go through the
//! per-pair [`sb_results::SweepCache`].

pub mod energy;
pub mod engine;
pub mod runner;

pub use energy::{ENERGY_MAX_EV, ENERGY_MIN_EV, fine_group_structure};
pub use engine::{
    CommandEngine, EngineError, EngineReport, EngineRequest, PhaseRuntime, RunMode,
    SimulationEngine, read_summary,
};
pub use runner::{ScalingSweepRunner, SweepOutcome, SweepProgress, SweepSettings, SweepTarget};

pub type SweepResult<T> = Result<T, SweepError>;

#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    #[error("Sweep cache error: {0}")]
    Cache(#[from] sb_results::ResultsError),

    #[error("No thread counts to sweep (max_threads = {max_threads})")]
    NoThreadCounts { max_threads: u32 },
}
