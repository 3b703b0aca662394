//! Round execution: prompt assembly, target resolution and the executor
//! that drives one task shape through its repetitions.

mod adapters;
mod executor;
pub mod messages;

pub use adapters::{ExperimentAdapter, TestRunAdapter};
pub use executor::{resolve_target, Executor, ResolvedTarget, RoundRecord, TaskAdapter};
