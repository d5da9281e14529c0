pub mod catalogue;
pub mod comparison;
pub mod control;
pub mod differencer;
pub mod orchestrator;
pub mod report;
pub mod runner;

pub use catalogue::{Catalogue, CatalogueError, SuiteMode};
pub use differencer::{DifferenceDataset, DifferenceError, diff};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use report::{CaseReport, SuiteReport, render_human_summary};
pub use runner::{CaseRunner, RunOutcome, RunnerConfig, RunnerError, SimulatorRunner};
