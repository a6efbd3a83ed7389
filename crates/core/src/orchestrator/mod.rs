//! Stage orchestration.
//!
//! A [`StageRunner`] drives one edge of the submission state machine per
//! invocation. The same runner handles every stage; [`Stage`] supplies the
//! source and destination statuses and the transfer direction.

mod config;
mod runner;
mod stage;
mod types;

pub use config::StageRunnerConfig;
pub use runner::StageRunner;
pub use stage::{Direction, Stage};
pub use types::{ErrorKind, OrchestratorError, RunOutcome};
