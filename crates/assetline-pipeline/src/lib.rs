//! Task orchestration for assetline.
//!
//! Binds transform steps to path mappings as tasks, and runs tasks in
//! ordered stages where each stage's tasks execute concurrently.

pub mod graph;
pub mod mapping;
pub mod task;

pub use graph::{Composition, RunError, RunReport, Runner, Stage, StageReport, TerminalError};
pub use mapping::{Category, ConfigError, PathMapping, PathSpec, PathTable, StepSelection};
pub use task::{NullSink, StreamUpdate, Task, TaskError, TaskOutcome, TaskSet, UpdateSink};
