//! Stage compositions and the runner that executes them.
//!
//! A composition is an ordered list of stages. Every task of a parallel stage
//! is spawned at once and the runner waits for all of them to settle before
//! starting the next stage. A terminal stage is a long-running future (the
//! watch loop) that only ends when it fails or the process stops.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::task::{Task, TaskOutcome, TaskSet, UpdateSink};

/// Error type returned by terminal stages.
pub type TerminalError = Box<dyn std::error::Error + Send + Sync>;

/// Future driving a terminal stage.
pub type TerminalFuture = Pin<Box<dyn Future<Output = Result<(), TerminalError>> + Send>>;

/// One step of a composition.
pub enum Stage {
    /// Tasks started together and awaited jointly
    Parallel { name: String, tasks: Vec<Arc<Task>> },

    /// A stage with no natural completion
    Terminal { name: String, run: TerminalFuture },
}

impl Stage {
    pub fn parallel(name: impl Into<String>, tasks: Vec<Arc<Task>>) -> Self {
        Stage::Parallel {
            name: name.into(),
            tasks,
        }
    }

    pub fn terminal<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Future<Output = Result<(), TerminalError>> + Send + 'static,
    {
        Stage::Terminal {
            name: name.into(),
            run: Box::pin(run),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Stage::Parallel { name, .. } | Stage::Terminal { name, .. } => name,
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Parallel { name, tasks } => f
                .debug_struct("Parallel")
                .field("name", name)
                .field("tasks", &tasks.iter().map(|t| t.name()).collect::<Vec<_>>())
                .finish(),
            Stage::Terminal { name, .. } => {
                f.debug_struct("Terminal").field("name", name).finish()
            }
        }
    }
}

/// An ordered sequence of stages.
#[derive(Debug)]
pub struct Composition {
    name: &'static str,
    stages: Vec<Stage>,
}

impl Composition {
    pub fn new(name: &'static str, stages: Vec<Stage>) -> Self {
        Self { name, stages }
    }

    /// Markup first, then styles, scripts and images in parallel.
    pub fn build(tasks: &TaskSet) -> Self {
        Self::new(
            "build",
            vec![
                Stage::parallel("markup", vec![Arc::clone(&tasks.markup)]),
                Stage::parallel("assets", tasks.assets()),
            ],
        )
    }

    /// The build stages followed by a terminal watch stage.
    pub fn dev<F>(tasks: &TaskSet, watch: F) -> Self
    where
        F: Future<Output = Result<(), TerminalError>> + Send + 'static,
    {
        let mut composition = Self::build(tasks);
        composition.name = "dev";
        composition.stages.push(Stage::terminal("watch", watch));
        composition
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// Outcomes of one parallel stage, in completion order.
#[derive(Debug)]
pub struct StageReport {
    pub name: String,
    pub outcomes: Vec<TaskOutcome>,
}

/// Outcomes of a whole composition run.
#[derive(Debug)]
pub struct RunReport {
    pub composition: &'static str,
    pub stages: Vec<StageReport>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.outcomes().filter(|o| !o.is_success()).count()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.stages.iter().flat_map(|s| s.outcomes.iter())
    }
}

/// Errors that abort a run. Task failures never do.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Stage '{stage}' failed: {source}")]
    Terminal {
        stage: String,
        #[source]
        source: TerminalError,
    },
}

/// Executes compositions stage by stage.
pub struct Runner {
    sink: Arc<dyn UpdateSink>,
}

impl Runner {
    /// Create a runner that reports task writes to `sink`.
    pub fn new(sink: Arc<dyn UpdateSink>) -> Self {
        Self { sink }
    }

    /// Run every stage in order.
    pub async fn run(&self, composition: Composition) -> Result<RunReport, RunError> {
        let start = Instant::now();
        let mut stages = Vec::new();

        for stage in composition.stages {
            match stage {
                Stage::Parallel { name, tasks } => {
                    tracing::info!("Running stage '{}' ({} tasks)", name, tasks.len());
                    let outcomes = self.run_stage(&tasks).await;
                    stages.push(StageReport { name, outcomes });
                }
                Stage::Terminal { name, run } => {
                    tracing::info!("Entering stage '{}'", name);
                    run.await
                        .map_err(|source| RunError::Terminal { stage: name, source })?;
                }
            }
        }

        Ok(RunReport {
            composition: composition.name,
            stages,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Start every task together and wait for all of them to settle.
    async fn run_stage(&self, tasks: &[Arc<Task>]) -> Vec<TaskOutcome> {
        let mut set = JoinSet::new();
        for task in tasks {
            let task = Arc::clone(task);
            let sink = Arc::clone(&self.sink);
            set.spawn(async move { task.run(sink.as_ref()).await });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Task aborted: {}", e),
            }
        }
        outcomes
    }
}
