//! Tasks: a transform step bound to a path mapping, behind an error boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assetline_steps::{sources, StepOutput, StepRegistry, TransformError, TransformStep};

use crate::mapping::{Category, ConfigError, PathMapping, PathTable, StepSelection};

/// Outputs written by one task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUpdate {
    pub task: String,
    pub category: Category,
    pub paths: Vec<PathBuf>,
}

/// Receiver of stream updates.
pub trait UpdateSink: Send + Sync {
    fn stream_update(&self, update: &StreamUpdate);
}

/// Sink that discards updates, used when nothing is listening.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn stream_update(&self, update: &StreamUpdate) {
        tracing::trace!("{}: {} outputs", update.task, update.paths.len());
    }
}

/// Errors raised inside a task run. Never escape [`Task::run`].
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Step panicked: {0}")]
    Panicked(String),
}

/// Result of one task run.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed {
        task: String,
        written: Vec<PathBuf>,
        skipped: usize,
        duration: Duration,
    },
    Failed {
        task: String,
        error: TaskError,
    },
}

impl TaskOutcome {
    pub fn task(&self) -> &str {
        match self {
            TaskOutcome::Completed { task, .. } | TaskOutcome::Failed { task, .. } => task,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}

/// A named, re-runnable unit wrapping one transform step.
pub struct Task {
    name: String,
    root: PathBuf,
    mapping: PathMapping,
    step: Arc<dyn TransformStep>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("step", &self.step.name())
            .field("mapping", &self.mapping)
            .finish()
    }
}

impl Task {
    /// Create a task. Patterns and destination are relative to `root`.
    pub fn new(root: impl Into<PathBuf>, mapping: PathMapping, step: Arc<dyn TransformStep>) -> Self {
        Self {
            name: mapping.category.to_string(),
            root: root.into(),
            mapping,
            step,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.mapping.category
    }

    pub fn mapping(&self) -> &PathMapping {
        &self.mapping
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute destination directory.
    pub fn dest(&self) -> PathBuf {
        self.root.join(&self.mapping.dest)
    }

    /// Run the step. Failures are logged and returned as an outcome; this
    /// never returns early or panics because of the step.
    pub async fn run(&self, sink: &dyn UpdateSink) -> TaskOutcome {
        let start = Instant::now();
        tracing::debug!("Starting '{}' ({})", self.name, self.step.name());

        match self.execute().await {
            Ok(output) => {
                let duration = start.elapsed();
                tracing::info!(
                    "Finished '{}' after {}ms ({} written, {} skipped)",
                    self.name,
                    duration.as_millis(),
                    output.written.len(),
                    output.skipped
                );

                if !output.written.is_empty() {
                    sink.stream_update(&StreamUpdate {
                        task: self.name.clone(),
                        category: self.category(),
                        paths: output.written.clone(),
                    });
                }

                TaskOutcome::Completed {
                    task: self.name.clone(),
                    written: output.written,
                    skipped: output.skipped,
                    duration,
                }
            }
            Err(error) => {
                tracing::error!("'{}' failed: {}", self.name, error);
                TaskOutcome::Failed {
                    task: self.name.clone(),
                    error,
                }
            }
        }
    }

    async fn execute(&self) -> Result<StepOutput, TaskError> {
        let root = self.root.clone();
        let patterns = self.mapping.patterns.clone();
        let dest = self.dest();
        let step = Arc::clone(&self.step);

        tokio::task::spawn_blocking(move || {
            let files = sources::resolve(&root, &patterns)?;
            step.apply(&files, &dest)
        })
        .await
        .map_err(|e| TaskError::Panicked(e.to_string()))?
        .map_err(TaskError::from)
    }
}

/// The four category tasks.
#[derive(Debug, Clone)]
pub struct TaskSet {
    pub markup: Arc<Task>,
    pub styles: Arc<Task>,
    pub scripts: Arc<Task>,
    pub images: Arc<Task>,
}

impl TaskSet {
    /// Build tasks for every category from the path table and step registry.
    pub fn new(
        root: &Path,
        table: &PathTable,
        registry: &StepRegistry,
        steps: &StepSelection,
    ) -> Result<Self, ConfigError> {
        table.validate()?;

        let task = |category: Category| -> Result<Arc<Task>, ConfigError> {
            let step = registry.get(steps.get(category))?;
            Ok(Arc::new(Task::new(root, table.mapping(category), step)))
        };

        Ok(Self {
            markup: task(Category::Markup)?,
            styles: task(Category::Styles)?,
            scripts: task(Category::Scripts)?,
            images: task(Category::Images)?,
        })
    }

    pub fn get(&self, category: Category) -> &Arc<Task> {
        match category {
            Category::Markup => &self.markup,
            Category::Styles => &self.styles,
            Category::Scripts => &self.scripts,
            Category::Images => &self.images,
        }
    }

    /// Asset tasks that run after markup.
    pub fn assets(&self) -> Vec<Arc<Task>> {
        Category::ASSETS
            .iter()
            .map(|c| Arc::clone(self.get(*c)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        Category::ALL.into_iter().map(move |c| self.get(c))
    }
}
