//! One-shot build command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use assetline_pipeline::{Composition, NullSink, Runner};

use super::{summarize, Project};

/// Run the build composition once.
///
/// Task failures are logged but do not fail the command.
pub async fn run(config_path: &Path) -> Result<()> {
    let project = Project::load(config_path)?;
    tracing::info!("Building {}", project.root.display());

    let report = Runner::new(Arc::new(NullSink))
        .run(Composition::build(&project.tasks))
        .await?;

    summarize(&report);
    Ok(())
}
