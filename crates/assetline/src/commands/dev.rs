//! Development command: build, then serve and rebuild on change.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use assetline_pipeline::{Composition, Runner, TerminalError};
use assetline_server::{watch_and_serve, ReloadHub};

use super::{summarize, Project};

/// Run the dev composition. Only returns on a server error or Ctrl-C.
pub async fn run(config_path: &Path) -> Result<()> {
    let project = Project::load(config_path)?;
    let hub = ReloadHub::new();
    let server = project.config.dev_server(&project.root);

    tracing::info!("Starting development build of {}", project.root.display());

    let watch = {
        let root = project.root.clone();
        let tasks = project.tasks.clone();
        let hub = hub.clone();
        async move {
            watch_and_serve(root, tasks, hub, server)
                .await
                .map_err(|e| Box::new(e) as TerminalError)
        }
    };

    let report = Runner::new(Arc::new(hub))
        .run(Composition::dev(&project.tasks, watch))
        .await?;

    summarize(&report);
    Ok(())
}
