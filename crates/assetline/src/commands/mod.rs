//! Subcommands and the setup they share.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use assetline_pipeline::{RunReport, TaskOutcome, TaskSet};
use assetline_steps::StepRegistry;

use crate::config::ConfigFile;

pub mod build;
pub mod dev;

/// A validated project ready to run.
pub struct Project {
    pub root: PathBuf,
    pub config: ConfigFile,
    pub tasks: TaskSet,
}

impl Project {
    /// Load configuration and build tasks. Configuration errors are fatal;
    /// missing source directories only warn.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = ConfigFile::load(config_path)?;

        let root = match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("Project directory not found: {}", root.display()))?;

        let registry = StepRegistry::with_defaults(&config.step_options())
            .context("Invalid step options")?;
        let tasks = TaskSet::new(&root, &config.paths, &registry, &config.steps)
            .context("Invalid configuration")?;

        for (category, dir) in config.paths.missing_sources(&root) {
            tracing::warn!(
                "Source directory for {} does not exist: {}",
                category,
                dir.display()
            );
        }

        Ok(Self {
            root,
            config,
            tasks,
        })
    }
}

/// Log one line per failed task and a closing summary.
pub fn summarize(report: &RunReport) {
    for outcome in report.outcomes() {
        if let TaskOutcome::Failed { task, error } = outcome {
            tracing::warn!("Task '{}' failed: {}", task, error);
        }
    }

    let written: usize = report
        .outcomes()
        .map(|o| match o {
            TaskOutcome::Completed { written, .. } => written.len(),
            TaskOutcome::Failed { .. } => 0,
        })
        .sum();

    tracing::info!(
        "Finished '{}' in {}ms: {} files written, {} failed tasks",
        report.composition,
        report.duration_ms,
        written,
        report.failures()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn project_root_is_config_directory() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src/styles")).unwrap();

        let project = Project::load(&temp.path().join("assetline.toml")).unwrap();

        assert_eq!(project.root, temp.path().canonicalize().unwrap());
        assert_eq!(
            project.tasks.styles.dest(),
            project.root.join("dist/css")
        );
    }

    #[test]
    fn overlapping_destinations_abort_startup() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("assetline.toml");
        fs::write(
            &path,
            "[paths.scripts]\ndest = \"dist/css\"\n",
        )
        .unwrap();

        let err = Project::load(&path).err().unwrap();

        assert!(format!("{:#}", err).contains("Invalid configuration"));
    }

    #[test]
    fn unknown_step_aborts_startup() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("assetline.toml");
        fs::write(&path, "[steps]\nstyles = \"less\"\n").unwrap();

        assert!(Project::load(&path).is_err());
    }

    #[test]
    fn invalid_browserslist_aborts_startup() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("assetline.toml");
        fs::write(
            &path,
            "[styles]\nbrowsers = [\"definitely-not-a-browser 99\"]\n",
        )
        .unwrap();

        let err = Project::load(&path).err().unwrap();

        assert!(format!("{:#}", err).contains("Invalid step options"));
    }
}
