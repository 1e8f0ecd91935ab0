//! The `assetline.toml` configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use assetline_pipeline::{PathTable, StepSelection};
use assetline_server::DevServerConfig;
use assetline_steps::{ImageOptions, ScriptOptions, StepOptions, StyleOptions};

/// Configuration file structure. Every section is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathTable,
    #[serde(default)]
    pub steps: StepSelection,
    #[serde(default)]
    pub styles: StyleOptions,
    #[serde(default)]
    pub scripts: ScriptOptions,
    #[serde(default)]
    pub images: ImageOptions,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: default_open(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_open() -> bool {
    true
}

impl ConfigFile {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn step_options(&self) -> StepOptions {
        StepOptions {
            styles: self.styles.clone(),
            scripts: self.scripts.clone(),
            images: self.images.clone(),
        }
    }

    /// Server settings, serving the markup destination below `root`.
    pub fn dev_server(&self, root: &Path) -> DevServerConfig {
        let site: PathBuf = root.join(&self.paths.mapping(assetline_pipeline::Category::Markup).dest);
        DevServerConfig {
            root: site,
            host: self.server.host.clone(),
            port: self.server.port,
            open: self.server.open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_pipeline::Category;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_defaults() {
        let temp = tempdir().unwrap();

        let config = ConfigFile::load(&temp.path().join("assetline.toml")).unwrap();

        assert_eq!(config.steps.get(Category::Styles), "sass");
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.paths.mapping(Category::Scripts).dest,
            PathBuf::from("dist/js")
        );
    }

    #[test]
    fn parses_partial_sections() {
        let config = ConfigFile::parse(
            r#"
            [paths.styles]
            dest = "public/css"

            [steps]
            scripts = "copy"

            [styles]
            minify = true

            [images.mozjpeg]
            quality = 60

            [server]
            port = 8080
            open = false
            "#,
        )
        .unwrap();

        let styles = config.paths.mapping(Category::Styles);
        assert_eq!(styles.dest, PathBuf::from("public/css"));
        assert_eq!(
            styles.patterns,
            vec!["src/styles/**/*.sass", "src/styles/**/*.scss"]
        );
        assert_eq!(config.steps.get(Category::Scripts), "copy");
        assert_eq!(config.steps.get(Category::Styles), "sass");
        assert!(config.styles.minify);
        assert_eq!(config.scripts.bundle, "main.js");
        assert_eq!(config.server.host, "127.0.0.1");

        let server = config.dev_server(Path::new("/site"));
        assert_eq!(server.root, PathBuf::from("/site/dist"));
        assert_eq!(server.port, 8080);
        assert!(!server.open);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("assetline.toml");
        fs::write(&path, "[server\nport = ").unwrap();

        let err = ConfigFile::load(&path).unwrap_err();

        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn unknown_section_is_an_error() {
        assert!(ConfigFile::parse("[plugins]\nfoo = 1\n").is_err());
    }
}
