//! Path mappings from source patterns to destination directories.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use assetline_steps::sources::{compile, glob_base};
use assetline_steps::RegistryError;

/// Asset category. Each category owns one mapping and one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Markup,
    Styles,
    Scripts,
    Images,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Markup,
        Category::Styles,
        Category::Scripts,
        Category::Images,
    ];

    /// Categories processed together after markup.
    pub const ASSETS: [Category; 3] = [Category::Styles, Category::Scripts, Category::Images];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Markup => "markup",
            Category::Styles => "styles",
            Category::Scripts => "scripts",
            Category::Images => "images",
        }
    }

    fn default_patterns(&self) -> Vec<String> {
        let patterns: &[&str] = match self {
            Category::Markup => &["src/*.html"],
            Category::Styles => &["src/styles/**/*.sass", "src/styles/**/*.scss"],
            Category::Scripts => &["src/scripts/**/*.js"],
            Category::Images => &["src/images/**/*"],
        };
        patterns.iter().map(|p| p.to_string()).collect()
    }

    fn default_dest(&self) -> PathBuf {
        PathBuf::from(match self {
            Category::Markup => "dist",
            Category::Styles => "dist/css",
            Category::Scripts => "dist/js",
            Category::Images => "dist/images",
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one category reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub category: Category,

    /// Glob patterns relative to the project root
    pub patterns: Vec<String>,

    /// Destination directory relative to the project root
    pub dest: PathBuf,
}

impl PathMapping {
    /// Directories that must exist for the patterns to match anything.
    pub fn source_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.patterns.iter().map(|p| glob_base(p)).collect();
        roots.dedup();
        roots
    }
}

/// Raw `[paths.<category>]` table; missing keys fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathSpec {
    pub src: Option<Vec<String>>,
    pub dest: Option<PathBuf>,
}

/// The static path-mapping table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathTable {
    pub markup: PathSpec,
    pub styles: PathSpec,
    pub scripts: PathSpec,
    pub images: PathSpec,
}

impl PathTable {
    fn spec(&self, category: Category) -> &PathSpec {
        match category {
            Category::Markup => &self.markup,
            Category::Styles => &self.styles,
            Category::Scripts => &self.scripts,
            Category::Images => &self.images,
        }
    }

    /// The effective mapping for a category.
    pub fn mapping(&self, category: Category) -> PathMapping {
        let spec = self.spec(category);
        PathMapping {
            category,
            patterns: spec
                .src
                .clone()
                .unwrap_or_else(|| category.default_patterns()),
            dest: spec.dest.clone().unwrap_or_else(|| category.default_dest()),
        }
    }

    /// All four mappings in category order.
    pub fn mappings(&self) -> Vec<PathMapping> {
        Category::ALL.iter().map(|c| self.mapping(*c)).collect()
    }

    /// Check the table for mistakes that would corrupt output.
    ///
    /// Asset destinations must be pairwise disjoint, and the markup
    /// destination may be neither equal to nor inside an asset destination.
    /// Asset destinations nested inside the markup destination are expected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for mapping in self.mappings() {
            if mapping.patterns.is_empty() {
                return Err(ConfigError::NoPatterns(mapping.category));
            }
            compile(&mapping.patterns).map_err(|e| ConfigError::InvalidPattern {
                category: mapping.category,
                message: e.to_string(),
            })?;
        }

        let markup = normalize(&self.mapping(Category::Markup).dest);
        let assets: Vec<(Category, PathBuf)> = Category::ASSETS
            .iter()
            .map(|c| (*c, normalize(&self.mapping(*c).dest)))
            .collect();

        for (a, a_dest) in &assets {
            if markup.starts_with(a_dest) {
                return Err(ConfigError::OverlappingDestinations {
                    first: Category::Markup,
                    second: *a,
                    dest: a_dest.clone(),
                });
            }
        }

        for (i, (a, a_dest)) in assets.iter().enumerate() {
            for (b, b_dest) in &assets[i + 1..] {
                if a_dest.starts_with(b_dest) || b_dest.starts_with(a_dest) {
                    return Err(ConfigError::OverlappingDestinations {
                        first: *a,
                        second: *b,
                        dest: if a_dest.starts_with(b_dest) {
                            b_dest.clone()
                        } else {
                            a_dest.clone()
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Source directories that do not exist below `root`.
    pub fn missing_sources(&self, root: &Path) -> Vec<(Category, PathBuf)> {
        self.mappings()
            .into_iter()
            .flat_map(|m| {
                m.source_roots()
                    .into_iter()
                    .map(move |dir| (m.category, dir))
            })
            .filter(|(_, dir)| !root.join(dir).is_dir())
            .collect()
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Step chosen for each category, by registry name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StepSelection {
    pub markup: String,
    pub styles: String,
    pub scripts: String,
    pub images: String,
}

impl Default for StepSelection {
    fn default() -> Self {
        Self {
            markup: "copy".to_string(),
            styles: "sass".to_string(),
            scripts: "oxc".to_string(),
            images: "imagemin".to_string(),
        }
    }
}

impl StepSelection {
    pub fn get(&self, category: Category) -> &str {
        match category {
            Category::Markup => &self.markup,
            Category::Styles => &self.styles,
            Category::Scripts => &self.scripts,
            Category::Images => &self.images,
        }
    }
}

/// Configuration problems detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{first} and {second} write to overlapping destinations under {}", dest.display())]
    OverlappingDestinations {
        first: Category,
        second: Category,
        dest: PathBuf,
    },

    #[error("Invalid source pattern for {category}: {message}")]
    InvalidPattern { category: Category, message: String },

    #[error("No source patterns configured for {0}")]
    NoPatterns(Category),

    #[error(transparent)]
    Step(#[from] RegistryError),
}
