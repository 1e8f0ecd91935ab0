//! Registry of named transform steps.
//!
//! Steps are constructed once at startup and looked up by name when tasks
//! are assembled, so a bad option (an unknown browser query, an unsupported
//! script target) fails before anything runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::images::{ImageOptions, ImageStep};
use crate::markup::CopyStep;
use crate::scripts::{ScriptOptions, ScriptStep};
use crate::styles::{StyleOptions, StyleStep};
use crate::traits::{TransformError, TransformStep};

/// Options for every built-in step.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    pub styles: StyleOptions,
    pub scripts: ScriptOptions,
    pub images: ImageOptions,
}

/// A registry of transform steps keyed by name.
#[derive(Default)]
pub struct StepRegistry {
    steps: BTreeMap<&'static str, Arc<dyn TransformStep>>,
}

impl StepRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in steps.
    pub fn with_defaults(options: &StepOptions) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(StyleStep::new(options.styles.clone())?));
        registry.register(Arc::new(ScriptStep::new(options.scripts.clone())?));
        registry.register(Arc::new(ImageStep::new(options.images.clone())));
        registry.register(Arc::new(CopyStep));
        Ok(registry)
    }

    /// Add a step, replacing any step registered under the same name.
    pub fn register(&mut self, step: Arc<dyn TransformStep>) {
        self.steps.insert(step.name(), step);
    }

    /// Look up a step by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn TransformStep>, RegistryError> {
        self.steps
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::StepNotFound {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// Check if a step exists.
    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Get all registered step names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.keys().copied().collect()
    }
}

/// Errors that can occur with the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown transform step '{name}' (known: {known})")]
    StepNotFound { name: String, known: String },

    #[error(transparent)]
    Step(#[from] TransformError),
}
