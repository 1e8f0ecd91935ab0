//! Transform steps for the assetline pipeline.
//!
//! Each step turns a set of resolved source files into files under a
//! destination directory: Sass compilation with vendor prefixing, script
//! transpiling and bundling, image optimisation and plain copying.

pub mod images;
pub mod markup;
pub mod output;
pub mod registry;
pub mod scripts;
pub mod sources;
pub mod styles;
pub mod traits;

pub use images::{ImageOptions, ImageStep};
pub use markup::CopyStep;
pub use registry::{RegistryError, StepOptions, StepRegistry};
pub use scripts::{ScriptOptions, ScriptStep};
pub use styles::{StyleOptions, StyleStep};
pub use traits::{SourceFile, StepOutput, TransformError, TransformStep};
