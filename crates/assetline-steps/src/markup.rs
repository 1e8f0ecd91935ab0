//! Markup step: copies HTML files unchanged.

use std::path::Path;

use crate::output::{read, write_all, Pending};
use crate::traits::{SourceFile, StepOutput, TransformError, TransformStep};

/// Copies sources verbatim into the destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyStep;

impl TransformStep for CopyStep {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn apply(&self, sources: &[SourceFile], dest: &Path) -> Result<StepOutput, TransformError> {
        let pending = sources
            .iter()
            .map(|s| Ok(Pending::new(dest.join(&s.relative), read(&s.path)?)))
            .collect::<Result<Vec<_>, TransformError>>()?;

        Ok(StepOutput {
            written: write_all(pending)?,
            skipped: 0,
        })
    }
}
