//! Script step: transpile each source with oxc and concatenate into one bundle.

use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, CodegenReturn};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_sourcemap::ConcatSourceMapBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use serde::Deserialize;

use crate::output::{file_name, read_to_string, relative_path, with_map_suffix, write_all, Pending};
use crate::sources::to_slash;
use crate::traits::{SourceFile, StepOutput, TransformError, TransformStep};

/// Options for the script step.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    /// Target environment preset (e.g. "es2015", "chrome80")
    pub target: String,

    /// File name of the concatenated bundle
    pub bundle: String,

    /// Write `<bundle>.map` covering every concatenated source
    pub sourcemaps: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            target: "es2015".to_string(),
            bundle: "main.js".to_string(),
            sourcemaps: true,
        }
    }
}

/// Transpiles scripts for the configured target and concatenates them.
pub struct ScriptStep {
    options: ScriptOptions,
    transform: TransformOptions,
}

impl ScriptStep {
    /// Create the step, validating the target preset up front.
    pub fn new(options: ScriptOptions) -> Result<Self, TransformError> {
        let transform = TransformOptions::from_target(&options.target)
            .map_err(|e| TransformError::Config(format!("script target: {}", e)))?;

        Ok(Self { options, transform })
    }

    /// Transpile a single script.
    pub fn transpile(&self, source: &str, path: &Path) -> Result<String, TransformError> {
        Ok(self.generate(source, path, None)?.code)
    }

    /// Transpile, recording a source map under `map_source` when given.
    fn generate(
        &self,
        source: &str,
        path: &Path,
        map_source: Option<PathBuf>,
    ) -> Result<CodegenReturn, TransformError> {
        let parse_error = |messages: Vec<String>| TransformError::Parse {
            path: path.to_path_buf(),
            message: messages.join("; "),
        };

        let allocator = Allocator::default();
        let source_type = SourceType::from_path(path).unwrap_or_default();

        let parsed = Parser::new(&allocator, source, source_type).parse();
        if parsed.panicked || !parsed.errors.is_empty() {
            return Err(parse_error(
                parsed.errors.iter().map(|e| e.to_string()).collect(),
            ));
        }

        let mut program = parsed.program;
        let scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();

        let transformed = Transformer::new(&allocator, path, &self.transform)
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            return Err(parse_error(
                transformed.errors.iter().map(|e| e.to_string()).collect(),
            ));
        }

        Ok(Codegen::new()
            .with_options(CodegenOptions {
                source_map_path: map_source,
                ..CodegenOptions::default()
            })
            .build(&program))
    }
}

impl TransformStep for ScriptStep {
    fn name(&self) -> &'static str {
        "oxc"
    }

    fn apply(&self, sources: &[SourceFile], dest: &Path) -> Result<StepOutput, TransformError> {
        if sources.is_empty() {
            return Ok(StepOutput::default());
        }

        let mut chunks = Vec::with_capacity(sources.len());
        let mut maps = Vec::new();
        let mut line_offset = 0u32;
        for source in sources {
            let code = read_to_string(&source.path)?;
            let map_source = self
                .options
                .sourcemaps
                .then(|| PathBuf::from(to_slash(&relative_path(dest, &source.path))));

            let generated = self.generate(&code, &source.path, map_source)?;
            let chunk = generated.code.trim_end().to_string();

            if let Some(map) = generated.map {
                maps.push((map, line_offset));
            }
            line_offset += chunk.matches('\n').count() as u32 + 1;
            chunks.push(chunk);
        }

        let mut bundle = chunks.join("\n");
        bundle.push('\n');

        let out = dest.join(&self.options.bundle);
        let mut pending = Vec::with_capacity(2);

        if self.options.sourcemaps {
            let map_path = with_map_suffix(&out);
            let parts: Vec<_> = maps.iter().map(|(map, offset)| (map, *offset)).collect();
            let mut map = ConcatSourceMapBuilder::from_sourcemaps(&parts).into_sourcemap();
            map.set_file(&self.options.bundle);

            bundle.push_str(&format!("//# sourceMappingURL={}\n", file_name(&map_path)));
            pending.push(Pending::new(out, bundle));
            pending.push(Pending::new(map_path, map.to_json_string()));
        } else {
            pending.push(Pending::new(out, bundle));
        }

        Ok(StepOutput {
            written: write_all(pending)?,
            skipped: 0,
        })
    }
}
