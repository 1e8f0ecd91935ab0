//! Stylesheet step: Sass compilation followed by vendor prefixing.

use std::path::Path;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use serde::Deserialize;

use crate::output::{file_name, with_map_suffix, write_all, Pending};
use crate::traits::{SourceFile, StepOutput, TransformError, TransformStep};

/// Options for the stylesheet step.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StyleOptions {
    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,

    /// Minify the emitted CSS
    pub minify: bool,

    /// Write `<name>.css.map` next to each stylesheet
    pub sourcemaps: bool,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            browsers: vec!["> 0.5%".to_string(), "last 3 versions".to_string()],
            minify: false,
            sourcemaps: true,
        }
    }
}

/// A compiled stylesheet and its optional source map.
struct Compiled {
    css: String,
    map: Option<String>,
}

/// Compiles `.scss`/`.sass` sources with grass and prefixes them with lightningcss.
#[derive(Debug)]
pub struct StyleStep {
    options: StyleOptions,
    targets: Targets,
}

impl StyleStep {
    /// Create the step, resolving the browserslist queries up front.
    pub fn new(options: StyleOptions) -> Result<Self, TransformError> {
        let targets = if options.browsers.is_empty() {
            Targets::default()
        } else {
            Browsers::from_browserslist(&options.browsers)
                .map_err(|e| TransformError::Config(format!("browserslist: {}", e)))?
                .map(Targets::from)
                .unwrap_or_default()
        };

        Ok(Self { options, targets })
    }

    fn compile(&self, source: &SourceFile, dest: &Path) -> Result<Compiled, TransformError> {
        let opts = grass::Options::default()
            .style(grass::OutputStyle::Expanded)
            .quiet(true);

        let css = grass::from_path(&source.path, &opts).map_err(|e| TransformError::Parse {
            path: source.path.clone(),
            message: e.to_string(),
        })?;

        // grass has no source maps, so the map resolves to its compiled CSS,
        // embedded under the Sass file's name.
        let map_root = self
            .options
            .sourcemaps
            .then(|| dest.join(&source.relative))
            .and_then(|out| out.parent().map(|p| p.to_string_lossy().into_owned()));

        self.prefix(&css, &source.path, map_root.as_deref())
    }

    /// Add vendor prefixes for the configured browsers.
    fn prefix(&self, css: &str, path: &Path, map_root: Option<&str>) -> Result<Compiled, TransformError> {
        let parse_error = |message: String| TransformError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut source_map = match map_root {
            Some(root) => {
                let mut map = SourceMap::new(root);
                let index = map.add_source(&path.to_string_lossy());
                map.set_source_content(index as usize, css)
                    .map_err(|e| parse_error(e.to_string()))?;
                Some(map)
            }
            None => None,
        };

        let mut stylesheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: path.display().to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| parse_error(e.to_string()))?;

        stylesheet
            .minify(MinifyOptions {
                targets: self.targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| parse_error(e.to_string()))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: self.options.minify,
                targets: self.targets,
                source_map: source_map.as_mut(),
                ..PrinterOptions::default()
            })
            .map_err(|e| parse_error(e.to_string()))?;

        let map = source_map
            .as_mut()
            .map(|m| m.to_json(None))
            .transpose()
            .map_err(|e| parse_error(e.to_string()))?;

        Ok(Compiled {
            css: printed.code,
            map,
        })
    }
}

/// Partials are only ever imported, never emitted.
fn is_partial(source: &SourceFile) -> bool {
    source
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

impl TransformStep for StyleStep {
    fn name(&self) -> &'static str {
        "sass"
    }

    fn apply(&self, sources: &[SourceFile], dest: &Path) -> Result<StepOutput, TransformError> {
        let mut pending = Vec::new();

        for source in sources.iter().filter(|s| !is_partial(s)) {
            let compiled = self.compile(source, dest)?;
            let out = dest.join(source.relative.with_extension("css"));

            match compiled.map {
                Some(map) => {
                    let map_path = with_map_suffix(&out);
                    let css = format!(
                        "{}\n/*# sourceMappingURL={} */\n",
                        compiled.css.trim_end(),
                        file_name(&map_path)
                    );
                    pending.push(Pending::new(out, css));
                    pending.push(Pending::new(map_path, map));
                }
                None => pending.push(Pending::new(out, compiled.css)),
            }
        }

        Ok(StepOutput {
            written: write_all(pending)?,
            skipped: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn source(dir: &Path, name: &str, contents: &str) -> SourceFile {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        SourceFile {
            path,
            relative: PathBuf::from(name),
        }
    }

    #[test]
    fn compiles_scss_to_css() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dist");
        let main = source(
            temp.path(),
            "main.scss",
            "$accent: #336699;\n.button { .label { color: $accent; } }\n",
        );

        let step = StyleStep::new(StyleOptions::default()).unwrap();
        let output = step.apply(&[main], &dest).unwrap();

        assert_eq!(
            output.written,
            vec![dest.join("main.css"), dest.join("main.css.map")]
        );
        let css = fs::read_to_string(dest.join("main.css")).unwrap();
        assert!(css.contains(".button .label"));
        assert!(css.contains("#369") || css.contains("#336699"));
    }

    #[test]
    fn adds_vendor_prefixes() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dist");
        let main = source(temp.path(), "main.scss", ".box { user-select: none; }\n");

        let step = StyleStep::new(StyleOptions {
            browsers: vec!["safari 8".to_string()],
            ..StyleOptions::default()
        })
        .unwrap();
        step.apply(&[main], &dest).unwrap();

        let css = fs::read_to_string(dest.join("main.css")).unwrap();
        assert!(css.contains("-webkit-user-select"));
    }

    #[test]
    fn skips_partials() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dist");
        let partial = source(temp.path(), "_vars.scss", "$x: 1px;\n");

        let step = StyleStep::new(StyleOptions::default()).unwrap();
        let output = step.apply(&[partial], &dest).unwrap();

        assert!(output.written.is_empty());
        assert!(!dest.join("_vars.css").exists());
    }

    #[test]
    fn malformed_input_writes_nothing() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dist");
        let good = source(temp.path(), "a.scss", ".a { color: red; }\n");
        let broken = source(temp.path(), "b.scss", ".b { color: red;\n");

        let step = StyleStep::new(StyleOptions::default()).unwrap();
        let err = step.apply(&[good, broken], &dest).unwrap_err();

        assert!(matches!(err, TransformError::Parse { .. }));
        assert!(!dest.join("a.css").exists());
    }

    #[test]
    fn rejects_invalid_browser_queries() {
        let result = StyleStep::new(StyleOptions {
            browsers: vec!["definitely-not-a-browser 99".to_string()],
            ..StyleOptions::default()
        });

        assert!(matches!(result, Err(TransformError::Config(_))));
    }

    #[test]
    fn writes_source_map_next_to_stylesheet() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dist/css");
        let main = source(temp.path(), "main.scss", ".a { margin: 3px; }\n");

        let step = StyleStep::new(StyleOptions::default()).unwrap();
        step.apply(&[main], &dest).unwrap();

        let css = fs::read_to_string(dest.join("main.css")).unwrap();
        assert!(css.ends_with("/*# sourceMappingURL=main.css.map */\n"));
        let map = fs::read_to_string(dest.join("main.css.map")).unwrap();
        assert!(map.contains(r#""version":3"#));
        assert!(map.contains(r#""sources":["../../main.scss"]"#));
        assert!(map.contains("margin: 3px"));
    }

    #[test]
    fn source_maps_can_be_disabled() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dist");
        let main = source(temp.path(), "main.scss", ".a { margin: 3px; }\n");

        let step = StyleStep::new(StyleOptions {
            sourcemaps: false,
            ..StyleOptions::default()
        })
        .unwrap();
        let output = step.apply(&[main], &dest).unwrap();

        assert_eq!(output.written, vec![dest.join("main.css")]);
        let css = fs::read_to_string(dest.join("main.css")).unwrap();
        assert!(!css.contains("sourceMappingURL"));
    }

    #[test]
    fn output_is_stable_across_runs() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dist");
        let main = source(temp.path(), "main.scss", ".a { .b { margin: 0; } }\n");

        let step = StyleStep::new(StyleOptions::default()).unwrap();
        step.apply(std::slice::from_ref(&main), &dest).unwrap();
        let first = fs::read(dest.join("main.css")).unwrap();
        step.apply(&[main], &dest).unwrap();
        let second = fs::read(dest.join("main.css")).unwrap();

        assert_eq!(first, second);
    }
}
