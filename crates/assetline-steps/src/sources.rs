//! Glob pattern resolution.
//!
//! Patterns are relative to a project root and use `/` as separator. A `*`
//! never crosses a directory boundary; use `**` for recursive matches.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::traits::{SourceFile, TransformError};

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// Leading run of literal segments of a pattern.
///
/// `src/styles/**/*.scss` has base `src/styles`. A pattern without any glob
/// characters is a single file, so its base is the parent directory.
pub fn glob_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal = segments
        .iter()
        .take_while(|s| !s.contains(GLOB_CHARS))
        .count();

    let take = if literal == segments.len() {
        literal.saturating_sub(1)
    } else {
        literal
    };

    segments[..take]
        .iter()
        .filter(|s| !s.is_empty() && **s != ".")
        .collect()
}

/// Render a relative path with `/` separators for matching.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            Component::ParentDir => Some(".."),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn glob(pattern: &str) -> Result<Glob, TransformError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| TransformError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn matcher(pattern: &str) -> Result<GlobMatcher, TransformError> {
    Ok(glob(pattern)?.compile_matcher())
}

/// Compile a list of patterns into a single set.
pub fn compile(patterns: &[String]) -> Result<GlobSet, TransformError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(glob(pattern)?);
    }
    builder.build().map_err(|e| TransformError::Pattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

/// Resolve patterns to files below `root`.
///
/// Files come back in discovery order: pattern order first, then directory
/// walk order sorted by file name. A file matched by several patterns is
/// listed once.
pub fn resolve(root: &Path, patterns: &[String]) -> Result<Vec<SourceFile>, TransformError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        let matcher = matcher(pattern)?;
        let base = root.join(glob_base(pattern));

        if !base.is_dir() {
            return Err(TransformError::MissingSource(base));
        }

        for entry in WalkDir::new(&base)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = path.strip_prefix(root).unwrap_or(path);
            if !matcher.is_match(to_slash(rel)) {
                continue;
            }

            if !seen.insert(path.to_path_buf()) {
                continue;
            }

            files.push(SourceFile {
                path: path.to_path_buf(),
                relative: path.strip_prefix(&base).unwrap_or(path).to_path_buf(),
            });
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn computes_glob_base() {
        assert_eq!(glob_base("src/styles/**/*.scss"), PathBuf::from("src/styles"));
        assert_eq!(glob_base("src/*.html"), PathBuf::from("src"));
        assert_eq!(glob_base("src/index.html"), PathBuf::from("src"));
        assert_eq!(glob_base("*.html"), PathBuf::new());
        assert_eq!(glob_base("./dist/**/*.html"), PathBuf::from("dist"));
    }

    #[test]
    fn resolves_in_discovery_order() {
        let temp = tempdir().unwrap();
        let scripts = temp.path().join("src/scripts");
        fs::create_dir_all(scripts.join("nested")).unwrap();
        fs::write(scripts.join("b.js"), "").unwrap();
        fs::write(scripts.join("a.js"), "").unwrap();
        fs::write(scripts.join("nested/c.js"), "").unwrap();
        fs::write(scripts.join("readme.md"), "").unwrap();

        let files = resolve(temp.path(), &["src/scripts/**/*.js".to_string()]).unwrap();
        let relative: Vec<String> = files.iter().map(|f| to_slash(&f.relative)).collect();

        assert_eq!(relative, vec!["a.js", "b.js", "nested/c.js"]);
    }

    #[test]
    fn star_does_not_cross_directories() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("partials")).unwrap();
        fs::write(src.join("index.html"), "").unwrap();
        fs::write(src.join("partials/header.html"), "").unwrap();

        let files = resolve(temp.path(), &["src/*.html".to_string()]).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("index.html"));
    }

    #[test]
    fn deduplicates_across_patterns() {
        let temp = tempdir().unwrap();
        let styles = temp.path().join("src/styles");
        fs::create_dir_all(&styles).unwrap();
        fs::write(styles.join("main.scss"), "").unwrap();

        let patterns = vec![
            "src/styles/**/*.scss".to_string(),
            "src/styles/*.scss".to_string(),
        ];
        let files = resolve(temp.path(), &patterns).unwrap();

        assert_eq!(files.len(), 1);
    }

    #[test]
    fn reports_missing_source_directory() {
        let temp = tempdir().unwrap();
        let err = resolve(temp.path(), &["src/images/**/*".to_string()]).unwrap_err();

        assert!(matches!(err, TransformError::MissingSource(_)));
    }

    #[test]
    fn compiles_pattern_sets() {
        let set = compile(&["src/styles/**/*.scss".to_string()]).unwrap();

        assert!(set.is_match("src/styles/main.scss"));
        assert!(set.is_match("src/styles/deep/theme.scss"));
        assert!(!set.is_match("src/scripts/main.js"));
        assert!(compile(&["src/[".to_string()]).is_err());
    }
}
