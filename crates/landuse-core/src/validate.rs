//! Pre-flight path and size checks.
//!
//! Nothing here opens a file: checks are limited to path inspection,
//! `exists`/`metadata` and `canonicalize`, so a rejected run fails before any
//! store or temp-file I/O.

use std::path::{Component, Path, PathBuf};

use crate::error::{ConvertError, Result};

/// Largest accepted input file (10 GiB).
pub const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024 * 1024;

pub const INPUT_EXTENSION: &str = "json";

pub const OUTPUT_EXTENSIONS: &[&str] = &["duckdb", "db", "ddb"];

/// Paths that passed every pre-flight check. The only way to start a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPaths {
    input: PathBuf,
    output: PathBuf,
    input_bytes: u64,
}

impl ValidatedPaths {
    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn input_bytes(&self) -> u64 {
        self.input_bytes
    }
}

/// Validate an input/output pair against the default size ceiling.
pub fn validate_paths(input: &Path, output: &Path) -> Result<ValidatedPaths> {
    validate_paths_with_limit(input, output, MAX_INPUT_BYTES)
}

/// Validate with an explicit input size ceiling in bytes.
///
/// Traversal is checked on both paths first, so a `..` anywhere fails before
/// either path is stat'ed.
pub fn validate_paths_with_limit(
    input: &Path,
    output: &Path,
    max_input_bytes: u64,
) -> Result<ValidatedPaths> {
    reject_traversal(input)?;
    reject_traversal(output)?;
    let input_bytes = check_input(input, max_input_bytes)?;
    check_output(output)?;
    Ok(ValidatedPaths {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        input_bytes,
    })
}

/// Fail with `PathTraversal` if `path` has any `..` component.
pub fn reject_traversal(path: &Path) -> Result<()> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConvertError::PathTraversal {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn check_input(path: &Path, max_bytes: u64) -> Result<u64> {
    if !has_extension(path, &[INPUT_EXTENSION]) {
        return Err(ConvertError::InvalidFileType {
            path: path.to_path_buf(),
            expected: format!(".{INPUT_EXTENSION}"),
        });
    }
    let meta = match path.metadata() {
        Ok(meta) if meta.is_file() => meta,
        _ => {
            return Err(ConvertError::InputNotFound {
                path: path.to_path_buf(),
            })
        }
    };
    let size = meta.len();
    if size > max_bytes {
        return Err(ConvertError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_bytes,
        });
    }
    Ok(size)
}

fn check_output(path: &Path) -> Result<()> {
    if !has_extension(path, OUTPUT_EXTENSIONS) {
        let expected = OUTPUT_EXTENSIONS
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ConvertError::InvalidFileType {
            path: path.to_path_buf(),
            expected,
        });
    }
    // A bare file name lives in the working directory, which always exists.
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };
    if !parent.is_dir() {
        return Err(ConvertError::OutputDirMissing {
            path: parent.to_path_buf(),
        });
    }
    Ok(())
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Confirm `file` resolves to a location inside `dir`.
///
/// Both paths are canonicalized, so symlinks and relative segments cannot
/// move a file out of the directory unnoticed. Returns the canonical file path.
pub fn ensure_within(dir: &Path, file: &Path) -> Result<PathBuf> {
    let dir = dir.canonicalize()?;
    let resolved = file.canonicalize()?;
    if !resolved.starts_with(&dir) {
        return Err(ConvertError::PathTraversal { path: resolved });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn accepts_existing_json_and_db_in_existing_dir() {
        let dir = scratch();
        let input = dir.path().join("raw.json");
        fs::write(&input, "{}").unwrap();
        let output = dir.path().join("out.duckdb");
        let paths = validate_paths(&input, &output).unwrap();
        assert_eq!(paths.input_bytes(), 2);
        assert_eq!(paths.output(), output.as_path());
    }

    #[test]
    fn output_with_parent_segment_rejected_before_io() {
        // Neither path exists: traversal must be reported, not a missing file.
        let err = validate_paths(
            Path::new("/nonexistent/raw.json"),
            Path::new("data/../../etc/out.duckdb"),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::PathTraversal { .. }), "{err}");
    }

    #[test]
    fn input_with_parent_segment_rejected() {
        let err = validate_paths(Path::new("../raw.json"), Path::new("out.duckdb")).unwrap_err();
        assert!(matches!(err, ConvertError::PathTraversal { .. }));
    }

    #[test]
    fn wrong_extensions_rejected() {
        let dir = scratch();
        let csv = dir.path().join("raw.csv");
        fs::write(&csv, "a,b").unwrap();
        let err = validate_paths(&csv, &dir.path().join("out.duckdb")).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidFileType { .. }));

        let json = dir.path().join("raw.json");
        fs::write(&json, "{}").unwrap();
        let err = validate_paths(&json, &dir.path().join("out.sqlite")).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidFileType { .. }));
    }

    #[test]
    fn missing_input_and_missing_output_dir() {
        let dir = scratch();
        let err = validate_paths(&dir.path().join("absent.json"), &dir.path().join("o.db"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::InputNotFound { .. }));

        let input = dir.path().join("raw.json");
        fs::write(&input, "{}").unwrap();
        let err = validate_paths(&input, &dir.path().join("nope").join("o.db")).unwrap_err();
        assert!(matches!(err, ConvertError::OutputDirMissing { .. }));
    }

    #[test]
    fn directory_named_like_json_is_not_an_input() {
        let dir = scratch();
        let fake = dir.path().join("folder.json");
        fs::create_dir(&fake).unwrap();
        let err = validate_paths(&fake, &dir.path().join("o.db")).unwrap_err();
        assert!(matches!(err, ConvertError::InputNotFound { .. }));
    }

    #[test]
    fn oversized_input_rejected() {
        let dir = scratch();
        let input = dir.path().join("raw.json");
        fs::write(&input, vec![b' '; 64]).unwrap();
        let err = validate_paths_with_limit(&input, &dir.path().join("o.db"), 63).unwrap_err();
        match err {
            ConvertError::FileTooLarge { size, limit, .. } => {
                assert_eq!(size, 64);
                assert_eq!(limit, 63);
            }
            other => panic!("expected FileTooLarge, got {other}"),
        }
    }

    #[test]
    fn ensure_within_detects_escape() {
        let outer = scratch();
        let inner = outer.path().join("inner");
        fs::create_dir(&inner).unwrap();
        let inside = inner.join("batch.parquet");
        fs::write(&inside, b"x").unwrap();
        let outside = outer.path().join("escaped.parquet");
        fs::write(&outside, b"x").unwrap();

        assert!(ensure_within(&inner, &inside).is_ok());
        let sneaky = inner.join("..").join("escaped.parquet");
        assert!(matches!(
            ensure_within(&inner, &sneaky),
            Err(ConvertError::PathTraversal { .. })
        ));
    }
}
