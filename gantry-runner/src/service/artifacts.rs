//! Artifact path resolution
//!
//! Turns the path globs of an artifact declaration into the list of files to
//! upload. Globs are relative to the job working directory and matches outside
//! of it are dropped.

use gantry_core::domain::job::Artifact;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use super::error::ProcessError;

/// Files selected by an artifact declaration, relative to `workdir`, sorted
///
/// Directories expand to every file beneath them. A wildcard glob matching
/// nothing is logged and skipped. A literal path matching nothing is skipped
/// the same way unless `strict` is set, in which case it is an error.
pub fn resolve(
    workdir: &Path,
    artifact: &Artifact,
    strict: bool,
) -> Result<Vec<PathBuf>, ProcessError> {
    let exclude = artifact
        .exclude
        .iter()
        .map(|pattern| compile(pattern))
        .collect::<Result<Vec<_>, _>>()?;

    let mut files = BTreeSet::new();

    for pattern in &artifact.paths {
        let matches = expand(workdir, pattern)?;
        if matches.is_empty() {
            if strict && !is_wildcard(pattern) {
                return Err(ProcessError::MissingArtifact(pattern.clone()));
            }
            warn!(pattern = %pattern, "Artifact path matched no files");
            continue;
        }

        for path in matches {
            if path.is_dir() {
                files.extend(expand(&path, "**/*")?.into_iter().filter(|p| p.is_file()));
            } else if path.is_file() {
                files.insert(path);
            }
        }
    }

    Ok(files
        .into_iter()
        .filter_map(|path| path.strip_prefix(workdir).ok().map(Path::to_path_buf))
        .filter(|relative| !is_excluded(&exclude, relative))
        .collect())
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn compile(pattern: &str) -> Result<Pattern, ProcessError> {
    Pattern::new(pattern).map_err(|source| ProcessError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Existing paths under `base` matching `pattern`
fn expand(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, ProcessError> {
    let full_pattern = format!(
        "{}/{}",
        Pattern::escape(&base.to_string_lossy()),
        pattern.trim_start_matches("./").trim_end_matches('/')
    );

    let paths = glob::glob(&full_pattern).map_err(|source| ProcessError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    Ok(paths
        .filter_map(|entry| entry.ok())
        .filter(|path| is_inside(base, path))
        .collect())
}

fn is_inside(base: &Path, path: &Path) -> bool {
    match path.strip_prefix(base) {
        Ok(relative) => !relative
            .components()
            .any(|component| component == Component::ParentDir),
        Err(_) => false,
    }
}

fn is_excluded(exclude: &[Pattern], relative: &Path) -> bool {
    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    };

    exclude.iter().any(|pattern| {
        pattern.matches_path_with(relative, options)
            || relative
                .ancestors()
                .skip(1)
                .any(|dir| !dir.as_os_str().is_empty() && pattern.matches_path_with(dir, options))
    })
}
