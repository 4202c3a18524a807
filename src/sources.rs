//! Input collection for the CLI: expand files and directories into an ordered
//! list of files to submit.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::FileFormat;

/// One file to submit, keyed by the name the registry will see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Base name for explicit files; path relative to the walked root otherwise.
    pub filename: String,
    pub path: PathBuf,
}

impl InputFile {
    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

/// `**/*.<ext>` for every supported format.
pub fn default_include_globs() -> Vec<String> {
    FileFormat::ALL
        .iter()
        .map(|f| format!("**/*.{}", f.extension()))
        .collect()
}

/// Expand `paths` in argument order.
///
/// Explicit files are always included, whatever their extension, so an
/// unsupported file still gets a record. Directories are walked and filtered
/// by `include` (case-insensitive); results within one directory are sorted.
pub fn collect_inputs(paths: &[PathBuf], include: &[String]) -> Result<Vec<InputFile>> {
    let patterns = if include.is_empty() {
        default_include_globs()
    } else {
        include.to_vec()
    };
    let include_set = build_globset(&patterns)?;
    let exclude_set = build_globset(&[
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ])?;

    let mut inputs = Vec::new();
    for path in paths {
        if path.is_file() {
            inputs.push(InputFile {
                filename: base_name(path),
                path: path.clone(),
            });
        } else if path.is_dir() {
            inputs.extend(walk_dir(path, &include_set, &exclude_set)?);
        } else {
            bail!("Input path does not exist: {}", path.display());
        }
    }
    Ok(inputs)
}

fn walk_dir(root: &Path, include: &GlobSet, exclude: &GlobSet) -> Result<Vec<InputFile>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude.is_match(&rel_str) || !include.is_match(&rel_str) {
            continue;
        }
        found.push(InputFile {
            filename: rel_str,
            path: path.to_path_buf(),
        });
    }

    // Sort for deterministic ordering
    found.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(found)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid include glob: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walks_directories_with_default_filter_sorted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.pdf");
        touch(tmp.path(), "a/talk.MP4");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), ".git/objects/x.pdf");

        let inputs = collect_inputs(&[tmp.path().to_path_buf()], &[]).unwrap();
        let names: Vec<_> = inputs.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["a/talk.MP4", "b.pdf"]);
    }

    #[test]
    fn explicit_files_bypass_the_filter() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "legacy.ppt");
        let path = tmp.path().join("legacy.ppt");
        let inputs = collect_inputs(&[path.clone()], &[]).unwrap();
        assert_eq!(
            inputs,
            vec![InputFile {
                filename: "legacy.ppt".into(),
                path
            }]
        );
    }

    #[test]
    fn custom_include_narrows_the_walk() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.pdf");
        touch(tmp.path(), "b.docx");
        let inputs =
            collect_inputs(&[tmp.path().to_path_buf()], &["**/*.docx".to_string()]).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].filename, "b.docx");
    }

    #[test]
    fn missing_path_is_an_error() {
        let err = collect_inputs(&[PathBuf::from("/nonexistent/doc-intake-input")], &[]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
