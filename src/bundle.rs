//! On-disk bundles: a directory holding one module per `.js` file.
//!
//! The module id is the file stem, so `42.js` is module 42 and
//! `chunk-abc.js` is module "chunk-abc".

use crate::edit::{atomic_write, EditError};
use crate::modules::ModuleId;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const MODULE_EXTENSION: &str = "js";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("failed to read bundle {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write module {path}: {source}")]
    Write { path: PathBuf, source: EditError },

    #[error("module {path} is not valid UTF-8")]
    NotUtf8 { path: PathBuf },

    #[error("module id '{id}' appears more than once in {dir}")]
    DuplicateId { id: ModuleId, dir: PathBuf },
}

/// A module read from a bundle directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleModule {
    pub id: ModuleId,
    /// File name relative to the bundle directory
    pub file: PathBuf,
    pub source: String,
}

/// Read every module in `dir`, sorted by file name.
pub fn read_bundle(dir: impl AsRef<Path>) -> Result<Vec<BundleModule>, BundleError> {
    let dir = dir.as_ref();
    let mut modules = Vec::new();
    let mut seen = HashSet::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| BundleError::Read {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|s| s.to_str()) != Some(MODULE_EXTENSION)
        {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let bytes = fs::read(path).map_err(|source| BundleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let source = String::from_utf8(bytes).map_err(|_| BundleError::NotUtf8 {
            path: path.to_path_buf(),
        })?;

        let id = ModuleId::from(stem);
        if !seen.insert(id.clone()) {
            return Err(BundleError::DuplicateId {
                id,
                dir: dir.to_path_buf(),
            });
        }
        modules.push(BundleModule {
            id,
            file: PathBuf::from(entry.file_name()),
            source,
        });
    }

    tracing::debug!(dir = %dir.display(), modules = modules.len(), "bundle read");
    Ok(modules)
}

/// Atomically write `source` as `module`'s file under `out_dir`.
pub fn write_module(
    out_dir: impl AsRef<Path>,
    module: &BundleModule,
    source: &str,
) -> Result<PathBuf, BundleError> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(|source| BundleError::Read {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let path = out_dir.join(&module.file);
    atomic_write(&path, source.as_bytes()).map_err(|source| BundleError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bundle_sorted_js_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2.js"), "two").unwrap();
        fs::write(dir.path().join("10.js"), "ten").unwrap();
        fs::write(dir.path().join("chunk-a.js"), "named").unwrap();
        fs::write(dir.path().join("README.md"), "skip").unwrap();

        let modules = read_bundle(dir.path()).unwrap();
        let ids: Vec<_> = modules.iter().map(|m| m.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                ModuleId::Numeric(10),
                ModuleId::Numeric(2),
                ModuleId::Named("chunk-a".to_string())
            ]
        );
        assert_eq!(modules[1].source, "two");
    }

    #[test]
    fn test_zero_padded_and_plain_ids_coexist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("007.js"), "padded").unwrap();
        fs::write(dir.path().join("7.js"), "plain").unwrap();

        let modules = read_bundle(dir.path()).unwrap();
        let ids: Vec<_> = modules.iter().map(|m| m.id.clone()).collect();
        assert_eq!(
            ids,
            vec![ModuleId::Named("007".to_string()), ModuleId::Numeric(7)]
        );
    }

    #[test]
    fn test_rejects_non_utf8() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1.js"), [0xff, 0xfe]).unwrap();
        assert!(matches!(
            read_bundle(dir.path()),
            Err(BundleError::NotUtf8 { .. })
        ));
    }

    #[test]
    fn test_write_module_creates_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let module = BundleModule {
            id: ModuleId::Numeric(1),
            file: PathBuf::from("1.js"),
            source: "old".to_string(),
        };
        let out = dir.path().join("out");
        let path = write_module(&out, &module, "new").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "new");
    }
}
