//! Run directory versioning
//!
//! Every training run gets its own directory. A name that is already taken is
//! suffixed with the next free number (`exp`, `exp2`, `exp3`, ...), so earlier
//! runs are never overwritten.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::utils::error::{LabError, Result};

/// Root of a run: `./lab/{my_name}/{model_dir}/{name}`
///
/// An absolute `model_dir` replaces the `./lab/{my_name}` prefix, the same
/// way `Path::join` does.
pub fn run_root(my_name: &str, model_dir: &Path, name: &str) -> PathBuf {
    Path::new("./lab").join(my_name).join(model_dir).join(name)
}

/// Create and return a fresh directory for `path`
///
/// If `path` does not exist it is created as-is. Otherwise the parent is
/// scanned for siblings named `{stem}{N}` and `{path}{max(N) + 1}` is
/// created, or `{path}2` when no numbered sibling exists yet.
pub fn increment_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();

    if !path.exists() {
        std::fs::create_dir_all(path)?;
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LabError::Config(format!("Invalid run path: {}", path.display())))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let next = next_index(&parent, stem)?;
    let candidate = parent.join(format!("{}{}", stem, next));
    std::fs::create_dir_all(&candidate)?;

    tracing::debug!("Run directory {} taken, using {}", path.display(), candidate.display());
    Ok(candidate)
}

fn next_index(parent: &Path, stem: &str) -> Result<u64> {
    let pattern = Regex::new(&format!(r"^{}(\d+)$", regex::escape(stem)))
        .map_err(|e| LabError::Config(format!("Invalid run name pattern: {}", e)))?;

    let mut max_index: Option<u64> = None;
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if let Some(n) = pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        {
            max_index = Some(max_index.map_or(n, |m| m.max(n)));
        }
    }

    Ok(max_index.map_or(2, |n| n + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fresh_path_is_used_directly() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("exp");

        let created = increment_path(&run).unwrap();
        assert_eq!(created, run);
        assert!(created.is_dir());
    }

    #[test]
    fn test_existing_path_gets_suffix_two() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("exp");
        std::fs::create_dir_all(&run).unwrap();

        let created = increment_path(&run).unwrap();
        assert_eq!(created, dir.path().join("exp2"));
    }

    #[test]
    fn test_suffix_follows_highest_sibling() {
        let dir = tempdir().unwrap();
        for name in ["exp", "exp2", "exp7", "expert", "exp_old3"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }

        let created = increment_path(dir.path().join("exp")).unwrap();
        assert_eq!(created, dir.path().join("exp8"));
    }

    #[test]
    fn test_repeated_calls_never_collide() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run");

        let a = increment_path(&run).unwrap();
        let b = increment_path(&run).unwrap();
        let c = increment_path(&run).unwrap();
        assert_eq!(a, run);
        assert_eq!(b, dir.path().join("run2"));
        assert_eq!(c, dir.path().join("run3"));
    }

    #[test]
    fn test_run_root_layout() {
        let root = run_root("alice", Path::new("model"), "exp");
        assert_eq!(root, PathBuf::from("./lab/alice/model/exp"));

        let absolute = run_root("alice", Path::new("/opt/ml/model"), "exp");
        assert_eq!(absolute, PathBuf::from("/opt/ml/model/exp"));
    }
}
