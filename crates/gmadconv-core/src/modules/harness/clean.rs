use crate::domain::{LatticeError, LatticeResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// File names produced by a harness run.
pub const GENERATED_FILE_PATTERNS: [&str; 12] = [
    "*.log",
    "*.dat",
    "*.tfs",
    "*.ps",
    "ptc*",
    "*.txt",
    "*.root",
    "*.gmad",
    "*_inrays.madx",
    "*.png",
    "*.pdf",
    "trackone",
];

pub fn generated_file_set() -> LatticeResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in GENERATED_FILE_PATTERNS {
        let glob = Glob::new(pattern).map_err(|source| {
            LatticeError::internal(
                "INTERNAL.HARNESS_GLOB",
                format!("invalid glob pattern '{}': {}", pattern, source),
            )
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| {
        LatticeError::internal(
            "INTERNAL.HARNESS_GLOB",
            format!("failed to build glob set: {}", source),
        )
    })
}

/// Removes generated files directly inside `folder`, returning the removed
/// paths in name order. Subdirectories are left alone.
pub fn clean_generated_files(folder: &Path) -> LatticeResult<Vec<PathBuf>> {
    let matcher = generated_file_set()?;
    let entries = fs::read_dir(folder).map_err(|source| {
        LatticeError::io_system(
            "IO.HARNESS_CLEAN",
            format!("failed to list '{}': {}", folder.display(), source),
        )
    })?;

    let mut targets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| {
            LatticeError::io_system(
                "IO.HARNESS_CLEAN",
                format!("failed to list '{}': {}", folder.display(), source),
            )
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            targets.push(path);
        }
    }
    targets.sort();

    for path in &targets {
        fs::remove_file(path).map_err(|source| {
            LatticeError::io_system(
                "IO.HARNESS_CLEAN",
                format!("failed to remove '{}': {}", path.display(), source),
            )
        })?;
        tracing::debug!(path = %path.display(), "removed generated file");
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::{clean_generated_files, generated_file_set};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn patterns_match_outputs_but_not_inputs() {
        let set = generated_file_set().expect("patterns should compile");
        for name in [
            "madx.log",
            "collimators.dat",
            "fodo.tfs",
            "ptc_track.out",
            "fodo.txt",
            "fodo.gmad",
            "fodo_inrays.madx",
            "trackone",
        ] {
            assert!(set.is_match(name), "{name} should be cleaned");
        }
        for name in ["fodo.madx", "fodo.saveline", "overrides.json"] {
            assert!(!set.is_match(name), "{name} should be kept");
        }
    }

    #[test]
    fn cleaning_removes_only_generated_files() {
        let temp = TempDir::new().expect("tempdir should be created");
        for name in ["fodo.madx", "fodo.gmad", "bdsim.log", "trackone", "fodo.saveline"] {
            fs::write(temp.path().join(name), "x").expect("file should be written");
        }
        fs::create_dir(temp.path().join("plots.pdf")).expect("dir should be created");

        let removed = clean_generated_files(temp.path()).expect("clean should succeed");
        let names: Vec<String> = removed
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, ["bdsim.log", "fodo.gmad", "trackone"]);
        assert!(temp.path().join("fodo.madx").exists());
        assert!(temp.path().join("fodo.saveline").exists());
        assert!(temp.path().join("plots.pdf").is_dir());
    }

    #[test]
    fn missing_folder_is_an_io_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = clean_generated_files(&temp.path().join("missing"))
            .expect_err("missing folder should fail");
        assert_eq!(error.code(), "IO.HARNESS_CLEAN");
    }
}
