#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory laid out like a project checkout: `data/raw`,
/// `data/processed` and `database` under one root.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.path().join("data").join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.path().join("data").join("processed")
    }

    pub fn database_dir(&self) -> PathBuf {
        self.path().join("database")
    }

    /// Writes `contents` to `name` under the raw directory, creating parents.
    pub fn write_raw(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.raw_dir().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create raw dir");
        }
        fs::write(&path, contents).expect("write raw file");
        path
    }

    /// Writes `count` provider files named `{prefix} NN.csv` sharing `header`,
    /// each with `rows_per_file` rows. Returns the total data row count.
    pub fn write_group(&self, prefix: &str, count: usize, header: &str, rows_per_file: usize) -> usize {
        for file in 0..count {
            let mut contents = format!("{header}\n");
            for row in 0..rows_per_file {
                contents.push_str(&format!("RX{file:02},{row}\n"));
            }
            self.write_raw(&format!("{prefix} {file:02}.csv"), &contents);
        }
        count * rows_per_file
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }
}
