//! Common test utilities

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a temporary directory with a psweep.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("psweep.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Create a test config in a subdirectory
pub fn create_test_config_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("psweep.yml");
    let sub_dir = temp_dir.path().join("subdir");

    fs::write(&config_path, content).unwrap();
    fs::create_dir(&sub_dir).unwrap();

    (temp_dir, config_path, sub_dir)
}

/// Write a file next to the others in a test directory
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// A BehaviorSpace-style fragment with runs numbered from `first_run`
pub fn fragment(first_run: i64, density: u32) -> String {
    let mut text = String::from(
        "\"BehaviorSpace results\"\n\"fire.nlogo\"\n\"[run number]\",\"density\",\"[step]\",\"burned\"\n",
    );
    for run in first_run..first_run + 2 {
        for step in 0..2 {
            let density = density + (run - first_run) as u32;
            text.push_str(&format!(
                "\"{}\",\"{}\",\"{}\",\"{}\"\n",
                run,
                density,
                step,
                step * 10
            ));
        }
    }
    text
}
