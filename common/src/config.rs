use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{bench::BenchReader, sensor::ResourceReader};

pub const DEFAULT_FILENAME_ROOT: &str = "json_output";
pub const DEFAULT_OUTPUT_DIR: &str = "visualisation";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatterConfig {
    /// Shards are named `<filename_root>.<N>`
    #[serde(default = "default_filename_root")]
    pub filename_root: String,
    /// Where artifacts go, `<archive>/visualisation` when unset
    pub output_directory: Option<PathBuf>,
    /// Regenerate artifacts that already exist
    #[serde(default)]
    pub force_refresh: bool,
    /// Reader for the benchmark output, fio when unset
    pub benchmark: Option<Box<dyn BenchReader>>,
    /// Reader for resource telemetry, fio's own CPU figures when unset
    pub resource: Option<Box<dyn ResourceReader>>,
}

fn default_filename_root() -> String {
    DEFAULT_FILENAME_ROOT.to_owned()
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            filename_root: default_filename_root(),
            output_directory: None,
            force_refresh: false,
            benchmark: None,
            resource: None,
        }
    }
}

impl FormatterConfig {
    pub fn output_directory_for(&self, archive: &Path) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(|| archive.join(DEFAULT_OUTPUT_DIR))
    }
}
