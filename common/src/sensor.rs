use core::fmt::Debug;
use std::path::Path;

use dyn_clone::{DynClone, clone_trait_object};
use serde_json::json;

use crate::{
    error::{Error, Result},
    event::EventSink,
};

/// CPU and memory figures recorded alongside one benchmark file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResourceStat {
    pub source: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

impl ResourceStat {
    /// Zero figures attributed to `source`, used when no telemetry exists
    pub fn empty(source: &str) -> Self {
        Self {
            source: source.to_owned(),
            ..Default::default()
        }
    }
}

/// Reads the resource telemetry belonging to a benchmark output file.
///
/// Telemetry is optional, readers return [`ResourceStat::empty`] rather than
/// an error when there is nothing to read.
#[typetag::serde(tag = "type")]
pub trait ResourceReader: Debug + DynClone + Send + Sync {
    /// Name of the telemetry source, recorded with every leaf
    fn source(&self) -> &'static str;
    /// Reads the telemetry for one benchmark file
    ///
    /// Arguments:
    /// * `benchmark_path` - Path to the benchmark output file
    /// * `benchmark_contents` - Its contents, for tools that embed telemetry
    /// * `events` - Where to report ambiguous telemetry layouts
    fn read(
        &self,
        benchmark_path: &Path,
        benchmark_contents: &str,
        events: &EventSink,
    ) -> Result<ResourceStat>;
}
clone_trait_object!(ResourceReader);

pub fn resource_reader_by_name(name: &str) -> Result<Box<dyn ResourceReader>> {
    serde_json::from_value(json!({ "type": name }))
        .map_err(|_| Error::UnknownReader(name.to_owned()))
}
