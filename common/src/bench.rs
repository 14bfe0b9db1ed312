use core::fmt::Debug;
use std::{collections::BTreeMap, path::Path};

use dyn_clone::{DynClone, clone_trait_object};
use serde_json::json;

use crate::{
    error::{Error, Result},
    stats::SampleStats,
};

/// IO statistics of one benchmark output file, normalised across tools.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawIOStat {
    /// Bytes per request
    pub blocksize: u64,
    /// Canonical operation key, ie. `randread` or `70_30_randrw`
    pub operation: String,
    pub read_percent: Option<String>,
    pub write_percent: Option<String>,
    pub iodepth: u64,
    pub io_bytes: u64,
    pub bandwidth_bytes: u64,
    pub iops: f64,
    pub mean_latency_ns: f64,
    pub stddev_latency_ns: f64,
    /// Number of IOs the latency statistics were taken over
    pub total_ios: u64,
    pub global_options: BTreeMap<String, String>,
}

impl RawIOStat {
    pub fn latency(&self) -> SampleStats {
        SampleStats::new(self.mean_latency_ns, self.stddev_latency_ns, self.total_ios)
    }
}

/// Reads the raw output of one benchmark tool.
///
/// Implementations are registered under their type name, which is the
/// identifier used in configuration files and by [`bench_reader_by_name`].
#[typetag::serde(tag = "type")]
pub trait BenchReader: Debug + DynClone + Send + Sync {
    /// Name of the benchmark tool
    fn name(&self) -> &'static str;
    /// Parses one result file into a single [`RawIOStat`]
    ///
    /// Arguments:
    /// * `path` - Location of the file, some tools encode settings in it
    /// * `contents` - The file contents
    fn parse(&self, path: &Path, contents: &str) -> Result<RawIOStat>;
}
clone_trait_object!(BenchReader);

pub fn bench_reader_by_name(name: &str) -> Result<Box<dyn BenchReader>> {
    serde_json::from_value(json!({ "type": name }))
        .map_err(|_| Error::UnknownReader(name.to_owned()))
}
