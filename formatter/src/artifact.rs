use std::{collections::BTreeMap, fs::read_to_string, path::Path};

use common::util::format_float;
use eyre::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    run::{CanonicalRun, CombinedStat},
    summary::{Peak, RunSummary, Throughput},
};

const ZERO: &str = "0";

/// One leaf of the artifact. Every number is written as a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafRecord {
    #[serde(flatten)]
    pub global_options: BTreeMap<String, String>,
    pub io_bytes: String,
    pub bandwidth_bytes: String,
    pub iops: String,
    pub latency: String,
    pub std_deviation: String,
    pub total_ios: String,
    pub source: String,
    pub cpu: String,
    pub memory: String,
}

impl From<&CombinedStat> for LeafRecord {
    fn from(stat: &CombinedStat) -> Self {
        Self {
            global_options: stat.global_options.clone(),
            io_bytes: stat.io_bytes.to_string(),
            bandwidth_bytes: stat.bandwidth_bytes.to_string(),
            iops: format_float(stat.iops),
            latency: format_float(stat.mean_latency_ns),
            std_deviation: format_float(stat.stddev_latency_ns),
            total_ios: stat.total_ios.to_string(),
            source: stat.resource.source.clone(),
            cpu: format!("{:.6}", stat.resource.cpu_percent),
            memory: format!("{:.6}", stat.resource.memory_mb),
        }
    }
}

/// The canonical summary of one test run as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    #[serde(flatten)]
    pub operations: BTreeMap<String, BTreeMap<u64, BTreeMap<u64, LeafRecord>>>,
    pub maximum_iops: String,
    pub latency_at_max_iops: String,
    pub maximum_bandwidth: String,
    pub latency_at_max_bandwidth: String,
    pub maximum_cpu_usage: String,
    pub maximum_memory_usage: String,
}

impl Artifact {
    pub fn new(run: &CanonicalRun, summary: &RunSummary) -> Self {
        let operations = run
            .operations
            .iter()
            .map(|(operation, blocksizes)| {
                let blocksizes = blocksizes
                    .iter()
                    .map(|(blocksize, iodepths)| {
                        let iodepths = iodepths
                            .iter()
                            .map(|(iodepth, stat)| (*iodepth, LeafRecord::from(stat)))
                            .collect();
                        (*blocksize, iodepths)
                    })
                    .collect();
                (operation.clone(), blocksizes)
            })
            .collect();

        let value = |peak: Option<Peak>| peak.map_or(ZERO.to_owned(), |x| format_float(x.value));
        let latency =
            |peak: Option<Peak>| peak.map_or(ZERO.to_owned(), |x| format_float(x.latency_ms));

        Self {
            operations,
            maximum_iops: value(summary.max_iops),
            latency_at_max_iops: latency(summary.max_iops),
            maximum_bandwidth: value(summary.max_bandwidth),
            latency_at_max_bandwidth: latency(summary.max_bandwidth),
            maximum_cpu_usage: summary.max_cpu.map_or(ZERO.to_owned(), format_float),
            // memory telemetry is not summarised yet
            maximum_memory_usage: ZERO.to_owned(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Reads a written artifact as plain JSON.
pub fn read_artifact(path: &Path) -> Result<Map<String, Value>> {
    let contents = read_to_string(path)
        .wrap_err_with(|| format!("Could not read artifact {}", path.display()))?;
    serde_json::from_str(&contents)
        .wrap_err_with(|| format!("Could not parse artifact {}", path.display()))
}

/// A numeric field of an artifact, zero when it is missing or not a number.
fn number(data: &Map<String, Value>, key: &str) -> f64 {
    match data.get(key) {
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        _ => 0.0,
    }
}

/// Smallest blocksize of the first operation in the artifact
fn first_blocksize(data: &Map<String, Value>) -> Option<u64> {
    data.values()
        .filter_map(Value::as_object)
        .find_map(|blocksizes| blocksizes.keys().filter_map(|x| x.parse::<u64>().ok()).min())
}

/// Headline throughput and its latency, e.g. `("1000 IOps", "10.0")`.
pub fn latency_throughput(path: &Path) -> Result<(String, String)> {
    let data = read_artifact(path)?;
    let peak = |value: &str, latency: &str| {
        Some(Peak {
            value: number(&data, value),
            latency_ms: number(&data, latency),
        })
    };
    let throughput = Throughput::select(
        first_blocksize(&data),
        peak("maximum_iops", "latency_at_max_iops"),
        peak("maximum_bandwidth", "latency_at_max_bandwidth"),
    );
    Ok((
        format!("{:.0} {}", throughput.value, throughput.metric.unit()),
        format!("{:.1}", throughput.latency_ms),
    ))
}

/// Peak CPU and memory usage, e.g. `("55.70", "0.00")`.
pub fn resource_details(path: &Path) -> Result<(String, String)> {
    let data = read_artifact(path)?;
    Ok((
        format!("{:.2}", number(&data, "maximum_cpu_usage")),
        format!("{:.2}", number(&data, "maximum_memory_usage")),
    ))
}
