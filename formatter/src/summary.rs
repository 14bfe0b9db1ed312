use common::{BANDWIDTH_BLOCKSIZE_THRESHOLD, BYTES_PER_MB, NS_PER_MS};

use crate::run::{CanonicalRun, CombinedStat};

/// The best value of a run and the latency measured alongside it.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Peak {
    pub value: f64,
    pub latency_ms: f64,
}

impl Peak {
    fn of(value: f64, stat: &CombinedStat) -> Self {
        Self {
            value,
            latency_ms: stat.mean_latency_ns / NS_PER_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThroughputMetric {
    Iops,
    Bandwidth,
}

impl ThroughputMetric {
    /// Large blocks are judged by bandwidth, small ones by operations per second.
    pub fn for_blocksize(blocksize: u64) -> Self {
        if blocksize >= BANDWIDTH_BLOCKSIZE_THRESHOLD {
            Self::Bandwidth
        } else {
            Self::Iops
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Iops => "IOps",
            Self::Bandwidth => "MB/s",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub value: f64,
    pub latency_ms: f64,
    pub metric: ThroughputMetric,
}

impl Throughput {
    /// The headline figure of a run, picked by the run-wide blocksize.
    ///
    /// Bandwidth is reported in MB/s, a run without peaks reads as zero.
    pub fn select(
        blocksize: Option<u64>,
        max_iops: Option<Peak>,
        max_bandwidth: Option<Peak>,
    ) -> Self {
        let metric = blocksize
            .map(ThroughputMetric::for_blocksize)
            .unwrap_or(ThroughputMetric::Iops);
        let peak = match metric {
            ThroughputMetric::Iops => max_iops,
            ThroughputMetric::Bandwidth => max_bandwidth.map(|x| Peak {
                value: x.value / BYTES_PER_MB,
                ..x
            }),
        }
        .unwrap_or_default();

        Self {
            value: peak.value,
            latency_ms: peak.latency_ms,
            metric,
        }
    }
}

/// Run-level maxima over every leaf.
///
/// A maximum only moves when a leaf is strictly greater than the current one,
/// so ties keep the first leaf in key order and runs without any positive
/// value have no peak at all.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub max_iops: Option<Peak>,
    pub max_bandwidth: Option<Peak>,
    pub max_cpu: Option<f64>,
    /// Not measured, always zero
    pub max_memory: f64,
    /// Blocksize of the first leaf
    pub blocksize: Option<u64>,
}

impl RunSummary {
    pub fn from_run(run: &CanonicalRun) -> Self {
        let mut summary = Self::default();
        for (_, blocksize, _, stat) in run.leaves() {
            summary.blocksize.get_or_insert(blocksize);

            if stat.iops > summary.max_iops.map(|x| x.value).unwrap_or_default() {
                summary.max_iops = Some(Peak::of(stat.iops, stat));
            }
            let bandwidth = stat.bandwidth_bytes as f64;
            if bandwidth > summary.max_bandwidth.map(|x| x.value).unwrap_or_default() {
                summary.max_bandwidth = Some(Peak::of(bandwidth, stat));
            }
            if stat.resource.cpu_percent > summary.max_cpu.unwrap_or_default() {
                summary.max_cpu = Some(stat.resource.cpu_percent);
            }
        }
        summary
    }

    /// The headline figure of the run, picked by the blocksize of its first leaf.
    pub fn throughput(&self) -> Throughput {
        Throughput::select(self.blocksize, self.max_iops, self.max_bandwidth)
    }
}
