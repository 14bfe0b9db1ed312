use std::{
    collections::{BTreeMap, btree_map::Entry},
    path::PathBuf,
};

use common::{
    bench::{BenchReader, RawIOStat},
    error::{Error, Result},
    event::{Event, EventSink},
    sensor::{ResourceReader, ResourceStat},
    stats::SampleStats,
    util::file_is_precondition,
};
use futures::future::join_all;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tokio::fs::read_to_string;
use tracing::debug;

/// Statistics of every shard that landed on one (operation, blocksize, iodepth).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CombinedStat {
    pub io_bytes: u64,
    pub bandwidth_bytes: u64,
    pub iops: f64,
    pub mean_latency_ns: f64,
    pub stddev_latency_ns: f64,
    pub total_ios: u64,
    /// Figures of the latest shard, telemetry is not pooled
    pub resource: ResourceStat,
    /// Options of the latest shard
    pub global_options: BTreeMap<String, String>,
}

impl CombinedStat {
    fn from_shard(io: RawIOStat, resource: ResourceStat) -> Self {
        Self {
            io_bytes: io.io_bytes,
            bandwidth_bytes: io.bandwidth_bytes,
            iops: io.iops,
            mean_latency_ns: io.mean_latency_ns,
            stddev_latency_ns: io.stddev_latency_ns,
            total_ios: io.total_ios,
            resource,
            global_options: io.global_options,
        }
    }

    pub fn latency(&self) -> SampleStats {
        SampleStats::new(self.mean_latency_ns, self.stddev_latency_ns, self.total_ios)
    }

    /// Adds another shard. Byte totals and rates add up, latency statistics
    /// are pooled over the sample counts of both sides.
    fn absorb(&mut self, io: RawIOStat, resource: ResourceStat) -> Result<()> {
        let latency = SampleStats::pool(&[self.latency(), io.latency()])?;

        self.io_bytes += io.io_bytes;
        self.bandwidth_bytes += io.bandwidth_bytes;
        self.iops += io.iops;
        self.total_ios = latency.count;
        self.mean_latency_ns = latency.mean;
        self.stddev_latency_ns = latency.stddev;
        self.resource = resource;
        self.global_options = io.global_options;
        Ok(())
    }
}

pub type IodepthMap = BTreeMap<u64, CombinedStat>;
pub type BlocksizeMap = BTreeMap<u64, IodepthMap>;

/// `operation -> blocksize -> iodepth -> stats` for one logical test run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CanonicalRun {
    pub operations: BTreeMap<String, BlocksizeMap>,
}

impl CanonicalRun {
    /// Adds one shard to its leaf, pooling with whatever is already there.
    ///
    /// Folding the same shard twice counts it twice.
    pub fn fold(&mut self, io: RawIOStat, resource: ResourceStat) -> Result<()> {
        let leaf = self
            .operations
            .entry(io.operation.clone())
            .or_default()
            .entry(io.blocksize)
            .or_default()
            .entry(io.iodepth);

        match leaf {
            Entry::Occupied(mut entry) => {
                debug!(
                    "We have details for {} {} {} so combining them",
                    io.operation, io.blocksize, io.iodepth
                );
                entry.get_mut().absorb(io, resource)
            }
            Entry::Vacant(entry) => {
                entry.insert(CombinedStat::from_shard(io, resource));
                Ok(())
            }
        }
    }

    pub fn get(&self, operation: &str, blocksize: u64, iodepth: u64) -> Option<&CombinedStat> {
        self.operations.get(operation)?.get(&blocksize)?.get(&iodepth)
    }

    /// Every leaf as `(operation, blocksize, iodepth, stats)`, in key order
    pub fn leaves(&self) -> impl Iterator<Item = (&str, u64, u64, &CombinedStat)> {
        self.operations.iter().flat_map(|(operation, blocksizes)| {
            blocksizes.iter().flat_map(move |(blocksize, iodepths)| {
                iodepths
                    .iter()
                    .map(move |(iodepth, stat)| (operation.as_str(), *blocksize, *iodepth, stat))
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.leaves().next().is_none()
    }
}

/// One raw result file and its contents.
#[derive(Debug, Clone)]
pub struct Shard {
    pub path: PathBuf,
    pub contents: String,
}

impl Shard {
    /// Reads every file concurrently, keeping the given order.
    ///
    /// Unreadable files are reported and left out.
    pub async fn load_all(files: Vec<PathBuf>, events: &EventSink) -> Vec<Shard> {
        let reads = join_all(files.into_iter().map(|path| async move {
            let contents = read_to_string(&path).await;
            (path, contents)
        }))
        .await;

        reads
            .into_iter()
            .filter_map(|(path, contents)| match contents {
                Ok(contents) => Some(Shard { path, contents }),
                Err(err) => {
                    let err = Error::Io {
                        path: path.clone(),
                        source: err,
                    };
                    events.emit(Event::SkippedFile {
                        path,
                        reason: err.to_string(),
                    });
                    None
                }
            })
            .collect()
    }
}

/// Turns the shards of one logical test run into a [`CanonicalRun`].
#[derive(Debug, Clone)]
pub struct RunAggregator {
    pub bench: Box<dyn BenchReader>,
    pub resource: Box<dyn ResourceReader>,
    pub events: EventSink,
}

impl RunAggregator {
    pub fn new(
        bench: Box<dyn BenchReader>,
        resource: Box<dyn ResourceReader>,
        events: EventSink,
    ) -> Self {
        Self {
            bench,
            resource,
            events,
        }
    }

    /// Reads the shards in parallel and folds them in the given order.
    ///
    /// Empty, precondition and unreadable shards are reported and skipped.
    /// Inconsistent sample accounting fails the whole run.
    pub fn aggregate(&self, identity: &str, shards: Vec<Shard>) -> Result<CanonicalRun> {
        let usable = shards
            .into_iter()
            .filter(|shard| {
                if shard.contents.is_empty() {
                    self.events.emit(Event::EmptyFile {
                        path: shard.path.clone(),
                    });
                    false
                } else if file_is_precondition(&shard.path) {
                    self.events.emit(Event::PreconditionFile {
                        path: shard.path.clone(),
                    });
                    false
                } else {
                    true
                }
            })
            .collect::<Vec<_>>();

        let parsed = usable
            .par_iter()
            .map(|shard| self.read_shard(shard))
            .collect::<Vec<_>>();

        let mut run = CanonicalRun::default();
        for (shard, result) in usable.iter().zip(parsed) {
            match result {
                Ok((io, resource)) => {
                    debug!("Processing file {}", shard.path.display());
                    run.fold(io, resource)?
                }
                Err(err) if err.is_per_file() => self.events.emit(Event::SkippedFile {
                    path: shard.path.clone(),
                    reason: err.to_string(),
                }),
                Err(err) => return Err(err),
            }
        }

        if run.is_empty() {
            self.events.emit(Event::EmptyRun {
                identity: identity.to_owned(),
            });
        }
        Ok(run)
    }

    fn read_shard(&self, shard: &Shard) -> Result<(RawIOStat, ResourceStat)> {
        let io = self.bench.parse(&shard.path, &shard.contents)?;
        let resource = self
            .resource
            .read(&shard.path, &shard.contents, &self.events)?;
        Ok((io, resource))
    }
}
