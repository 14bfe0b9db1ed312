use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use common::{
    bench::BenchReader,
    config::FormatterConfig,
    event::{Event, EventSink},
    sensor::ResourceReader,
    util::is_shard_file_name,
};
use eyre::{Context, Result, bail, eyre};
use fio::Fio;
use fio_cpu::FioCpu;
use futures::future::join_all;
use itertools::Itertools;
use tokio::{fs, task::spawn_blocking};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    artifact::Artifact,
    run::{CanonicalRun, RunAggregator, Shard},
    summary::RunSummary,
};

const RUN_ID_PREFIX: &str = "id-";

/// What happened to one test run.
#[derive(Debug)]
pub struct RunOutcome {
    pub identity: String,
    pub status: Result<RunStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Written(PathBuf),
    /// The artifact already existed and was left alone
    Skipped(PathBuf),
}

/// Logical test run a shard belongs to.
///
/// The nearest directory named `id-...` between the archive root and the
/// file, so shards written by several volumes or jobs of one run share it.
/// Files outside such a directory belong to their parent directory.
pub fn test_run_identity(archive: &Path, path: &Path) -> Option<String> {
    directory_identity(archive, path.parent()?)
}

/// [`test_run_identity`] of the files directly inside `dir`.
fn directory_identity(archive: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(archive).unwrap_or(dir);
    let tagged = relative
        .components()
        .rev()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .find(|s| s.starts_with(RUN_ID_PREFIX));

    tagged
        .or_else(|| dir.file_name().and_then(|x| x.to_str()))
        .map(str::to_owned)
}

/// Shard files found below an archive, and the places that could not be read.
#[derive(Debug, Default)]
pub struct Scan {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Walks an archive and writes one artifact per test run found in it.
#[derive(Debug, Clone)]
pub struct Formatter {
    archive: PathBuf,
    config: FormatterConfig,
    events: EventSink,
}

impl Formatter {
    pub fn new(archive: impl Into<PathBuf>, config: FormatterConfig, events: EventSink) -> Self {
        Self {
            archive: archive.into(),
            config,
            events,
        }
    }

    pub fn output_directory(&self) -> PathBuf {
        self.config.output_directory_for(&self.archive)
    }

    fn aggregator(&self) -> RunAggregator {
        let bench = self
            .config
            .benchmark
            .clone()
            .unwrap_or_else(|| Box::new(Fio::default()) as Box<dyn BenchReader>);
        let resource = self
            .config
            .resource
            .clone()
            .unwrap_or_else(|| Box::new(FioCpu::default()) as Box<dyn ResourceReader>);
        RunAggregator::new(bench, resource, self.events.clone())
    }

    /// Every `<filename_root>.<N>` file below the archive, in file name order.
    pub fn find_result_files(&self) -> Scan {
        let mut scan = Scan::default();
        for entry in WalkDir::new(&self.archive).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(&self.archive).to_owned();
                    warn!("Could not walk {}: {err}", path.display());
                    scan.unreadable.push((path, err.to_string()));
                    continue;
                }
            };
            let is_shard = entry
                .file_name()
                .to_str()
                .is_some_and(|name| is_shard_file_name(name, &self.config.filename_root));
            if entry.file_type().is_file() && is_shard {
                scan.files.push(entry.into_path());
            }
        }
        scan
    }

    /// Shards grouped by [`test_run_identity`], discovery order kept per group.
    pub fn group_by_run(&self, files: Vec<PathBuf>) -> BTreeMap<String, Vec<PathBuf>> {
        files
            .into_iter()
            .filter_map(|file| test_run_identity(&self.archive, &file).map(|id| (id, file)))
            .into_group_map()
            .into_iter()
            .collect()
    }

    /// Converts every test run in the archive.
    ///
    /// Runs are independent, a failed run is reported in its outcome and does
    /// not stop the others.
    pub async fn convert_all(&self) -> Result<Vec<RunOutcome>> {
        if !self.archive.is_dir() {
            bail!("Archive {} is not a directory", self.archive.display());
        }
        let output_directory = self.output_directory();
        fs::create_dir_all(&output_directory)
            .await
            .wrap_err_with(|| format!("Could not create {}", output_directory.display()))?;

        Ok(self.convert_scan(self.find_result_files()).await)
    }

    /// Runs with an unreadable directory fail as a whole, the rest are converted.
    async fn convert_scan(&self, scan: Scan) -> Vec<RunOutcome> {
        let mut unreadable = BTreeMap::<String, Vec<String>>::new();
        for (path, reason) in scan.unreadable {
            let identity = directory_identity(&self.archive, &path)
                .unwrap_or_else(|| path.display().to_string());
            unreadable.entry(identity).or_default().push(reason);
        }

        let mut runs = self.group_by_run(scan.files);
        runs.retain(|identity, _| !unreadable.contains_key(identity));
        info!(
            "Found {} test runs in {}",
            runs.len() + unreadable.len(),
            self.archive.display()
        );

        let mut outcomes = join_all(runs.into_iter().map(|(identity, files)| async move {
            let status = self.convert_run(&identity, files).await;
            self.outcome(identity, status)
        }))
        .await;
        outcomes.extend(unreadable.into_iter().map(|(identity, reasons)| {
            let status = Err(eyre!("Could not read every file: {}", reasons.join(", ")));
            self.outcome(identity, status)
        }));
        outcomes
    }

    fn outcome(&self, identity: String, status: Result<RunStatus>) -> RunOutcome {
        if let Err(err) = &status {
            self.events.emit(Event::RunFailed {
                identity: identity.clone(),
                reason: format!("{err:#}"),
            });
        }
        RunOutcome { identity, status }
    }

    async fn convert_run(&self, identity: &str, files: Vec<PathBuf>) -> Result<RunStatus> {
        let path = self.output_directory().join(format!("{identity}.json"));
        if !self.config.force_refresh && fs::try_exists(&path).await.unwrap_or(false) {
            info!(
                "Output file {} already exists, not regenerating",
                path.display()
            );
            return Ok(RunStatus::Skipped(path));
        }

        debug!("Converting {identity} from {} files", files.len());
        let shards = Shard::load_all(files, &self.events).await;
        let run = self.aggregate(identity, shards).await?;
        let summary = RunSummary::from_run(&run);
        let throughput = summary.throughput();
        info!(
            "{identity}: {:.0} {} at {:.1} ms",
            throughput.value,
            throughput.metric.unit(),
            throughput.latency_ms
        );
        let json = Artifact::new(&run, &summary)
            .to_json()
            .wrap_err("Could not serialise artifact")?;

        fs::write(&path, json)
            .await
            .wrap_err_with(|| format!("Could not write {}", path.display()))?;
        self.events.emit(Event::ArtifactWritten {
            identity: identity.to_owned(),
            path: path.clone(),
        });
        Ok(RunStatus::Written(path))
    }

    /// Parsing is CPU bound, so it runs off the async workers.
    async fn aggregate(&self, identity: &str, shards: Vec<Shard>) -> Result<CanonicalRun> {
        let aggregator = self.aggregator();
        let id = identity.to_owned();
        let run = spawn_blocking(move || aggregator.aggregate(&id, shards))
            .await
            .wrap_err("Aggregation task failed")?
            .wrap_err_with(|| format!("Could not combine the results of {identity}"))?;
        Ok(run)
    }
}
