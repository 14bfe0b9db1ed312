use std::path::PathBuf;

use flume::Sender;
use tracing::{debug, error, info, warn};

/// Something worth telling the caller about while a scan is running.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Zero byte shard, skipped
    EmptyFile { path: PathBuf },
    /// Shard written during a warm-up phase, skipped
    PreconditionFile { path: PathBuf },
    /// Shard excluded because it could not be read
    SkippedFile { path: PathBuf, reason: String },
    /// More than one telemetry file matched a shard
    MultipleResourceFiles { dir: PathBuf, used: PathBuf },
    /// A run without a single usable shard
    EmptyRun { identity: String },
    RunFailed { identity: String, reason: String },
    ArtifactWritten { identity: String, path: PathBuf },
}

/// Hands [`Event`]s to an optional listener and mirrors them into the log.
///
/// A sink without a listener only logs, so components can always emit.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<Event>>,
}

impl EventSink {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: Event) {
        match &event {
            Event::EmptyFile { path } => {
                warn!("Cannot process file {} as it is empty", path.display())
            }
            Event::PreconditionFile { path } => warn!(
                "Not processing file {} as it is from a precondition operation",
                path.display()
            ),
            Event::SkippedFile { path, reason } => {
                warn!("Skipping file {}: {reason}", path.display())
            }
            Event::MultipleResourceFiles { dir, used } => warn!(
                "More than one resource file found in {}, using {}",
                dir.display(),
                used.display()
            ),
            Event::EmptyRun { identity } => {
                warn!("Test run {identity} has no usable files, not doing any conversion")
            }
            Event::RunFailed { identity, reason } => {
                error!("Test run {identity} failed: {reason}")
            }
            Event::ArtifactWritten { identity, path } => {
                info!("Wrote {identity} to {}", path.display())
            }
        }

        if let Some(tx) = &self.tx
            && tx.send(event).is_err()
        {
            debug!("Event listener went away");
        }
    }
}
