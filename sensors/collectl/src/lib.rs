use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use common::{
    error::{Error, Result},
    event::{Event, EventSink},
    sensor::{ResourceReader, ResourceStat},
};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

const SOURCE: &str = "collectl";
const COLLECTL_DIR: &str = "collectl";
const CPU_EXTENSION: &str = "cpu";

const CPU_TOTAL: &str = "[CPU]Totl%";
const CPU_USER: &str = "[CPU]User%";
const CPU_SYS: &str = "[CPU]Sys%";
const MEM_USED_KB: &str = "[MEM]Used";

/// collectl summary files (`-P` plot format) recorded next to each shard.
///
/// The files live in a `collectl` directory beside the benchmark output,
/// anywhere below it, with a `.cpu` extension.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Collectl {
    /// Column separator, `,` unless set
    pub separator: Option<char>,
}

#[typetag::serde]
impl ResourceReader for Collectl {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn read(&self, benchmark_path: &Path, _: &str, events: &EventSink) -> Result<ResourceStat> {
        self.delimiter()?;
        let Some(file) = locate(benchmark_path, events) else {
            debug!("No collectl output for {}", benchmark_path.display());
            return Ok(ResourceStat::empty(SOURCE));
        };
        let contents = match read_to_string(&file) {
            Ok(x) => x,
            Err(err) => {
                warn!("Could not read collectl output {}: {err}", file.display());
                return Ok(ResourceStat::empty(SOURCE));
            }
        };
        Ok(self.parse_summary(&contents).unwrap_or_else(|| {
            debug!("No summary columns in {}", file.display());
            ResourceStat::empty(SOURCE)
        }))
    }
}

/// The first `.cpu` file below `<shard dir>/collectl`, in file name order.
pub fn locate(benchmark_path: &Path, events: &EventSink) -> Option<PathBuf> {
    let dir = benchmark_path.parent()?.join(COLLECTL_DIR);
    if !dir.is_dir() {
        return None;
    }

    let mut files = WalkDir::new(&dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(|x| x.to_str()) == Some(CPU_EXTENSION)
        })
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    if files.len() > 1 {
        events.emit(Event::MultipleResourceFiles {
            dir,
            used: files[0].clone(),
        });
    }
    if files.is_empty() {
        None
    } else {
        Some(files.swap_remove(0))
    }
}

impl Collectl {
    /// Column separator as a single byte, only ASCII separators are accepted
    pub fn delimiter(&self) -> Result<u8> {
        let separator = self.separator.unwrap_or(',');
        if !separator.is_ascii() {
            return Err(Error::InvalidInput(format!(
                "collectl separator {separator:?} is not ASCII"
            )));
        }
        Ok(separator as u8)
    }

    /// Mean CPU and memory over every sample in a summary file.
    ///
    /// Returns [`None`] for files without summary columns, such as per-CPU
    /// detail files, and for separators [`Collectl::delimiter`] rejects.
    pub fn parse_summary(&self, contents: &str) -> Option<ResourceStat> {
        let data = contents
            .lines()
            .filter(|line| {
                !line.trim().is_empty() && !line.starts_with("# ") && !line.starts_with("##")
            })
            .map(|line| line.strip_prefix('#').unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter().ok()?)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(data.as_bytes());
        let headers = reader.headers().ok()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let total = column(CPU_TOTAL);
        let user_sys = column(CPU_USER).zip(column(CPU_SYS));
        let memory = column(MEM_USED_KB);
        if total.is_none() && user_sys.is_none() && memory.is_none() {
            return None;
        }

        let mut cpu = Vec::new();
        let mut mem = Vec::new();
        for record in reader.records().filter_map(|x| x.ok()) {
            let value = |idx: usize| record.get(idx).and_then(|x| x.parse::<f64>().ok());
            let sample = match (total, user_sys) {
                (Some(total), _) => value(total),
                (None, Some((user, sys))) => value(user).zip(value(sys)).map(|(u, s)| u + s),
                (None, None) => None,
            };
            cpu.extend(sample);
            mem.extend(memory.and_then(value));
        }

        Some(ResourceStat {
            source: SOURCE.to_owned(),
            cpu_percent: mean(&cpu),
            memory_mb: mean(&mem) / 1024.0,
        })
    }
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}
