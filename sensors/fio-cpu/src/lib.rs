use std::path::Path;

use common::{
    error::{Error, Result},
    event::EventSink,
    sensor::{ResourceReader, ResourceStat},
};
use fio::result::FioResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SOURCE: &str = "fio";

/// CPU usage fio reports about itself, read from the benchmark file.
///
/// fio does not report memory, so memory is always zero.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FioCpu {}

#[typetag::serde]
impl ResourceReader for FioCpu {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn read(
        &self,
        benchmark_path: &Path,
        benchmark_contents: &str,
        _: &EventSink,
    ) -> Result<ResourceStat> {
        if benchmark_contents.trim().is_empty() {
            return Ok(ResourceStat::empty(SOURCE));
        }
        let result: FioResult = serde_json::from_str(benchmark_contents)
            .map_err(|err| Error::malformed(benchmark_path, err))?;

        let Some(job) = result.jobs.first() else {
            debug!("No jobs in {}, no cpu figures", benchmark_path.display());
            return Ok(ResourceStat::empty(SOURCE));
        };
        Ok(ResourceStat {
            source: SOURCE.to_owned(),
            cpu_percent: job.sys_cpu.unwrap_or_default() + job.usr_cpu.unwrap_or_default(),
            memory_mb: 0.0,
        })
    }
}
