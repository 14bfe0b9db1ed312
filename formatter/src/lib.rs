use collectl::Collectl;
use common::{bench::BenchReader, sensor::ResourceReader};
use fio::Fio;
use fio_cpu::FioCpu;
use tracing::debug;

pub mod artifact;
pub mod run;
pub mod scan;
pub mod summary;

pub use scan::{Formatter, RunOutcome, RunStatus, Scan};

/// Every reader crate has to be linked into the final binary for its
/// registration to show up in the by-name factories.
pub fn init_readers() {
    let benches: [Box<dyn BenchReader>; 1] = [Box::new(Fio::default())];
    let resources: [Box<dyn ResourceReader>; 2] =
        [Box::new(FioCpu::default()), Box::new(Collectl::default())];
    debug!("Benchmark readers: {benches:?}, resource readers: {resources:?}");
}
