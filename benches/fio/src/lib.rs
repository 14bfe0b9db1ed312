use std::{collections::BTreeMap, path::Path};

use common::{
    bench::{BenchReader, RawIOStat},
    error::{Error, Result},
    stats::SampleStats,
    util::{iodepth_from_path, parse_blocksize},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::result::{FioResult, IoStats, Options};


/// Reads fio JSON output.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Fio {}

#[typetag::serde]
impl BenchReader for Fio {
    fn name(&self) -> &'static str {
        "fio"
    }

    fn parse(&self, path: &Path, contents: &str) -> Result<RawIOStat> {
        if contents.trim().is_empty() {
            return Err(Error::EmptyInput {
                path: path.to_owned(),
            });
        }
        let result: FioResult =
            serde_json::from_str(contents).map_err(|err| Error::malformed(path, err))?;
        result.to_raw_stat(path)
    }
}

impl FioResult {
    /// Normalises this file, summing the read and write sides of every job
    pub fn to_raw_stat(&self, path: &Path) -> Result<RawIOStat> {
        let options = self.effective_options();

        let bs = options
            .bs
            .as_deref()
            .ok_or_else(|| Error::malformed(path, "no blocksize in global or job options"))?;
        // `bs=4k,64k` sets the read and write sizes separately, the first one is reported
        let blocksize = bs
            .split(',')
            .next()
            .and_then(parse_blocksize)
            .ok_or_else(|| Error::malformed(path, format!("unsupported blocksize {bs}")))?;
        let rw = options
            .rw
            .clone()
            .ok_or_else(|| Error::malformed(path, "no rw in global or job options"))?;

        let iodepth = self.iodepth(&options, path)?;

        let mut global_options = BTreeMap::new();
        if let Some(numjobs) = &options.numjobs {
            global_options.insert("number_of_jobs".to_owned(), numjobs.clone());
        }
        if let Some(runtime) = &options.runtime {
            global_options.insert("runtime_seconds".to_owned(), runtime.clone());
        }
        global_options.insert("blocksize".to_owned(), blocksize.to_string());

        // rwmixwrite is always written alongside rwmixread
        let (read_percent, write_percent, operation) = match &options.rwmixread {
            Some(reads) => {
                let writes = options
                    .rwmixwrite
                    .clone()
                    .unwrap_or_else(|| mix_complement(reads));
                global_options.insert("percentage_reads".to_owned(), reads.clone());
                global_options.insert("percentage_writes".to_owned(), writes.clone());
                let operation = format!("{reads}_{writes}_{rw}");
                (Some(reads.clone()), Some(writes), operation)
            }
            None => (None, None, rw),
        };

        let mut stat = RawIOStat {
            blocksize,
            operation,
            read_percent,
            write_percent,
            iodepth,
            global_options,
            ..Default::default()
        };
        self.add_io_details(&mut stat)?;
        Ok(stat)
    }

    /// Global options, with gaps filled from the first job's options
    fn effective_options(&self) -> Options {
        let global = &self.global_options;
        let Some(job) = self.jobs.first().map(|x| &x.job_options) else {
            return global.clone();
        };
        Options {
            bs: global.bs.clone().or_else(|| job.bs.clone()),
            rw: global.rw.clone().or_else(|| job.rw.clone()),
            iodepth: global.iodepth.clone().or_else(|| job.iodepth.clone()),
            numjobs: global.numjobs.clone().or_else(|| job.numjobs.clone()),
            runtime: global.runtime.clone().or_else(|| job.runtime.clone()),
            rwmixread: global.rwmixread.clone().or_else(|| job.rwmixread.clone()),
            rwmixwrite: global.rwmixwrite.clone().or_else(|| job.rwmixwrite.clone()),
        }
    }

    /// Older fio versions report the per-job depth, so whichever of the file
    /// and the directory layout claims the higher depth is trusted.
    fn iodepth(&self, options: &Options, path: &Path) -> Result<u64> {
        let from_file = options
            .iodepth
            .as_deref()
            .map(|x| {
                x.trim()
                    .parse::<u64>()
                    .map_err(|_| Error::malformed(path, format!("unsupported iodepth {x}")))
            })
            .transpose()?;
        let from_path = iodepth_from_path(path);
        debug!(
            "iodepth for {} is {from_file:?} in the file and {from_path:?} in the path",
            path.display()
        );

        from_file
            .into_iter()
            .chain(from_path)
            .max()
            .ok_or_else(|| Error::MissingIodepth {
                path: path.to_owned(),
            })
    }

    /// Totals over the read and write side of every job.
    ///
    /// Sides without any IO carry no latency samples and take no part in
    /// the pooled latency statistics.
    fn add_io_details(&self, stat: &mut RawIOStat) -> Result<()> {
        let sides = self
            .jobs
            .iter()
            .flat_map(|job| [job.read.as_ref(), job.write.as_ref()])
            .flatten()
            .collect::<Vec<&IoStats>>();

        for side in &sides {
            stat.io_bytes += side.io_bytes;
            stat.bandwidth_bytes += side.bw_bytes;
            stat.iops += side.iops;
            stat.total_ios += side.total_ios;
        }

        let latencies = sides
            .iter()
            .filter(|x| x.total_ios > 0)
            .map(|x| SampleStats::new(x.clat_ns.mean, x.clat_ns.stddev, x.total_ios))
            .collect::<Vec<_>>();
        let latency = match latencies.as_slice() {
            [] => SampleStats::default(),
            [single] => *single,
            many => SampleStats::pool(many)?,
        };
        stat.mean_latency_ns = latency.mean;
        stat.stddev_latency_ns = latency.stddev;
        Ok(())
    }
}

fn mix_complement(reads: &str) -> String {
    reads
        .trim()
        .parse::<u64>()
        .map(|x| 100u64.saturating_sub(x).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use common::bench::bench_reader_by_name;
    use serde_json::{Value, json};

    use super::*;

    fn read_side() -> Value {
        json!({
            "io_bytes": 440397824u64,
            "bw_bytes": 34982748u64,
            "iops": 8539.518627,
            "total_ios": 107504u64,
            "clat_ns": {"mean": 1977392.018174, "stddev": 9231257.966646},
        })
    }

    fn write_side() -> Value {
        json!({
            "io_bytes": 480681984u64,
            "bw_bytes": 35640393u64,
            "iops": 8700.155705,
            "total_ios": 117339u64,
            "clat_ns": {"mean": 1825254.043151, "stddev": 10820490.136089},
        })
    }

    fn idle_side() -> Value {
        json!({
            "io_bytes": 0, "bw_bytes": 0, "iops": 0.0, "total_ios": 0,
            "clat_ns": {"mean": 0.0, "stddev": 0.0},
        })
    }

    fn document(global: Value, jobs: Vec<Value>) -> String {
        json!({"global options": global, "jobs": jobs}).to_string()
    }

    fn randread_global() -> Value {
        json!({"bs": "4K", "rw": "randread", "iodepth": "4", "numjobs": "2", "runtime": "60"})
    }

    fn parse(path: &str, contents: &str) -> Result<RawIOStat> {
        Fio::default().parse(&PathBuf::from(path), contents)
    }

    #[test]
    fn global_options() {
        let contents = document(
            json!({"rw": "write", "runtime": "90", "numjobs": "1", "bs": "4096B", "iodepth": "16"}),
            vec![json!({"write": write_side()})],
        );
        let stat = parse("/tmp/id-1/json_output.0", &contents).unwrap();

        assert_eq!(stat.blocksize, 4096);
        assert_eq!(stat.operation, "write");
        assert_eq!(stat.iodepth, 16);
        assert_eq!(stat.read_percent, None);
        assert_eq!(
            stat.global_options,
            BTreeMap::from([
                ("number_of_jobs".to_owned(), "1".to_owned()),
                ("runtime_seconds".to_owned(), "90".to_owned()),
                ("blocksize".to_owned(), "4096".to_owned()),
            ])
        );
    }

    #[test]
    fn read_write_mix_prefixes_the_operation() {
        let mut global = randread_global();
        global["rw"] = json!("randrw");
        global["rwmixread"] = json!("70");
        global["rwmixwrite"] = json!("30");
        let contents = document(global, vec![json!({"read": read_side(), "write": write_side()})]);
        let stat = parse("/tmp/json_output.0", &contents).unwrap();

        assert_eq!(stat.operation, "70_30_randrw");
        assert_eq!(stat.read_percent.as_deref(), Some("70"));
        assert_eq!(stat.write_percent.as_deref(), Some("30"));
        assert_eq!(stat.global_options["percentage_reads"], "70");
        assert_eq!(stat.global_options["percentage_writes"], "30");
    }

    #[test]
    fn read_only_job() {
        let contents = document(randread_global(), vec![json!({"read": read_side()})]);
        let stat = parse("/tmp/json_output.0", &contents).unwrap();

        assert_eq!(stat.io_bytes, 440397824);
        assert_eq!(stat.bandwidth_bytes, 34982748);
        assert_eq!(stat.iops, 8539.518627);
        assert_eq!(stat.total_ios, 107504);
        assert_eq!(stat.mean_latency_ns, 1977392.018174);
        assert_eq!(stat.stddev_latency_ns, 9231257.966646);
    }

    #[test]
    fn idle_write_side_leaves_read_statistics_alone() {
        let contents = document(
            randread_global(),
            vec![json!({"read": read_side(), "write": idle_side()})],
        );
        let stat = parse("/tmp/json_output.0", &contents).unwrap();

        assert_eq!(stat.total_ios, 107504);
        assert_eq!(stat.mean_latency_ns, 1977392.018174);
        assert_eq!(stat.stddev_latency_ns, 9231257.966646);
    }

    #[test]
    fn mixed_job_sums_and_pools() {
        let contents = document(
            randread_global(),
            vec![json!({}), json!({"read": read_side(), "write": write_side()})],
        );
        let stat = parse("/tmp/json_output.0", &contents).unwrap();

        assert_eq!(stat.io_bytes, 440397824 + 480681984);
        assert_eq!(stat.bandwidth_bytes, 34982748 + 35640393);
        assert!((stat.iops - (8539.518627 + 8700.155705)).abs() < 1e-9);
        assert_eq!(stat.total_ios, 107504 + 117339);
        assert!(stat.mean_latency_ns > 1825254.043151);
        assert!(stat.mean_latency_ns < 1977392.018174);
        assert!(stat.mean_latency_ns < (1825254.043151 + 1977392.018174) / 2.0);
    }

    #[test]
    fn job_without_io_has_zero_latency() {
        let contents = document(randread_global(), vec![json!({"read": idle_side()})]);
        let stat = parse("/tmp/json_output.0", &contents).unwrap();
        assert_eq!(stat.total_ios, 0);
        assert_eq!(stat.mean_latency_ns, 0.0);
        assert_eq!(stat.stddev_latency_ns, 0.0);
    }

    #[test]
    fn job_options_fill_missing_globals() {
        let contents = document(
            json!({"numjobs": "1"}),
            vec![json!({
                "job options": {"bs": "64k", "rw": "read", "iodepth": "8"},
                "read": read_side(),
            })],
        );
        let stat = parse("/tmp/json_output.0", &contents).unwrap();
        assert_eq!(stat.blocksize, 65536);
        assert_eq!(stat.operation, "read");
        assert_eq!(stat.iodepth, 8);
    }

    #[test]
    fn iodepth_prefers_the_higher_value() {
        let contents = document(randread_global(), vec![json!({"read": read_side()})]);
        assert_eq!(parse("/tmp/json_output.0", &contents).unwrap().iodepth, 4);
        assert_eq!(
            parse("/tmp/total_iodepth-8/json_output.0", &contents)
                .unwrap()
                .iodepth,
            8
        );
        assert_eq!(
            parse("/tmp/iodepth-016/numjobs-001/output.0", &contents)
                .unwrap()
                .iodepth,
            16
        );
        assert_eq!(
            parse("/tmp/total_iodepth-2/json_output.0", &contents)
                .unwrap()
                .iodepth,
            4
        );
    }

    #[test]
    fn iodepth_from_path_alone() {
        let mut global = randread_global();
        global.as_object_mut().unwrap().remove("iodepth");
        let contents = document(global, vec![json!({"read": read_side()})]);
        assert_eq!(
            parse("/tmp/total_iodepth-32/json_output.0", &contents)
                .unwrap()
                .iodepth,
            32
        );
    }

    #[test]
    fn missing_iodepth() {
        let mut global = randread_global();
        global.as_object_mut().unwrap().remove("iodepth");
        let contents = document(global, vec![json!({"read": read_side()})]);
        assert!(matches!(
            parse("/tmp/id-1/json_output.0", &contents),
            Err(Error::MissingIodepth { .. })
        ));
    }

    #[test]
    fn empty_and_malformed_input() {
        assert!(matches!(
            parse("/tmp/json_output.0", ""),
            Err(Error::EmptyInput { .. })
        ));
        assert!(matches!(
            parse("/tmp/json_output.0", "fio: pid=1, err=5/file:io_u.c"),
            Err(Error::MalformedInput { .. })
        ));
        let contents = document(json!({"rw": "read", "iodepth": "1"}), vec![]);
        assert!(matches!(
            parse("/tmp/json_output.0", &contents),
            Err(Error::MalformedInput { .. })
        ));
    }

    #[test]
    fn registered_by_name() {
        let reader = bench_reader_by_name("Fio").unwrap();
        assert_eq!(reader.name(), "fio");
    }
}
