use std::{
    path::{Component, Path},
    sync::LazyLock,
};

use regex::Regex;

static TOTAL_IODEPTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^total_iodepth-(\d+)$").unwrap());
static IODEPTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^iodepth-(\d+)$").unwrap());
static NUMJOBS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^numjobs-\d+$").unwrap());

/// Marker for shards written while a volume was being preconditioned
pub const PRECONDITION_MARKER: &str = "precond";

/// Parses a blocksize such as `4096`, `4096B`, `4k` or `1M` into bytes.
pub fn parse_blocksize(blocksize: &str) -> Option<u64> {
    let blocksize = blocksize.trim().to_lowercase();
    let (digits, multiplier) = match blocksize.chars().last()? {
        'b' => (&blocksize[..blocksize.len() - 1], 1),
        'k' => (&blocksize[..blocksize.len() - 1], 1024),
        'm' => (&blocksize[..blocksize.len() - 1], 1024 * 1024),
        'g' => (&blocksize[..blocksize.len() - 1], 1024 * 1024 * 1024),
        _ => (blocksize.as_str(), 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

pub fn file_is_precondition(path: &Path) -> bool {
    path.to_string_lossy().contains(PRECONDITION_MARKER)
}

/// True when `file_name` is `<root>.<digits>`.
pub fn is_shard_file_name(file_name: &str, root: &str) -> bool {
    file_name
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

/// The iodepth encoded in the directories of a shard path.
///
/// A `total_iodepth-N` segment is the aggregate depth of the file and wins.
/// Otherwise an `iodepth-N` segment followed by `numjobs-M` (per-job depth),
/// and failing that the last lone `iodepth-N` segment.
pub fn iodepth_from_path(path: &Path) -> Option<u64> {
    let segments = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>();

    let capture = |re: &Regex, segment: &str| {
        re.captures(segment)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    };

    if let Some(total) = segments.iter().find_map(|s| capture(&TOTAL_IODEPTH, s)) {
        return Some(total);
    }

    let per_job = segments
        .windows(2)
        .filter(|pair| NUMJOBS.is_match(pair[1]))
        .find_map(|pair| capture(&IODEPTH, pair[0]));
    if per_job.is_some() {
        return per_job;
    }

    segments.iter().rev().find_map(|s| capture(&IODEPTH, s))
}

/// Shortest round-trip form of a float, always with a decimal point or exponent.
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}
