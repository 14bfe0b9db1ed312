pub mod bench;
pub mod config;
pub mod error;
pub mod event;
pub mod sensor;
pub mod stats;
pub mod util;

/// Bytes per MB as used for reported bandwidth, decimal units
pub const BYTES_PER_MB: f64 = 1_000_000.0;
/// Nanoseconds per millisecond, latencies are reported in ms
pub const NS_PER_MS: f64 = 1_000_000.0;
/// Blocksizes from here on are compared by bandwidth rather than IOPS
pub const BANDWIDTH_BLOCKSIZE_THRESHOLD: u64 = 65536;
