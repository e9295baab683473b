//! GPU digit binning radix sort for wgpu.
//!
//! Two compute sort engines over the same configuration and buffer model:
//! [`GpuRadixSorter`], the 4-phase device radix sort (init, then upsweep /
//! scan / downsweep per 8 bit digit), and [`OneSweepSorter`], the chained
//! decoupled-lookback variant that fuses the per-pass phases into a single
//! dispatch. A standalone reduce-then-scan prefix sum pipeline
//! ([`GpuPrefixSum`]) is exposed as well.
//!
//! Keys are u32, i32, f32 or u64 (stored as two u32 words); an optional 4 byte
//! payload per key moves with it. Both engines sort stably, in place from the
//! caller's point of view: the sorted data ends up in the buffers that were
//! bound.

mod buffers;
mod config;
mod onesweep;
mod prefix_sum;
mod radix_sort;
pub mod utils;

pub use buffers::{div_round_up, partition_count, PassInfo, SortBuffers, SortInfo};
pub use config::{KeyType, PayloadType, SortConfig, SortMode, SortOrder};
pub use onesweep::OneSweepSorter;
pub use prefix_sum::{GpuPrefixSum, ScanBuffers};
pub use radix_sort::{GpuRadixSorter, SortBindings};

/// Number of bins per digit pass.
pub const RADIX: u32 = 256;
/// Threads per workgroup in every kernel.
pub const WORKGROUP_SIZE: u32 = 256;
/// Keys each thread handles per partition.
pub const BLOCK_ROWS: u32 = 15;
/// Keys per workgroup partition (`WORKGROUP_SIZE * BLOCK_ROWS`).
pub const PARTITION_SIZE: u32 = WORKGROUP_SIZE * BLOCK_ROWS;
/// Largest workgroup count a single dispatch dimension may carry.
pub const MAX_DISPATCH_DIM: u32 = 65535;
