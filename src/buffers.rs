//! GPU-side working memory for the sort engines. All temporaries are sized
//! once from a declared maximum element count and reused across sort calls;
//! only the key/payload buffers being sorted are supplied by the caller.

use crate::config::SortConfig;
use crate::{MAX_DISPATCH_DIM, PARTITION_SIZE, RADIX};

/// Round-up division, used everywhere workgroup counts are derived.
pub fn div_round_up(x: u32, y: u32) -> u32 {
    (x + y - 1) / y
}

/// Number of workgroups needed to cover `count` keys.
pub fn partition_count(count: u32) -> u32 {
    div_round_up(count, PARTITION_SIZE)
}

/// Per-dispatch parameters the kernels read from a storage buffer. Written
/// either from the host ([`SortBuffers::write_count`]) or on the GPU by the
/// `prepare_indirect` kernel for data-dependent sort sizes.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SortInfo {
    pub num_keys: u32,
    pub num_blocks: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Per-digit-pass parameters, one small uniform buffer per pass so a whole
/// sort records without touching buffers between dispatches.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassInfo {
    pub radix_shift: u32,
    pub pass_index: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// The temporary buffer set shared between caller and engine: alternate
/// key/payload storage for the ping-pong, the digit histograms and the
/// dispatch parameter buffers. Dropping the struct releases the GPU memory.
pub struct SortBuffers {
    pub(crate) config: SortConfig,
    pub(crate) max_count: u32,
    pub(crate) alt: wgpu::Buffer,
    pub(crate) alt_payload: wgpu::Buffer,
    // bound in place of caller payloads in keys-only mode so the fixed bind
    // group layout stays satisfied without aliasing a writable buffer
    pub(crate) payload_stub: wgpu::Buffer,
    pub(crate) global_hist: wgpu::Buffer,
    pub(crate) pass_hist: wgpu::Buffer,
    // tile index bump counters, one per digit pass (onesweep only)
    pub(crate) bump: Option<wgpu::Buffer>,
    pub(crate) info: wgpu::Buffer,
    pub(crate) dispatch: wgpu::Buffer,
}

impl SortBuffers {
    /// Buffer set for the 4-phase device radix sort: pass histogram holds one
    /// row of 256 counts per workgroup.
    pub(crate) fn device_radix(
        device: &wgpu::Device,
        config: &SortConfig,
        max_count: u32,
    ) -> Self {
        let blocks = Self::check_size(max_count);
        let pass_hist_size = RADIX as u64 * blocks as u64 * 4;
        Self::allocate(device, config, max_count, pass_hist_size, false)
    }

    /// Buffer set for the onesweep variant: the pass histogram doubles as the
    /// decoupled-lookback spine, one flagged row per pass per workgroup plus a
    /// seed row carrying the global digit base, and a tile bump counter per
    /// pass.
    pub(crate) fn onesweep(device: &wgpu::Device, config: &SortConfig, max_count: u32) -> Self {
        let blocks = Self::check_size(max_count);
        // spine entries pack a 30 bit value with a 2 bit status flag
        assert!(
            max_count < (1 << 30),
            "onesweep supports at most 2^30 - 1 keys, got {max_count}"
        );
        let spine_size = config.passes() as u64 * RADIX as u64 * (blocks as u64 + 1) * 4;
        Self::allocate(device, config, max_count, spine_size, true)
    }

    fn check_size(max_count: u32) -> u32 {
        assert!(max_count > 0, "maximum element count must be positive");
        let blocks = partition_count(max_count);
        assert!(
            blocks <= MAX_DISPATCH_DIM,
            "{max_count} keys need {blocks} workgroups, exceeding the dispatch limit"
        );
        blocks
    }

    fn allocate(
        device: &wgpu::Device,
        config: &SortConfig,
        max_count: u32,
        pass_hist_size: u64,
        with_bump: bool,
    ) -> Self {
        let blocks = partition_count(max_count);
        let storage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let alt = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix alternate key buffer"),
            size: max_count as u64 * config.key_type.size(),
            usage: storage,
            mapped_at_creation: false,
        });
        let payload_size = if config.is_pairs() {
            max_count as u64 * 4
        } else {
            4
        };
        let alt_payload = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix alternate payload buffer"),
            size: payload_size,
            usage: storage,
            mapped_at_creation: false,
        });
        let payload_stub = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix payload stub"),
            size: 4,
            usage: storage,
            mapped_at_creation: false,
        });
        let global_hist = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix global histogram"),
            size: RADIX as u64 * config.passes() as u64 * 4,
            usage: storage,
            mapped_at_creation: false,
        });
        let pass_hist = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix pass histogram"),
            size: pass_hist_size,
            usage: storage,
            mapped_at_creation: false,
        });
        let bump = with_bump.then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("radix tile bump counters"),
                size: config.passes() as u64 * 4,
                usage: storage,
                mapped_at_creation: false,
            })
        });
        let info = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix sort info"),
            size: std::mem::size_of::<SortInfo>() as u64,
            usage: storage,
            mapped_at_creation: false,
        });
        let dispatch = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix dispatch indirect buffer"),
            size: std::mem::size_of::<wgpu::util::DispatchIndirectArgs>() as u64,
            usage: storage | wgpu::BufferUsages::INDIRECT,
            mapped_at_creation: false,
        });

        log::debug!(
            "allocated sort buffers for up to {:} keys ({:} workgroups)",
            max_count,
            blocks
        );

        Self {
            config: *config,
            max_count,
            alt,
            alt_payload,
            payload_stub,
            global_hist,
            pass_hist,
            bump,
            info,
            dispatch,
        }
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn global_hist(&self) -> &wgpu::Buffer {
        &self.global_hist
    }

    pub fn pass_hist(&self) -> &wgpu::Buffer {
        &self.pass_hist
    }

    /// The GPU-side sort size parameters; for the indirect path an earlier
    /// pipeline stage writes the key count into the first word of this buffer
    /// (or the engine copies it over from a caller-supplied count buffer).
    pub fn info(&self) -> &wgpu::Buffer {
        &self.info
    }

    /// Uploads the element count and derived workgroup count for this sort
    /// call. Violating `0 < count <= max_count` is a programmer error.
    pub fn write_count(&self, queue: &wgpu::Queue, count: u32) {
        assert!(
            count > 0 && count <= self.max_count,
            "sort size {count} outside of (0, {}]",
            self.max_count
        );
        let info = SortInfo {
            num_keys: count,
            num_blocks: partition_count(count),
            _pad0: 0,
            _pad1: 0,
        };
        queue.write_buffer(&self.info, 0, bytemuck::bytes_of(&info));
    }

    /// Eagerly releases the GPU allocations instead of waiting for `Drop`,
    /// for callers that rebuild the buffer set with a new maximum.
    pub fn destroy(&self) {
        self.alt.destroy();
        self.alt_payload.destroy();
        self.payload_stub.destroy();
        self.global_hist.destroy();
        self.pass_hist.destroy();
        if let Some(bump) = &self.bump {
            bump.destroy();
        }
        self.info.destroy();
        self.dispatch.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_count_rounds_up() {
        assert_eq!(partition_count(1), 1);
        assert_eq!(partition_count(PARTITION_SIZE), 1);
        assert_eq!(partition_count(PARTITION_SIZE + 1), 2);
        assert_eq!(partition_count(10 * PARTITION_SIZE - 1), 10);
    }

    #[test]
    fn div_round_up_basics() {
        assert_eq!(div_round_up(0, 256), 0);
        assert_eq!(div_round_up(256, 256), 1);
        assert_eq!(div_round_up(257, 256), 2);
    }
}
