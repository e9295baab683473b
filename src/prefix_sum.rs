//! Standalone reduce-then-scan prefix sums over u32 buffers: a reduce kernel
//! sums each 256 element tile, a single-workgroup spine kernel exclusive-scans
//! the tile sums, and a propagate kernel recombines them into the final
//! inclusive or exclusive scan.

use crate::buffers::div_round_up;
use crate::utils::{storage_layout_entry, uniform_layout_entry};
use crate::{MAX_DISPATCH_DIM, WORKGROUP_SIZE};

const TILE_SIZE: u32 = WORKGROUP_SIZE;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ScanInfo {
    count: u32,
    num_tiles: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Scratch for the prefix sum pipeline, sized once from a maximum element
/// count and reused across scans.
pub struct ScanBuffers {
    max_count: u32,
    info: wgpu::Buffer,
    reductions: wgpu::Buffer,
}

impl ScanBuffers {
    fn new(device: &wgpu::Device, max_count: u32) -> Self {
        assert!(max_count > 0, "maximum element count must be positive");
        let tiles = div_round_up(max_count, TILE_SIZE);
        assert!(
            tiles <= MAX_DISPATCH_DIM,
            "{max_count} elements need {tiles} workgroups, exceeding the dispatch limit"
        );
        let info = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prefix sum info"),
            size: std::mem::size_of::<ScanInfo>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let reductions = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prefix sum tile reductions"),
            size: tiles as u64 * 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        Self {
            max_count,
            info,
            reductions,
        }
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    /// Uploads the element count for the next recorded scan. The immediate
    /// variants call this themselves.
    pub fn write_count(&self, queue: &wgpu::Queue, count: u32) {
        assert!(
            count > 0 && count <= self.max_count,
            "scan size {count} outside of (0, {}]",
            self.max_count
        );
        let info = ScanInfo {
            count,
            num_tiles: div_round_up(count, TILE_SIZE),
            _pad0: 0,
            _pad1: 0,
        };
        queue.write_buffer(&self.info, 0, bytemuck::bytes_of(&info));
    }
}

pub struct GpuPrefixSum {
    bind_group_layout: wgpu::BindGroupLayout,
    reduce_p: wgpu::ComputePipeline,
    spine_p: wgpu::ComputePipeline,
    inclusive_p: wgpu::ComputePipeline,
    exclusive_p: wgpu::ComputePipeline,
}

impl GpuPrefixSum {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prefix sum bind group layout"),
            entries: &[
                uniform_layout_entry(0),
                storage_layout_entry(1, true),  // input
                storage_layout_entry(2, false), // output
                storage_layout_entry(3, false), // tile reductions
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("prefix sum pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("prefix sum shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/prefix_sum.wgsl").into()),
        });

        let pipeline = |label, entry_point| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point,
                compilation_options: Default::default(),
            })
        };
        Self {
            bind_group_layout,
            reduce_p: pipeline("reduce", "reduce"),
            spine_p: pipeline("spine scan", "spine_scan"),
            inclusive_p: pipeline("propagate inclusive", "propagate_inclusive"),
            exclusive_p: pipeline("propagate exclusive", "propagate_exclusive"),
        }
    }

    pub fn create_scan_buffers(&self, device: &wgpu::Device, max_count: u32) -> ScanBuffers {
        ScanBuffers::new(device, max_count)
    }

    /// Binds an input/output buffer pair. In-place scans are not supported;
    /// the propagate kernels re-read the input after the reductions buffer
    /// was rewritten.
    pub fn bind(
        &self,
        device: &wgpu::Device,
        buffers: &ScanBuffers,
        input: &wgpu::Buffer,
        output: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prefix sum bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.info.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.reductions.as_entire_binding(),
                },
            ],
        })
    }

    fn record(
        &self,
        bind_group: &wgpu::BindGroup,
        count: u32,
        propagate: &wgpu::ComputePipeline,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let tiles = div_round_up(count, TILE_SIZE);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("prefix sum"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_pipeline(&self.reduce_p);
        pass.dispatch_workgroups(tiles, 1, 1);
        pass.set_pipeline(&self.spine_p);
        pass.dispatch_workgroups(1, 1, 1);
        pass.set_pipeline(propagate);
        pass.dispatch_workgroups(tiles, 1, 1);
    }

    /// Records an inclusive scan; the caller must have uploaded the element
    /// count with [`ScanBuffers::write_count`] before submitting.
    pub fn record_inclusive(
        &self,
        bind_group: &wgpu::BindGroup,
        count: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        self.record(bind_group, count, &self.inclusive_p, encoder);
    }

    pub fn record_exclusive(
        &self,
        bind_group: &wgpu::BindGroup,
        count: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        self.record(bind_group, count, &self.exclusive_p, encoder);
    }

    /// Immediate inclusive scan over the first `count` elements.
    pub fn inclusive(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &ScanBuffers,
        bind_group: &wgpu::BindGroup,
        count: u32,
    ) {
        self.run(device, queue, buffers, bind_group, count, &self.inclusive_p);
    }

    /// Immediate exclusive scan over the first `count` elements.
    pub fn exclusive(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &ScanBuffers,
        bind_group: &wgpu::BindGroup,
        count: u32,
    ) {
        self.run(device, queue, buffers, bind_group, count, &self.exclusive_p);
    }

    fn run(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &ScanBuffers,
        bind_group: &wgpu::BindGroup,
        count: u32,
        propagate: &wgpu::ComputePipeline,
    ) {
        buffers.write_count(queue, count);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("prefix sum"),
        });
        self.record(bind_group, count, propagate, &mut encoder);
        let idx = queue.submit([encoder.finish()]);
        device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));
    }
}
