//! The 4-phase device radix sort: Init zeroes the global histogram, then for
//! every 8 bit digit of the key an Upsweep / Scan / Downsweep triple counts
//! digits, turns the counts into prefix offsets and scatters keys (and
//! payloads) into the alternate buffer, swapping source and destination roles
//! between passes.
//!
//! The kernel dispatch protocol follows the classical reduce-then-scan
//! decoupling: no phase branches on key values, so the work partitioning is
//! identical for every input of the same size.

use wgpu::util::DeviceExt;
use wgpu::ComputePassDescriptor;

use crate::buffers::{partition_count, PassInfo, SortBuffers};
use crate::config::SortConfig;
use crate::utils::{storage_layout_entry, uniform_layout_entry};
use crate::RADIX;

pub struct GpuRadixSorter {
    config: SortConfig,
    bind_group_layout: wgpu::BindGroupLayout,
    prepare_layout: wgpu::BindGroupLayout,
    zero_p: wgpu::ComputePipeline,
    prepare_p: wgpu::ComputePipeline,
    upsweep_p: wgpu::ComputePipeline,
    scan_p: wgpu::ComputePipeline,
    downsweep_p: wgpu::ComputePipeline,
}

/// One bind group per digit pass over a fixed set of key/payload buffers.
/// Source and destination roles alternate with pass parity, which is the
/// whole ping-pong: recording never rebinds buffers mid-sort. The dispatch
/// buffer lives in a separate bind group used only by `prepare_indirect`; it
/// must not be bound while it serves as an indirect dispatch argument.
pub struct SortBindings {
    passes: Vec<wgpu::BindGroup>,
    prepare: wgpu::BindGroup,
    // referenced by the bind groups, kept for explicit ownership
    #[allow(dead_code)]
    pass_uniforms: Vec<wgpu::Buffer>,
}

impl SortBindings {
    pub fn pass(&self, pass: u32) -> &wgpu::BindGroup {
        &self.passes[pass as usize]
    }

    pub fn prepare(&self) -> &wgpu::BindGroup {
        &self.prepare
    }
}

impl GpuRadixSorter {
    pub fn new(device: &wgpu::Device, config: SortConfig) -> Self {
        let bind_group_layout = Self::bind_group_layout(device);
        let prepare_layout = prepare_bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("radix sort pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let prepare_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("prepare indirect pipeline layout"),
                bind_group_layouts: &[&prepare_layout],
                push_constant_ranges: &[],
            });

        let shader_code = format!(
            "{}{}",
            config.shader_defs(),
            include_str!("shaders/radix_sort.wgsl")
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("radix sort shader"),
            source: wgpu::ShaderSource::Wgsl(shader_code.into()),
        });

        let pipeline = |layout: &wgpu::PipelineLayout, label, entry_point| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module: &shader,
                entry_point,
                compilation_options: Default::default(),
            })
        };
        let zero_p = pipeline(&pipeline_layout, "zero histograms", "zero_hist");
        let prepare_p = pipeline(
            &prepare_pipeline_layout,
            "prepare indirect dispatch",
            "prepare_indirect",
        );
        let upsweep_p = pipeline(&pipeline_layout, "upsweep", "upsweep");
        let scan_p = pipeline(&pipeline_layout, "scan", "scan");
        let downsweep_p = pipeline(&pipeline_layout, "downsweep", "downsweep");

        log::debug!(
            "created radix sorter: {:?} keys, {:} passes",
            config.key_type,
            config.passes()
        );

        Self {
            config,
            bind_group_layout,
            prepare_layout,
            zero_p,
            prepare_p,
            upsweep_p,
            scan_p,
            downsweep_p,
        }
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Allocates the engine-owned temporaries sized to `max_count` keys.
    /// A buffer set must not be shared between concurrent sorts; the
    /// histograms would race.
    pub fn create_sort_buffers(&self, device: &wgpu::Device, max_count: u32) -> SortBuffers {
        SortBuffers::device_radix(device, &self.config, max_count)
    }

    fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("radix sort bind group layout"),
            entries: &[
                storage_layout_entry(0, true),  // sort info
                uniform_layout_entry(1),        // pass info
                storage_layout_entry(2, false), // source keys
                storage_layout_entry(3, false), // destination keys
                storage_layout_entry(4, false), // source payloads
                storage_layout_entry(5, false), // destination payloads
                storage_layout_entry(6, false), // global histogram
                storage_layout_entry(7, false), // pass histogram
            ],
        })
    }

    /// Binds caller buffers to the sort, one bind group per digit pass with
    /// src/dst swapped for odd passes. Pairs mode requires a payload buffer,
    /// keys-only mode forbids one; a mismatch is a programmer error.
    pub fn bind(
        &self,
        device: &wgpu::Device,
        buffers: &SortBuffers,
        keys: &wgpu::Buffer,
        payloads: Option<&wgpu::Buffer>,
    ) -> SortBindings {
        assert_eq!(
            self.config,
            *buffers.config(),
            "sort buffers were created for a different configuration"
        );
        assert_eq!(
            self.config.is_pairs(),
            payloads.is_some(),
            "payload buffer presence must match the keys-only/pairs mode"
        );
        create_pass_bind_groups(
            device,
            &self.bind_group_layout,
            &self.prepare_layout,
            &self.config,
            buffers,
            keys,
            payloads,
        )
    }

    /// Init phase: zero the global histogram.
    pub fn record_init(&self, bindings: &SortBindings, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("zero histograms"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.zero_p);
        pass.set_bind_group(0, bindings.pass(0), &[]);
        pass.dispatch_workgroups(self.config.passes(), 1, 1);
    }

    /// Upsweep phase of one digit pass.
    pub fn record_upsweep(
        &self,
        bindings: &SortBindings,
        pass_index: u32,
        count: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("upsweep"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.upsweep_p);
        pass.set_bind_group(0, bindings.pass(pass_index), &[]);
        pass.dispatch_workgroups(partition_count(count), 1, 1);
    }

    /// Scan phase of one digit pass; dispatch dimension is the fixed digit
    /// count, independent of the sort size.
    pub fn record_scan(
        &self,
        bindings: &SortBindings,
        pass_index: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("scan"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.scan_p);
        pass.set_bind_group(0, bindings.pass(pass_index), &[]);
        pass.dispatch_workgroups(RADIX, 1, 1);
    }

    /// Downsweep phase of one digit pass.
    pub fn record_downsweep(
        &self,
        bindings: &SortBindings,
        pass_index: u32,
        count: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("downsweep"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.downsweep_p);
        pass.set_bind_group(0, bindings.pass(pass_index), &[]);
        pass.dispatch_workgroups(partition_count(count), 1, 1);
    }

    /// Records a complete sort. The caller must have uploaded the element
    /// count with [`SortBuffers::write_count`] before submitting. The sorted
    /// result always ends up in the caller's key/payload buffers: the pass
    /// count is even for both supported key widths, and a trailing copy-back
    /// is recorded in case it ever is not.
    pub fn record_sort(
        &self,
        bindings: &SortBindings,
        buffers: &SortBuffers,
        keys: &wgpu::Buffer,
        payloads: Option<&wgpu::Buffer>,
        count: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        assert!(
            count > 0 && count <= buffers.max_count(),
            "sort size {count} outside of (0, {}]",
            buffers.max_count()
        );
        self.record_init(bindings, encoder);
        for p in 0..self.config.passes() {
            self.record_upsweep(bindings, p, count, encoder);
            self.record_scan(bindings, p, encoder);
            self.record_downsweep(bindings, p, count, encoder);
        }
        record_copy_back(&self.config, buffers, keys, payloads, count, encoder);
    }

    /// Copies a GPU-resident key count into the sort info buffer and derives
    /// workgroup count and dispatch arguments on the device, for sorts whose
    /// size is produced by an earlier pipeline stage.
    pub fn record_prepare_indirect(
        &self,
        bindings: &SortBindings,
        buffers: &SortBuffers,
        count_buffer: &wgpu::Buffer,
        count_offset: u64,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        encoder.copy_buffer_to_buffer(count_buffer, count_offset, buffers.info(), 0, 4);
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("prepare indirect dispatch"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.prepare_p);
        pass.set_bind_group(0, &bindings.prepare, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }

    /// Records a complete sort whose size is read from the info buffer at
    /// execution time; [`Self::record_prepare_indirect`] must run first.
    pub fn record_sort_indirect(
        &self,
        bindings: &SortBindings,
        buffers: &SortBuffers,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        self.record_init(bindings, encoder);
        for p in 0..self.config.passes() {
            {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("upsweep"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.upsweep_p);
                pass.set_bind_group(0, bindings.pass(p), &[]);
                pass.dispatch_workgroups_indirect(&buffers.dispatch, 0);
            }
            self.record_scan(bindings, p, encoder);
            {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("downsweep"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.downsweep_p);
                pass.set_bind_group(0, bindings.pass(p), &[]);
                pass.dispatch_workgroups_indirect(&buffers.dispatch, 0);
            }
        }
    }

    /// Immediate variant: records a complete sort, submits and blocks until
    /// the device has finished.
    pub fn sort(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bindings: &SortBindings,
        buffers: &SortBuffers,
        keys: &wgpu::Buffer,
        payloads: Option<&wgpu::Buffer>,
        count: u32,
    ) {
        buffers.write_count(queue, count);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("radix sort"),
        });
        self.record_sort(bindings, buffers, keys, payloads, count, &mut encoder);
        let idx = queue.submit([encoder.finish()]);
        device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));
    }
}

/// Layout of the `prepare_indirect` bind group: the sort info buffer and the
/// dispatch argument buffer, both writable. Separate from the sorting layout
/// so the dispatch buffer is never bound while a kernel consumes it as an
/// indirect argument.
pub(crate) fn prepare_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("prepare indirect bind group layout"),
        entries: &[
            storage_layout_entry(0, false), // sort info
            storage_layout_entry(9, false), // indirect dispatch args
        ],
    })
}

/// Builds the per-pass bind groups shared by both sort engines.
pub(crate) fn create_pass_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    prepare_layout: &wgpu::BindGroupLayout,
    config: &SortConfig,
    buffers: &SortBuffers,
    keys: &wgpu::Buffer,
    payloads: Option<&wgpu::Buffer>,
) -> SortBindings {
    let payload_src = payloads.unwrap_or(&buffers.payload_stub);
    let payload_dst = &buffers.alt_payload;

    let mut pass_uniforms = Vec::new();
    let mut passes = Vec::new();
    for p in 0..config.passes() {
        let pass_info = PassInfo {
            radix_shift: p * 8,
            pass_index: p,
            _pad0: 0,
            _pad1: 0,
        };
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("radix pass info"),
            contents: bytemuck::bytes_of(&pass_info),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        // ping-pong: even passes read the caller buffers, odd passes read the
        // alternates
        let (src_k, dst_k) = if p % 2 == 0 {
            (keys, &buffers.alt)
        } else {
            (&buffers.alt, keys)
        };
        let (src_p, dst_p) = if p % 2 == 0 {
            (payload_src, payload_dst)
        } else {
            (payload_dst, payload_src)
        };

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffers.info.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: src_k.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: dst_k.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: src_p.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: dst_p.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: buffers.global_hist.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 7,
                resource: buffers.pass_hist.as_entire_binding(),
            },
        ];
        if let Some(bump) = &buffers.bump {
            entries.push(wgpu::BindGroupEntry {
                binding: 8,
                resource: bump.as_entire_binding(),
            });
        }

        passes.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("radix sort bind group"),
            layout,
            entries: &entries,
        }));
        pass_uniforms.push(uniform);
    }

    let prepare = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("prepare indirect bind group"),
        layout: prepare_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffers.info.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 9,
                resource: buffers.dispatch.as_entire_binding(),
            },
        ],
    });

    SortBindings {
        passes,
        prepare,
        pass_uniforms,
    }
}

/// If the digit pass count is odd the final downsweep lands in the alternate
/// buffers; copy the result back so callers always find it in the buffer they
/// supplied.
pub(crate) fn record_copy_back(
    config: &SortConfig,
    buffers: &SortBuffers,
    keys: &wgpu::Buffer,
    payloads: Option<&wgpu::Buffer>,
    count: u32,
    encoder: &mut wgpu::CommandEncoder,
) {
    if config.passes() % 2 == 0 {
        return;
    }
    encoder.copy_buffer_to_buffer(
        &buffers.alt,
        0,
        keys,
        0,
        count as u64 * config.key_type.size(),
    );
    if let Some(payloads) = payloads {
        encoder.copy_buffer_to_buffer(&buffers.alt_payload, 0, payloads, 0, count as u64 * 4);
    }
}
