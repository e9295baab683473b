//! The onesweep sort engine: one histogram pass over the input followed by a
//! single fused dispatch per 8 bit digit. Each workgroup claims a tile from an
//! atomic bump counter, publishes its digit counts to a lookback spine and
//! resolves its scatter offsets by walking the spine backwards, so the
//! per-pass upsweep/scan/downsweep round trips of the 4-phase engine collapse
//! into one kernel.

use wgpu::ComputePassDescriptor;

use crate::buffers::{partition_count, SortBuffers};
use crate::config::SortConfig;
use crate::radix_sort::{
    create_pass_bind_groups, prepare_bind_group_layout, record_copy_back, SortBindings,
};
use crate::utils::{storage_layout_entry, uniform_layout_entry};

/// Workgroups used by the grid-strided `init_sweep` kernel; fixed so the same
/// recording covers any sort size, including GPU-resident ones.
const INIT_WORKGROUPS: u32 = 256;

pub struct OneSweepSorter {
    config: SortConfig,
    bind_group_layout: wgpu::BindGroupLayout,
    prepare_layout: wgpu::BindGroupLayout,
    prepare_p: wgpu::ComputePipeline,
    init_p: wgpu::ComputePipeline,
    hist_p: wgpu::ComputePipeline,
    spine_p: wgpu::ComputePipeline,
    pass_p: wgpu::ComputePipeline,
}

impl OneSweepSorter {
    pub fn new(device: &wgpu::Device, config: SortConfig) -> Self {
        let bind_group_layout = Self::bind_group_layout(device);
        let prepare_layout = prepare_bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("onesweep pipeline layout"),
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
            include_str!("shaders/onesweep.wgsl")
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("onesweep shader"),
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
        let prepare_p = pipeline(
            &prepare_pipeline_layout,
            "prepare indirect dispatch",
            "prepare_indirect",
        );
        let init_p = pipeline(&pipeline_layout, "init sweep", "init_sweep");
        let hist_p = pipeline(&pipeline_layout, "global histograms", "global_hist_kernel");
        let spine_p = pipeline(&pipeline_layout, "scan spine", "scan_spine");
        let pass_p = pipeline(&pipeline_layout, "digit pass", "digit_pass");

        log::debug!(
            "created onesweep sorter: {:?} keys, {:} passes",
            config.key_type,
            config.passes()
        );

        Self {
            config,
            bind_group_layout,
            prepare_layout,
            prepare_p,
            init_p,
            hist_p,
            spine_p,
            pass_p,
        }
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Allocates the engine-owned temporaries sized to `max_count` keys. The
    /// lookback spine packs counts into 30 bits, so `max_count` must stay
    /// below 2^30.
    pub fn create_sort_buffers(&self, device: &wgpu::Device, max_count: u32) -> SortBuffers {
        SortBuffers::onesweep(device, &self.config, max_count)
    }

    fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("onesweep bind group layout"),
            entries: &[
                storage_layout_entry(0, true),  // sort info
                uniform_layout_entry(1),        // pass info
                storage_layout_entry(2, false), // source keys
                storage_layout_entry(3, false), // destination keys
                storage_layout_entry(4, false), // source payloads
                storage_layout_entry(5, false), // destination payloads
                storage_layout_entry(6, false), // global histogram
                storage_layout_entry(7, false), // lookback spine
                storage_layout_entry(8, false), // tile bump counters
            ],
        })
    }

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

    /// Zeroes histogram, spine and bump counters; grid-strided, so the sort
    /// size never changes the dispatch.
    pub fn record_init(&self, bindings: &SortBindings, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("init sweep"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.init_p);
        pass.set_bind_group(0, bindings.pass(0), &[]);
        pass.dispatch_workgroups(INIT_WORKGROUPS, 1, 1);
    }

    /// Accumulates the digit histograms of every pass in a single sweep over
    /// the unsorted input.
    pub fn record_global_hist(
        &self,
        bindings: &SortBindings,
        count: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("global histograms"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.hist_p);
        pass.set_bind_group(0, bindings.pass(0), &[]);
        pass.dispatch_workgroups(partition_count(count), 1, 1);
    }

    /// Exclusive-scans every histogram row and seeds the spine with the
    /// per-digit base offsets; one workgroup per digit pass.
    pub fn record_scan_spine(&self, bindings: &SortBindings, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("scan spine"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.spine_p);
        pass.set_bind_group(0, bindings.pass(0), &[]);
        pass.dispatch_workgroups(self.config.passes(), 1, 1);
    }

    /// The fused binning pass for one digit.
    pub fn record_digit_pass(
        &self,
        bindings: &SortBindings,
        pass_index: u32,
        count: u32,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("digit pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pass_p);
        pass.set_bind_group(0, bindings.pass(pass_index), &[]);
        pass.dispatch_workgroups(partition_count(count), 1, 1);
    }

    /// Records a complete sort; the caller must have uploaded the element
    /// count with [`SortBuffers::write_count`] before submitting.
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
        self.record_global_hist(bindings, count, encoder);
        self.record_scan_spine(bindings, encoder);
        for p in 0..self.config.passes() {
            self.record_digit_pass(bindings, p, count, encoder);
        }
        record_copy_back(&self.config, buffers, keys, payloads, count, encoder);
    }

    /// Copies a GPU-resident key count into the sort info buffer and derives
    /// the dispatch arguments on the device.
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
        pass.set_bind_group(0, bindings.prepare(), &[]);
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
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("global histograms"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.hist_p);
            pass.set_bind_group(0, bindings.pass(0), &[]);
            pass.dispatch_workgroups_indirect(&buffers.dispatch, 0);
        }
        self.record_scan_spine(bindings, encoder);
        for p in 0..self.config.passes() {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("digit pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pass_p);
            pass.set_bind_group(0, bindings.pass(p), &[]);
            pass.dispatch_workgroups_indirect(&buffers.dispatch, 0);
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
            label: Some("onesweep sort"),
        });
        self.record_sort(bindings, buffers, keys, payloads, count, &mut encoder);
        let idx = queue.submit([encoder.finish()]);
        device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));
    }
}
