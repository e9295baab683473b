use wgpu::util::DeviceExt;

/// Requests a compute-capable device. Returns `None` on machines without a
/// usable adapter (CI runners without a GPU or software rasterizer), in which
/// case the caller skips the test.
pub fn create_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .ok()
    })
}

pub fn storage_buffer<T: bytemuck::Pod>(device: &wgpu::Device, data: &[T]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("test buffer"),
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
    })
}

pub fn download<T: bytemuck::Pod>(
    buffer: &wgpu::Buffer,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> Vec<T> {
    pollster::block_on(gpu_sorting::utils::download_buffer(buffer, device, queue))
        .expect("readback failed")
}

#[macro_export]
macro_rules! require_device {
    () => {
        match common::create_device() {
            Some(dq) => dq,
            None => {
                eprintln!("no GPU adapter available, skipping");
                return;
            }
        }
    };
}
