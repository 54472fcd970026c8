/// Errors from bringing up a GPU device without a window.
#[derive(Debug, thiserror::Error)]
pub enum GpuInitError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// A device and queue with no surface attached.
pub struct HeadlessGpu {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

/// Request a device suitable for uploading terrain buffers.
///
/// Blocks on the adapter and device futures with `pollster`.
pub fn request_headless_device() -> Result<HeadlessGpu, GpuInitError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or(GpuInitError::NoAdapter)?;

    let adapter_info = adapter.get_info();
    tracing::info!(adapter = %adapter_info.name, backend = ?adapter_info.backend, "gpu adapter selected");

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("voxstream_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        },
        None,
    ))?;

    Ok(HeadlessGpu {
        device,
        queue,
        adapter_info,
    })
}
