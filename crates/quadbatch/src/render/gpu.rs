//! GPU context: wgpu device and queue without a window.
//!
//! [`GpuContext`] owns the wgpu primitives the [`WgpuDevice`](super::WgpuDevice)
//! renders with. It is created headless: no surface is involved, so it works
//! in tools, tests and servers with a GPU but no display. Presenting to a
//! window is left to the host application.

use crate::error::{DeviceError, DeviceResult};

/// Wraps the wgpu device and queue plus the adapter they came from.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    features: wgpu::Features,
}

impl GpuContext {
    /// Pick the default adapter and open a device on it.
    ///
    /// Wireframe rasterization is requested when the adapter supports it.
    pub fn headless() -> DeviceResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|_| DeviceError::AdapterUnavailable)?;

        let features = adapter.features() & wgpu::Features::POLYGON_MODE_LINE;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("quadbatch device"),
            required_features: features,
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e| DeviceError::RequestDevice(e.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "GPU context ready: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            features,
        })
    }

    /// Whether `RasterizerMode::Wireframe` can be honoured.
    pub fn supports_wireframe(&self) -> bool {
        self.features.contains(wgpu::Features::POLYGON_MODE_LINE)
    }
}
