//! Rendering seam: texture handles, the device trait, and its backends.
//!
//! The batch engine and the atlas only see [`RenderDevice`].
//! [`RecordingDevice`] renders nothing and records everything;
//! `WgpuDevice` (feature `wgpu-backend`) draws on a real GPU.

pub mod device;
pub mod recording;
pub mod texture;

#[cfg(feature = "wgpu-backend")]
pub mod gpu;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_device;

pub use device::{DefaultResources, RenderDevice, SharedDevice, TextureDesc, share};
pub use recording::{DrawCall, RecordingDevice, TexturePixels};
pub use texture::{Texture, TextureHandle, TextureTable};

#[cfg(feature = "wgpu-backend")]
pub use gpu::GpuContext;
#[cfg(feature = "wgpu-backend")]
pub use wgpu_device::{GpuVertex, WgpuDevice};
