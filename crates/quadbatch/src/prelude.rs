//! Convenience re-exports: `use quadbatch::prelude::*` for the common items.

pub use crate::atlas::{AtlasLocation, AtlasPages, RectanglePacker};
pub use crate::config::{AtlasConfig, BatchConfig};
pub use crate::error::{AtlasError, BatchError, DeviceError};
pub use crate::logging::init_logger;
pub use crate::math::{AtlasRect, Mat4, Rect, Vec2, Vec3, Vec4};
pub use crate::render::{
    DefaultResources, RecordingDevice, RenderDevice, SharedDevice, Texture, TextureDesc,
    TextureHandle, share,
};
#[cfg(feature = "wgpu-backend")]
pub use crate::render::{GpuContext, WgpuDevice};
pub use crate::sprite::{
    AtlasSpriteVertex, BeginParams, BlendMode, Color, DepthMode, Destination, DrawParams,
    FlushStats, Glyph, GlyphGrid, GlyphProvider, RasterizerMode, SamplerMode, ScissorRect,
    SortPolicy, SpriteBatch, SpriteEffects, SpriteVertex,
};
