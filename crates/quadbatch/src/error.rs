//! Error types.
//!
//! Failures fall into three groups and each group has a home here:
//!
//! - **Usage-sequence errors** (`draw` without `begin`, nested `begin`,
//!   `end` without `begin`) are programmer mistakes. They fail the call
//!   immediately as a [`BatchError`] and are never retried.
//! - **Resource-capacity errors** (an image larger than the atlas, or no
//!   free rectangle left) come back as an [`AtlasError`] so the caller can
//!   decide whether to skip the asset or open another page.
//! - **Configuration errors** (a batch size whose indices would overflow the
//!   16-bit index buffer, atlas bounds out of order) fail construction of
//!   the batch engine or the atlas page.
//!
//! GPU backend failures are grouped under [`DeviceError`].

use thiserror::Error;

use crate::math::AtlasRect;
use crate::render::TextureHandle;

/// Errors raised by the sprite batch engine.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("begin called while a batch is already recording")]
    AlreadyRecording,

    #[error("{operation} called without a matching begin")]
    NotRecording { operation: &'static str },

    #[error(
        "max batch size {max_batch_size} needs {index_count} indices, \
         which exceeds the 16-bit index range"
    )]
    IndexRangeExceeded {
        max_batch_size: usize,
        index_count: usize,
    },

    #[error("invalid batch configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors raised by the texture atlas packer.
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("image {width}x{height} does not fit a {canvas_width}x{canvas_height} atlas")]
    ImageTooLarge {
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },

    #[error("no free {width}x{height} region left in the atlas")]
    NoSpace { width: u32, height: u32 },

    #[error("invalid atlas configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to read image stream: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors raised by a [`RenderDevice`](crate::render::RenderDevice).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("texture {0:?} is not (or no longer) registered with the device")]
    UnknownTexture(TextureHandle),

    #[error("texture data is {actual} bytes, expected {expected}")]
    TextureDataSize { expected: usize, actual: usize },

    #[error("no suitable GPU adapter found")]
    AdapterUnavailable,

    #[error("failed to create GPU device: {0}")]
    RequestDevice(String),

    #[error("texture region {region:?} is outside a {width}x{height}x{layers} texture")]
    RegionOutOfBounds {
        region: AtlasRect,
        width: u32,
        height: u32,
        layers: u32,
    },

    #[error("no render target set")]
    NoTarget,

    #[error("draws submitted before any index buffer was uploaded")]
    NoIndexBuffer,

    #[error("failed to read back the render target: {0}")]
    Readback(String),
}

/// Convenience alias for batch engine results.
pub type BatchResult<T> = Result<T, BatchError>;

/// Convenience alias for atlas results.
pub type AtlasResult<T> = Result<T, AtlasError>;

/// Convenience alias for device results.
pub type DeviceResult<T> = Result<T, DeviceError>;
