//! Per-frame state captured by `begin`: sort policy, render-state overrides,
//! matrices, and scissor.

use serde::{Deserialize, Serialize};

use crate::math::Mat4;

/// How queued sprites are ordered before flushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortPolicy {
    /// No sort. Draw calls break wherever consecutive sprites change texture.
    #[default]
    SubmissionOrder,
    /// Group by texture identity to minimise draw calls. Depth is ignored.
    ByTexture,
    /// Descending depth: farthest first.
    BackToFront,
    /// Ascending depth: nearest first.
    FrontToBack,
}

impl SortPolicy {
    /// Whether `end` needs to run the sorter for this policy.
    pub fn needs_sort(self) -> bool {
        self != SortPolicy::SubmissionOrder
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Premultiplied alpha.
    #[default]
    AlphaBlend,
    Additive,
    Opaque,
    /// Straight (non-premultiplied) alpha.
    NonPremultiplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthMode {
    #[default]
    None,
    Read,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RasterizerMode {
    /// 2D sprites are double-sided.
    #[default]
    CullNone,
    CullBack,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SamplerMode {
    #[default]
    LinearClamp,
    PointClamp,
    LinearWrap,
    PointWrap,
}

/// The fixed-function state a batch renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RenderState {
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub rasterizer: RasterizerMode,
    pub sampler: SamplerMode,
}

/// Scissor rectangle in render-target pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Arguments to [`SpriteBatch::begin`](super::SpriteBatch::begin). Every
/// override left as `None` falls back to the default state.
#[derive(Debug, Clone, Default)]
pub struct BeginParams {
    pub sort: SortPolicy,
    pub blend: Option<BlendMode>,
    pub depth: Option<DepthMode>,
    pub rasterizer: Option<RasterizerMode>,
    pub sampler: Option<SamplerMode>,
    /// World transform applied before the view.
    pub transform: Option<Mat4>,
    pub view: Option<Mat4>,
    pub scissor: Option<ScissorRect>,
}

impl BeginParams {
    pub fn new(sort: SortPolicy) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = Some(blend);
        self
    }

    pub fn sampler(mut self, sampler: SamplerMode) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn transform(mut self, transform: Mat4) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn view(mut self, view: Mat4) -> Self {
        self.view = Some(view);
        self
    }

    pub fn scissor(mut self, scissor: ScissorRect) -> Self {
        self.scissor = Some(scissor);
        self
    }

    pub(crate) fn render_state(&self) -> RenderState {
        let default = RenderState::default();
        RenderState {
            blend: self.blend.unwrap_or(default.blend),
            depth: self.depth.unwrap_or(default.depth),
            rasterizer: self.rasterizer.unwrap_or(default.rasterizer),
            sampler: self.sampler.unwrap_or(default.sampler),
        }
    }
}

/// Everything the device needs to bind before the frame's first draw.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub render_state: RenderState,
    pub projection: Mat4,
    pub view: Mat4,
    pub transform: Mat4,
    pub scissor: Option<ScissorRect>,
}

impl FrameState {
    /// `projection * view * transform`.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view * self.transform
    }
}

/// Orthographic projection for a `width × height` viewport with the origin
/// at the top-left and Y pointing down. Depth `[0, 1]` maps to clip `[0, 1]`.
pub fn screen_projection(width: u32, height: u32) -> Mat4 {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    Mat4::orthographic_lh(0.0, w, h, 0.0, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn projection_maps_corners_to_clip_space() {
        let proj = screen_projection(800, 600);
        let top_left = proj.project_point3(Vec3::new(0.0, 0.0, 0.0));
        let bottom_right = proj.project_point3(Vec3::new(800.0, 600.0, 1.0));
        assert!((top_left.x + 1.0).abs() < 1e-6);
        assert!((top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y + 1.0).abs() < 1e-6);
        assert!((bottom_right.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_viewport_does_not_produce_nan() {
        let proj = screen_projection(0, 0);
        assert!(proj.is_finite());
    }

    #[test]
    fn overrides_fall_back_to_defaults() {
        let params = BeginParams::new(SortPolicy::BackToFront).blend(BlendMode::Additive);
        let state = params.render_state();
        assert_eq!(state.blend, BlendMode::Additive);
        assert_eq!(state.sampler, SamplerMode::LinearClamp);
        assert_eq!(state.depth, DepthMode::None);
    }
}
