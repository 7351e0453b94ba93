//! # Quadbatch — 2D Sprite Batching and Runtime Texture Atlases
//!
//! Draw thousands of textured quads per frame with a handful of GPU draw
//! calls, and pack many small images onto shared atlas textures at runtime.
//!
//! ```text
//!  begin ─► draw / draw_ex / draw_text … ─► end
//!                                            │ sort (by texture, depth)
//!                                            │ split into texture runs
//!                                            ▼
//!                                   RenderDevice (wgpu or recording)
//! ```
//!
//! Start with `use quadbatch::prelude::*`, wrap a device with
//! [`render::share`], and create a [`SpriteBatch`](sprite::SpriteBatch).

pub mod atlas;
pub mod config;
pub mod error;
pub mod logging;
pub mod math;
pub mod prelude;
pub mod render;
pub mod sprite;
