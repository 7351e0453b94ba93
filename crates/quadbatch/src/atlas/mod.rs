//! # Atlas — Runtime Texture Packing
//!
//! Many small images packed onto one large canvas, so sprites that use them
//! share a texture and therefore a draw call.
//!
//! ```text
//!  add_texture(image, "coin") ──► RectanglePacker ──► AtlasRect (1, 1, 16, 16)
//!                                       │
//!                              canvas (CPU, RGBA8) ──upload──► GPU texture
//!                                                               │
//!  batch.draw_ex(atlas_texture, DrawParams::new(dst).source(rect.into()))
//! ```
//!
//! ## Design Decisions
//!
//! - **Incremental, not offline.** Images are added and removed while the
//!   game runs. Placement is a first-fit scan; there is no repacking step.
//! - **CPU canvas is the source of truth.** The GPU texture is only updated
//!   from dirty regions, so add and remove never touch the device.
//! - **One-pixel border.** Nothing is placed on the canvas edge, which keeps
//!   clamped samples at the edge transparent.
//!
//! ## Comparison
//!
//! | Feature             | MaxRects packers      | This packer                 |
//! |---------------------|-----------------------|-----------------------------|
//! | Placement           | best short-side fit   | first fit, row-major scan   |
//! | Removal             | usually unsupported   | supported, space reused     |
//! | Thread safety       | caller's problem      | `&self` add/remove/lookup   |
//! | Pages               | fixed                 | [`AtlasPages`] grows on demand |

pub mod packer;
pub mod pages;

pub use packer::{RectanglePacker, find_free_location};
pub use pages::{AtlasLocation, AtlasPages};
