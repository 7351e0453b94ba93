//! # Text — Glyph Runs Through the Sprite Path
//!
//! The engine does not parse fonts. A font is anything that implements
//! [`GlyphProvider`]: one texture holding every glyph, a line height, and a
//! lookup from `char` to the glyph's source rectangle and metrics.
//! [`SpriteBatch::draw_text`] lays a string out left to right and queues one
//! sprite per visible glyph, so a whole string from one font is a single
//! texture run and usually a single draw call.
//!
//! ```text
//!  cursor ──► ┌───┐┌───┐    ┌───┐
//!             │ H ││ i │ ␠  │ ! │      advance + kerning moves the cursor
//!             └───┘└───┘    └───┘      '\n' returns to the start column
//!  cursor ──► ┌───┐                    and drops one line height
//!             │ : │
//! ```
//!
//! [`GlyphGrid`] is a ready-made provider for fixed-cell bitmap fonts laid
//! out row by row, the same packing the engine's own debug fonts use.

use super::batch::{DrawParams, SpriteBatch};
use super::Color;
use crate::error::BatchResult;
use crate::math::{Rect, Vec2};
use crate::render::{RenderDevice, Texture};

/// Placement data for one glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    /// Region of the font texture, in texels.
    pub source: Rect,
    /// Offset from the pen position to the glyph's top-left corner.
    pub offset: Vec2,
    /// Horizontal pen advance after this glyph.
    pub advance: f32,
}

/// Font metrics supplied by an external font loader.
pub trait GlyphProvider {
    /// Texture every glyph is sampled from.
    fn texture(&self) -> Texture;

    /// Distance between baselines.
    fn line_height(&self) -> f32;

    fn glyph(&self, ch: char) -> Option<Glyph>;

    /// Extra advance between a pair of characters.
    fn kerning(&self, _left: char, _right: char) -> f32 {
        0.0
    }

    /// Substitute for characters the font lacks. `None` skips them.
    fn fallback(&self) -> Option<char> {
        None
    }
}

impl<D: RenderDevice> SpriteBatch<D> {
    /// Queue `text` with its top-left pen position at `position`.
    pub fn draw_text<F: GlyphProvider + ?Sized>(
        &mut self,
        font: &F,
        text: &str,
        position: Vec2,
        color: Color,
        depth: f32,
    ) -> BatchResult<()> {
        let texture = font.texture();
        let mut pen = position;
        let mut previous: Option<char> = None;

        for ch in text.chars() {
            match ch {
                '\r' => continue,
                '\n' => {
                    pen.x = position.x;
                    pen.y += font.line_height();
                    previous = None;
                    continue;
                }
                _ => {}
            }

            let Some(glyph) = font
                .glyph(ch)
                .or_else(|| font.fallback().and_then(|c| font.glyph(c)))
            else {
                continue;
            };

            if let Some(left) = previous {
                pen.x += font.kerning(left, ch);
            }

            if glyph.source.width > 0.0 && glyph.source.height > 0.0 {
                let params = DrawParams::at(pen + glyph.offset)
                    .source(glyph.source)
                    .color(color)
                    .depth(depth)
                    .texel_inset(true);
                self.draw_ex(texture, &params)?;
            }

            pen.x += glyph.advance;
            previous = Some(ch);
        }
        Ok(())
    }
}

/// Fixed-cell bitmap font: `columns` cells per row starting at `first`.
#[derive(Debug, Clone, Copy)]
pub struct GlyphGrid {
    pub texture: Texture,
    pub cell_width: u32,
    pub cell_height: u32,
    pub columns: u32,
    pub first: char,
    pub count: u32,
}

impl GlyphGrid {
    /// Printable ASCII (`' '..='~'`) laid out in `columns` columns.
    pub fn ascii(texture: Texture, cell_width: u32, cell_height: u32, columns: u32) -> Self {
        Self {
            texture,
            cell_width,
            cell_height,
            columns: columns.max(1),
            first: ' ',
            count: 95,
        }
    }
}

impl GlyphProvider for GlyphGrid {
    fn texture(&self) -> Texture {
        self.texture
    }

    fn line_height(&self) -> f32 {
        self.cell_height as f32
    }

    fn glyph(&self, ch: char) -> Option<Glyph> {
        let index = (ch as u32).checked_sub(self.first as u32)?;
        if index >= self.count {
            return None;
        }
        let column = index % self.columns;
        let row = index / self.columns;
        Some(Glyph {
            source: Rect::new(
                (column * self.cell_width) as f32,
                (row * self.cell_height) as f32,
                self.cell_width as f32,
                self.cell_height as f32,
            ),
            offset: Vec2::ZERO,
            advance: self.cell_width as f32,
        })
    }

    fn fallback(&self) -> Option<char> {
        Some('?')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::render::{DefaultResources, RecordingDevice, TextureDesc, share};
    use crate::sprite::state::BeginParams;
    use crate::sprite::SpriteVertex;

    /// Three glyphs; 'A' and 'V' kern together, ' ' has no pixels.
    struct TinyFont {
        texture: Texture,
    }

    impl GlyphProvider for TinyFont {
        fn texture(&self) -> Texture {
            self.texture
        }

        fn line_height(&self) -> f32 {
            12.0
        }

        fn glyph(&self, ch: char) -> Option<Glyph> {
            let x = match ch {
                'A' => 0.0,
                'V' => 8.0,
                ' ' => {
                    return Some(Glyph {
                        source: Rect::new(0.0, 0.0, 0.0, 0.0),
                        offset: Vec2::ZERO,
                        advance: 4.0,
                    });
                }
                _ => return None,
            };
            Some(Glyph {
                source: Rect::new(x, 0.0, 8.0, 10.0),
                offset: Vec2::new(1.0, 2.0),
                advance: 9.0,
            })
        }

        fn kerning(&self, left: char, right: char) -> f32 {
            if (left, right) == ('A', 'V') { -2.0 } else { 0.0 }
        }
    }

    fn batch_with_font() -> (SpriteBatch<RecordingDevice>, Texture) {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let defaults = DefaultResources::new(&mut device).unwrap();
        let texture = device
            .create_texture(&TextureDesc::empty("font", 16, 16, 1))
            .unwrap();
        let batch = SpriteBatch::new(share(device), defaults, BatchConfig::default(), (100, 100))
            .unwrap();
        (batch, texture)
    }

    fn quad_origins(batch: &SpriteBatch<RecordingDevice>) -> Vec<[f32; 2]> {
        batch.device().lock().draws()[0]
            .vertices
            .chunks(4)
            .map(|q| [q[0].position[0], q[0].position[1]])
            .collect()
    }

    #[test]
    fn glyphs_advance_kern_and_wrap() {
        let (mut batch, texture) = batch_with_font();
        let font = TinyFont { texture };
        batch.begin(BeginParams::default()).unwrap();
        batch
            .draw_text(&font, "AV A\nV?", Vec2::new(10.0, 20.0), Color::WHITE, 0.0)
            .unwrap();
        let stats = batch.end().unwrap();

        // Space and the unknown '?' emit nothing; one texture, one draw.
        assert_eq!(stats.sprites, 4);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(
            quad_origins(&batch),
            vec![[11.0, 22.0], [18.0, 22.0], [31.0, 22.0], [11.0, 34.0]]
        );
    }

    #[test]
    fn glyph_sources_are_texel_inset() {
        let (mut batch, texture) = batch_with_font();
        let font = TinyFont { texture };
        batch.begin(BeginParams::default()).unwrap();
        batch
            .draw_text(&font, "V", Vec2::ZERO, Color::WHITE, 0.0)
            .unwrap();
        batch.end().unwrap();

        let device = batch.device().lock();
        let v = &device.draws()[0].vertices;
        // Destination keeps the full cell size.
        assert_eq!(v[2].position[..2], [9.0, 12.0]);
        assert_eq!(v[0].uv, [8.5 / 16.0, 0.5 / 16.0]);
        assert_eq!(v[2].uv, [15.5 / 16.0, 9.5 / 16.0]);
    }

    #[test]
    fn grid_maps_ascii_cells() {
        let (_, texture) = batch_with_font();
        let grid = GlyphGrid::ascii(texture, 8, 8, 16);
        let a = grid.glyph('A').unwrap();
        // 'A' is index 33: row 2, column 1.
        assert_eq!(a.source, Rect::new(8.0, 16.0, 8.0, 8.0));
        assert!(grid.glyph('\u{7f}').is_none());
        assert!(grid.glyph('\t').is_none());
        assert_eq!(grid.fallback(), Some('?'));
    }
}
