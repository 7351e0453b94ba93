//! Multi-page atlas: a new page opens when the current ones are full.
//!
//! Each page is a [`RectanglePacker`]. A page's index doubles as the layer
//! of a texture array and as the `atlas_index` passed to
//! [`DrawParams::atlas_index`](crate::sprite::DrawParams::atlas_index), so a
//! batch using [`AtlasSpriteVertex`](crate::sprite::AtlasSpriteVertex) can
//! draw sprites from every page in one texture run.

use image::RgbaImage;

use super::packer::RectanglePacker;
use crate::config::AtlasConfig;
use crate::error::{AtlasError, AtlasResult};
use crate::math::AtlasRect;
use crate::render::{RenderDevice, Texture, TextureDesc};

/// Where a named image lives across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLocation {
    pub page: u32,
    pub rect: AtlasRect,
}

/// A growing list of equally sized atlas pages.
pub struct AtlasPages {
    config: AtlasConfig,
    max_pages: u32,
    pages: Vec<RectanglePacker>,
}

impl AtlasPages {
    /// Start with one page. At most `max_pages` pages are ever opened.
    pub fn new(config: AtlasConfig, max_pages: u32) -> AtlasResult<Self> {
        let max_pages = max_pages.max(1);
        let pages = vec![RectanglePacker::new(&config)?];
        Ok(Self {
            config,
            max_pages,
            pages,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn page(&self, index: u32) -> Option<&RectanglePacker> {
        self.pages.get(index as usize)
    }

    pub fn pages(&self) -> &[RectanglePacker] {
        &self.pages
    }

    pub fn try_get(&self, name: &str) -> Option<AtlasLocation> {
        self.pages.iter().enumerate().find_map(|(page, packer)| {
            packer.try_get_rectangle(name).map(|rect| AtlasLocation {
                page: page as u32,
                rect,
            })
        })
    }

    /// Add `image` to the first page with room, opening a page if none has.
    pub fn add_texture(&mut self, image: &RgbaImage, name: &str) -> AtlasResult<AtlasLocation> {
        if let Some(location) = self.try_get(name) {
            return Ok(location);
        }

        for (page, packer) in self.pages.iter().enumerate() {
            match packer.add_texture(image, name) {
                Ok(rect) => {
                    return Ok(AtlasLocation {
                        page: page as u32,
                        rect,
                    });
                }
                Err(AtlasError::NoSpace { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        if self.pages.len() as u32 >= self.max_pages {
            let (width, height) = image.dimensions();
            return Err(AtlasError::NoSpace { width, height });
        }

        let packer = RectanglePacker::new(&self.config)?;
        let rect = packer.add_texture(image, name)?;
        self.pages.push(packer);
        let page = self.pages.len() as u32 - 1;
        log::info!("atlas: opened page {page} for '{name}'");
        Ok(AtlasLocation { page, rect })
    }

    /// Remove `name` from whichever page holds it. Pages are never closed.
    pub fn remove_texture(&self, name: &str) -> bool {
        self.pages.iter().any(|packer| packer.remove_texture(name))
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(RectanglePacker::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(RectanglePacker::is_empty)
    }

    /// Create a texture array with one layer per possible page.
    pub fn create_texture_array<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        label: &str,
    ) -> AtlasResult<Texture> {
        let (width, height) = self.config.clamped_size();
        let texture = device.create_texture(&TextureDesc::empty(label, width, height, self.max_pages))?;
        for page in &self.pages {
            page.mark_all_dirty();
        }
        self.upload(device, texture)?;
        Ok(texture)
    }

    /// Upload every page's dirty regions into its layer of `texture`.
    pub fn upload<D: RenderDevice + ?Sized>(&self, device: &mut D, texture: Texture) -> AtlasResult<usize> {
        let mut written = 0;
        for (layer, page) in self.pages.iter().enumerate() {
            written += page.upload(device, texture, layer as u32)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingDevice;
    use crate::sprite::AtlasSpriteVertex;

    fn config() -> AtlasConfig {
        AtlasConfig {
            width: 34,
            height: 34,
            min_dimension: 4,
            max_dimension: 64,
        }
    }

    fn tile(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(16, 16, image::Rgba([value, value, value, 255]))
    }

    #[test]
    fn full_page_opens_the_next_one() {
        let mut pages = AtlasPages::new(config(), 3).unwrap();
        for i in 0..4 {
            assert_eq!(pages.add_texture(&tile(1), &format!("t{i}")).unwrap().page, 0);
        }
        let fifth = pages.add_texture(&tile(2), "t4").unwrap();
        assert_eq!(fifth, AtlasLocation { page: 1, rect: AtlasRect::new(1, 1, 16, 16) });
        assert_eq!(pages.page_count(), 2);
        assert_eq!(pages.try_get("t4"), Some(fifth));
        assert_eq!(pages.len(), 5);
    }

    #[test]
    fn page_limit_reports_no_space() {
        let mut pages = AtlasPages::new(config(), 1).unwrap();
        for i in 0..4 {
            pages.add_texture(&tile(1), &format!("t{i}")).unwrap();
        }
        assert!(matches!(
            pages.add_texture(&tile(1), "t4"),
            Err(AtlasError::NoSpace { .. })
        ));
        assert_eq!(pages.page_count(), 1);
    }

    #[test]
    fn freed_space_on_an_early_page_is_preferred() {
        let mut pages = AtlasPages::new(config(), 2).unwrap();
        for i in 0..5 {
            pages.add_texture(&tile(1), &format!("t{i}")).unwrap();
        }
        assert!(pages.remove_texture("t1"));
        let location = pages.add_texture(&tile(3), "again").unwrap();
        assert_eq!(location.page, 0);
    }

    #[test]
    fn texture_array_gets_one_layer_per_page() {
        let mut device = RecordingDevice::<AtlasSpriteVertex>::new();
        let mut pages = AtlasPages::new(config(), 2).unwrap();
        for i in 0..5 {
            pages.add_texture(&tile(10 * i as u8 + 10), &format!("t{i}")).unwrap();
        }
        let texture = pages.create_texture_array(&mut device, "atlas").unwrap();
        assert_eq!(texture.layers(), 2);

        let pixels = device.pixels(texture).unwrap();
        assert_eq!(pixels.pixel(0, 1, 1), [10, 10, 10, 255]);
        assert_eq!(pixels.pixel(1, 1, 1), [50, 50, 50, 255]);
        assert_eq!(pages.upload(&mut device, texture).unwrap(), 0);
    }
}
