//! # Packer — Named Rectangles on One Atlas Canvas
//!
//! A [`RectanglePacker`] owns a fixed-size RGBA canvas and hands out
//! non-overlapping rectangles on it, one per asset name. The image is blitted
//! into its rectangle immediately; the GPU copy is brought up to date with
//! [`RectanglePacker::upload`].
//!
//! ```text
//!  (0,0) ┌──────────────────────────────────────┐
//!        │ 1-px border, never allocated          │
//!        │ ┌──────┐┌──────┐┌──────┐              │
//!        │ │  a   ││  b   ││  c   │ ──► scan     │
//!        │ └──────┘└──────┘└──────┘              │
//!        │                                       │
//!        │   usable area: [1, w-1) × [1, h-1)    │
//!        └──────────────────────────────────────┘ (w,h)
//! ```
//!
//! ## Free-Location Scan
//!
//! Rows are scanned top to bottom and positions left to right. When the
//! candidate at `(x, y)` overlaps an allocated rectangle, `x` jumps straight
//! past that rectangle's right edge instead of advancing one column. Each
//! overlap also lowers `ymin`, the smallest bottom edge among rectangles that
//! blocked this row. When the row runs out, `y` jumps to `ymin`: every
//! blocker is still in the way on the rows in between, so none of them can
//! hold the image.
//!
//! ## Locking
//!
//! ```text
//!  rects   RwLock<HashMap<name, AtlasRect>>   lookups share, add/remove exclusive
//!  canvas  Mutex<RgbaImage>                   blit and clear
//!  dirty   Mutex<Vec<AtlasRect>>              regions waiting for upload
//! ```
//!
//! Locks are always taken in that order. `add_texture` holds the map's write
//! lock from the search through the blit, so two threads can never be handed
//! the same free space.
//!
//! Freed rectangles are not merged with their neighbours. The scan simply
//! finds them again when a later image fits.

use std::collections::HashMap;
use std::io::Read;

use image::RgbaImage;
use parking_lot::{Mutex, RwLock};

use crate::config::AtlasConfig;
use crate::error::{AtlasError, AtlasResult};
use crate::math::AtlasRect;
use crate::render::{RenderDevice, Texture, TextureDesc};

/// Border kept free on every side of the canvas.
const BORDER: u32 = 1;

/// A single atlas page.
pub struct RectanglePacker {
    width: u32,
    height: u32,
    rects: RwLock<HashMap<String, AtlasRect>>,
    canvas: Mutex<RgbaImage>,
    dirty: Mutex<Vec<AtlasRect>>,
}

impl RectanglePacker {
    /// Create an empty page. The requested size is clamped to the config's
    /// bounds; bounds that are out of order are rejected.
    pub fn new(config: &AtlasConfig) -> AtlasResult<Self> {
        config.validate()?;
        let (width, height) = config.clamped_size();
        log::debug!("atlas page created: {width}x{height}");
        Ok(Self {
            width,
            height,
            rects: RwLock::new(HashMap::new()),
            canvas: Mutex::new(RgbaImage::new(width, height)),
            dirty: Mutex::new(Vec::new()),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The rectangle allocated to `name`, if any.
    pub fn try_get_rectangle(&self, name: &str) -> Option<AtlasRect> {
        self.rects.read().get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rects.read().contains_key(name)
    }

    /// Allocate space for `image` under `name` and blit it.
    ///
    /// Adding a name that is already present returns its existing rectangle
    /// and leaves the canvas untouched.
    pub fn add_texture(&self, image: &RgbaImage, name: &str) -> AtlasResult<AtlasRect> {
        let (width, height) = image.dimensions();
        let mut rects = self.rects.write();
        if let Some(rect) = rects.get(name) {
            return Ok(*rect);
        }

        if width > self.width - 2 * BORDER || height > self.height - 2 * BORDER {
            log::warn!(
                "atlas: '{name}' ({width}x{height}) exceeds a {}x{} canvas",
                self.width,
                self.height
            );
            return Err(AtlasError::ImageTooLarge {
                width,
                height,
                canvas_width: self.width,
                canvas_height: self.height,
            });
        }

        let Some((x, y)) = find_free_location(rects.values(), self.width, self.height, width, height)
        else {
            log::warn!("atlas: no free {width}x{height} region for '{name}'");
            return Err(AtlasError::NoSpace { width, height });
        };

        let rect = AtlasRect::new(x, y, width, height);
        rects.insert(name.to_owned(), rect);
        image::imageops::replace(&mut *self.canvas.lock(), image, x as i64, y as i64);
        self.dirty.lock().push(rect);

        log::debug!("atlas: '{name}' placed at {rect:?}");
        Ok(rect)
    }

    /// Decode an encoded image (PNG, JPEG) and add it.
    ///
    /// A name that is already present returns early without decoding.
    pub fn add_texture_from_bytes(&self, bytes: &[u8], name: &str) -> AtlasResult<AtlasRect> {
        if let Some(rect) = self.try_get_rectangle(name) {
            return Ok(rect);
        }
        let image = image::load_from_memory(bytes)?.to_rgba8();
        self.add_texture(&image, name)
    }

    /// Read an encoded image from `reader` and add it.
    pub fn add_texture_from_reader<R: Read>(&self, mut reader: R, name: &str) -> AtlasResult<AtlasRect> {
        if let Some(rect) = self.try_get_rectangle(name) {
            return Ok(rect);
        }
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.add_texture_from_bytes(&bytes, name)
    }

    /// Free `name`'s rectangle and paint it transparent.
    ///
    /// Removing a name that was never added is a no-op. Returns whether a
    /// rectangle was freed.
    pub fn remove_texture(&self, name: &str) -> bool {
        let mut rects = self.rects.write();
        let Some(rect) = rects.remove(name) else {
            return false;
        };

        let mut canvas = self.canvas.lock();
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                canvas.put_pixel(x, y, image::Rgba([0, 0, 0, 0]));
            }
        }
        drop(canvas);
        self.dirty.lock().push(rect);

        log::debug!("atlas: '{name}' removed from {rect:?}");
        true
    }

    pub fn len(&self) -> usize {
        self.rects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.read().is_empty()
    }

    /// Allocated names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rects.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Texels covered by allocated rectangles.
    pub fn used_area(&self) -> u64 {
        self.rects.read().values().map(AtlasRect::area).sum()
    }

    /// One canvas texel, or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let canvas = self.canvas.lock();
        (x < self.width && y < self.height).then(|| canvas.get_pixel(x, y).0)
    }

    /// Drain the regions changed since the last upload.
    pub fn take_dirty(&self) -> Vec<AtlasRect> {
        std::mem::take(&mut *self.dirty.lock())
    }

    /// Queue the whole canvas for the next upload.
    pub fn mark_all_dirty(&self) {
        let mut dirty = self.dirty.lock();
        dirty.clear();
        dirty.push(AtlasRect::new(0, 0, self.width, self.height));
    }

    /// Create a GPU texture holding the whole canvas. Pending dirty regions
    /// are cleared because the new texture already contains them.
    pub fn create_texture<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        label: &str,
    ) -> AtlasResult<Texture> {
        let canvas = self.canvas.lock();
        let texture = device.create_texture(&TextureDesc::rgba(
            label,
            self.width,
            self.height,
            canvas.as_raw(),
        ))?;
        self.dirty.lock().clear();
        Ok(texture)
    }

    /// Write every dirty region into `layer` of `texture`. Returns the
    /// number of regions written.
    pub fn upload<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        texture: Texture,
        layer: u32,
    ) -> AtlasResult<usize> {
        let dirty = self.take_dirty();
        let canvas = self.canvas.lock();
        let mut written = 0;
        for rect in dirty.iter().filter(|r| r.area() > 0) {
            let region =
                image::imageops::crop_imm(&*canvas, rect.x, rect.y, rect.width, rect.height)
                    .to_image();
            device.write_texture_region(texture, layer, *rect, region.as_raw())?;
            written += 1;
        }
        if written > 0 {
            log::trace!("atlas: uploaded {written} dirty regions to layer {layer}");
        }
        Ok(written)
    }
}

/// First free top-left corner for a `width × height` image, scanning rows
/// top to bottom and columns left to right inside the border.
pub fn find_free_location<'a, I>(
    allocated: I,
    canvas_width: u32,
    canvas_height: u32,
    width: u32,
    height: u32,
) -> Option<(u32, u32)>
where
    I: IntoIterator<Item = &'a AtlasRect>,
    I::IntoIter: Clone,
{
    let allocated = allocated.into_iter();
    let right_limit = canvas_width.checked_sub(BORDER)?;
    let bottom_limit = canvas_height.checked_sub(BORDER)?;

    let mut y = BORDER;
    while y + height <= bottom_limit {
        let mut ymin = bottom_limit;
        let mut x = BORDER;
        while x + width <= right_limit {
            let candidate = AtlasRect::new(x, y, width, height);
            match allocated.clone().find(|r| r.intersects(&candidate)) {
                None => return Some((x, y)),
                Some(blocker) => {
                    ymin = ymin.min(blocker.bottom());
                    x = blocker.right();
                }
            }
        }
        // Every blocker ends below `y`, so this always moves down.
        y = ymin.max(y + 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::render::RecordingDevice;
    use crate::sprite::SpriteVertex;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba(rgba))
    }

    fn small_config(size: u32) -> AtlasConfig {
        AtlasConfig {
            width: size,
            height: size,
            min_dimension: 4,
            max_dimension: 8192,
        }
    }

    #[test]
    fn first_images_fill_the_top_row() {
        let packer = RectanglePacker::new(&AtlasConfig::default()).unwrap();
        assert_eq!(packer.dimensions(), (2048, 2048));
        let image = solid(64, 64, [255, 0, 0, 255]);
        assert_eq!(packer.add_texture(&image, "a").unwrap(), AtlasRect::new(1, 1, 64, 64));
        assert_eq!(packer.add_texture(&image, "b").unwrap(), AtlasRect::new(65, 1, 64, 64));
        assert_eq!(packer.add_texture(&image, "c").unwrap(), AtlasRect::new(129, 1, 64, 64));
    }

    #[test]
    fn adding_a_name_twice_is_idempotent() {
        let packer = RectanglePacker::new(&AtlasConfig::default()).unwrap();
        let first = packer.add_texture(&solid(10, 20, [1, 2, 3, 4]), "hero").unwrap();
        let second = packer.add_texture(&solid(99, 99, [9, 9, 9, 9]), "hero").unwrap();
        assert_eq!(first, second);
        assert_eq!(packer.len(), 1);
        assert_eq!(packer.used_area(), 200);
        // The second image was never blitted.
        assert_eq!(packer.pixel(1, 1), Some([1, 2, 3, 4]));
    }

    #[test]
    fn images_wider_than_the_canvas_always_fail() {
        let packer = RectanglePacker::new(&small_config(64)).unwrap();
        let (w, h) = packer.dimensions();
        for image in [solid(w + 1, h, [0; 4]), solid(w, h + 1, [0; 4]), solid(w - 1, 1, [0; 4])] {
            assert!(matches!(
                packer.add_texture(&image, "big"),
                Err(AtlasError::ImageTooLarge { .. })
            ));
        }
        // Exactly the usable area fits.
        assert_eq!(
            packer.add_texture(&solid(w - 2, h - 2, [0; 4]), "fits").unwrap(),
            AtlasRect::new(1, 1, w - 2, h - 2)
        );
    }

    #[test]
    fn full_canvas_reports_no_space() {
        let packer = RectanglePacker::new(&small_config(34)).unwrap();
        // 32x32 usable area holds four 16x16 tiles.
        for i in 0..4 {
            packer.add_texture(&solid(16, 16, [0; 4]), &format!("t{i}")).unwrap();
        }
        assert!(matches!(
            packer.add_texture(&solid(16, 16, [0; 4]), "t4"),
            Err(AtlasError::NoSpace { width: 16, height: 16 })
        ));
    }

    #[test]
    fn scan_jumps_below_the_shortest_blocker() {
        let packer = RectanglePacker::new(&small_config(66)).unwrap();
        packer.add_texture(&solid(32, 10, [0; 4]), "short").unwrap();
        packer.add_texture(&solid(32, 40, [0; 4]), "tall").unwrap();
        // Row 1 is blocked by both, row 11 still by "tall": lands at 41.
        let wide = packer.add_texture(&solid(64, 8, [0; 4]), "wide").unwrap();
        assert_eq!(wide, AtlasRect::new(1, 41, 64, 8));
        // A narrow image fits under "short".
        let narrow = packer.add_texture(&solid(32, 20, [0; 4]), "narrow").unwrap();
        assert_eq!(narrow, AtlasRect::new(1, 11, 32, 20));
    }

    #[test]
    fn random_images_never_overlap() {
        let mut rng = StdRng::seed_from_u64(42);
        let packer = RectanglePacker::new(&small_config(256)).unwrap();
        for i in 0..400 {
            let w = rng.gen_range(1..=48);
            let h = rng.gen_range(1..=48);
            match packer.add_texture(&solid(w, h, [0; 4]), &format!("img{i}")) {
                Ok(_) | Err(AtlasError::NoSpace { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let usable = AtlasRect::new(1, 1, 254, 254);
        let rects: Vec<AtlasRect> = packer
            .names()
            .iter()
            .filter_map(|n| packer.try_get_rectangle(n))
            .collect();
        assert!(rects.len() > 20);
        for (i, a) in rects.iter().enumerate() {
            assert!(usable.contains(a), "{a:?} outside the border");
            for b in &rects[i + 1..] {
                assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn removed_space_is_reused_and_cleared() {
        let packer = RectanglePacker::new(&small_config(64)).unwrap();
        let a = packer.add_texture(&solid(20, 20, [255; 4]), "a").unwrap();
        packer.add_texture(&solid(20, 20, [255; 4]), "b").unwrap();

        assert!(packer.remove_texture("a"));
        assert!(!packer.remove_texture("a"));
        assert!(!packer.remove_texture("never-added"));
        assert_eq!(packer.try_get_rectangle("a"), None);
        assert_eq!(packer.pixel(5, 5), Some([0, 0, 0, 0]));

        let c = packer.add_texture(&solid(20, 20, [7; 4]), "c").unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn concurrent_adds_get_disjoint_space() {
        let packer = RectanglePacker::new(&small_config(512)).unwrap();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let packer = &packer;
                scope.spawn(move || {
                    for i in 0..25 {
                        packer
                            .add_texture(&solid(24, 24, [t as u8; 4]), &format!("{t}-{i}"))
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(packer.len(), 100);
        let rects: Vec<AtlasRect> = packer
            .names()
            .iter()
            .filter_map(|n| packer.try_get_rectangle(n))
            .collect();
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                assert!(!a.intersects(b));
            }
        }
    }

    #[test]
    fn decode_png_from_bytes_and_reader() {
        let mut png = Vec::new();
        solid(3, 2, [10, 20, 30, 255])
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let packer = RectanglePacker::new(&small_config(16)).unwrap();
        let rect = packer.add_texture_from_bytes(&png, "png").unwrap();
        assert_eq!(rect, AtlasRect::new(1, 1, 3, 2));
        assert_eq!(packer.pixel(3, 2), Some([10, 20, 30, 255]));

        let rect = packer
            .add_texture_from_reader(std::io::Cursor::new(&png), "png-2")
            .unwrap();
        assert_eq!(rect, AtlasRect::new(4, 1, 3, 2));

        assert!(matches!(
            packer.add_texture_from_bytes(b"not an image", "junk"),
            Err(AtlasError::Decode(_))
        ));
    }

    #[test]
    fn unordered_bounds_are_rejected() {
        let config = AtlasConfig {
            min_dimension: 64,
            max_dimension: 32,
            ..small_config(48)
        };
        assert!(matches!(
            RectanglePacker::new(&config),
            Err(AtlasError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn dirty_regions_upload_to_the_device() {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let packer = RectanglePacker::new(&small_config(16)).unwrap();
        packer.add_texture(&solid(2, 2, [255, 0, 0, 255]), "early").unwrap();
        let texture = packer.create_texture(&mut device, "atlas").unwrap();
        assert!(packer.take_dirty().is_empty());
        assert_eq!(device.pixels(texture).unwrap().pixel(0, 1, 1), [255, 0, 0, 255]);

        packer.add_texture(&solid(3, 3, [0, 255, 0, 255]), "late").unwrap();
        packer.remove_texture("early");
        assert_eq!(packer.upload(&mut device, texture, 0).unwrap(), 2);

        let pixels = device.pixels(texture).unwrap();
        assert_eq!(pixels.pixel(0, 1, 1), [0, 0, 0, 0]);
        assert_eq!(pixels.pixel(0, 3, 1), [0, 255, 0, 255]);
        assert_eq!(packer.upload(&mut device, texture, 0).unwrap(), 0);
    }
}
