//! Headless [`RenderDevice`] that records what would have been drawn.
//!
//! Textures are kept as CPU pixel buffers and every `draw_indexed` is stored
//! as a [`DrawCall`] with a copy of its vertices, which makes the batch
//! engine's output inspectable without a GPU.

use std::marker::PhantomData;

use super::device::{RenderDevice, TextureDesc};
use super::texture::{Texture, TextureHandle, TextureTable};
use crate::error::{DeviceError, DeviceResult};
use crate::math::AtlasRect;
use crate::sprite::state::FrameState;
use crate::sprite::vertex::{QuadVertex, SpriteVertex};

/// CPU copy of a texture's pixels.
#[derive(Debug, Clone)]
pub struct TexturePixels {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    /// RGBA8, layer-major.
    pub data: Vec<u8>,
}

impl TexturePixels {
    /// The RGBA value at `(x, y)` on `layer`.
    pub fn pixel(&self, layer: u32, x: u32, y: u32) -> [u8; 4] {
        let i = (((layer * self.height + y) * self.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

/// One recorded draw.
#[derive(Debug, Clone)]
pub struct DrawCall<V> {
    pub texture: Texture,
    pub index_count: u32,
    pub vertices: Vec<V>,
    /// State bound when the draw was issued.
    pub frame: FrameState,
}

impl<V> DrawCall<V> {
    pub fn quad_count(&self) -> usize {
        self.index_count as usize / 6
    }
}

/// Records draw calls instead of rendering them.
pub struct RecordingDevice<V = SpriteVertex> {
    textures: TextureTable<TexturePixels>,
    indices: Vec<u16>,
    mapped: Option<(Texture, Vec<V>)>,
    unmapped: Option<(Texture, Vec<V>)>,
    draws: Vec<DrawCall<V>>,
    current: Option<FrameState>,
    frame_states: Vec<FrameState>,
    frames_finished: usize,
    _vertex: PhantomData<V>,
}

impl<V: QuadVertex> RecordingDevice<V> {
    pub fn new() -> Self {
        Self {
            textures: TextureTable::new(),
            indices: Vec::new(),
            mapped: None,
            unmapped: None,
            draws: Vec::new(),
            current: None,
            frame_states: Vec::new(),
            frames_finished: 0,
            _vertex: PhantomData,
        }
    }

    /// Draw calls recorded so far, in submission order.
    pub fn draws(&self) -> &[DrawCall<V>] {
        &self.draws
    }

    /// Remove and return the recorded draw calls.
    pub fn take_draws(&mut self) -> Vec<DrawCall<V>> {
        std::mem::take(&mut self.draws)
    }

    /// The uploaded index buffer.
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Every distinct frame state bound, oldest first. Repeats of the state
    /// already bound are not recorded again until the next `finish_frame`.
    pub fn frame_states(&self) -> &[FrameState] {
        &self.frame_states
    }

    pub fn frames_finished(&self) -> usize {
        self.frames_finished
    }

    /// CPU pixels of a live texture.
    pub fn pixels(&self, texture: Texture) -> Option<&TexturePixels> {
        self.textures.get(texture.handle)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl<V: QuadVertex> Default for RecordingDevice<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: QuadVertex> RenderDevice for RecordingDevice<V> {
    type Vertex = V;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> DeviceResult<Texture> {
        let expected = desc.byte_len();
        let data = match desc.data {
            Some(data) if data.len() != expected => {
                return Err(DeviceError::TextureDataSize {
                    expected,
                    actual: data.len(),
                });
            }
            Some(data) => data.to_vec(),
            None => vec![0; expected],
        };
        let layers = desc.layers.max(1);
        let handle = self.textures.insert(TexturePixels {
            width: desc.width,
            height: desc.height,
            layers,
            data,
        });
        Ok(Texture::new(handle, desc.width, desc.height, layers))
    }

    fn write_texture_region(
        &mut self,
        texture: Texture,
        layer: u32,
        region: AtlasRect,
        data: &[u8],
    ) -> DeviceResult<()> {
        let pixels = self
            .textures
            .get_mut(texture.handle)
            .ok_or(DeviceError::UnknownTexture(texture.handle))?;
        let expected = region.area() as usize * 4;
        if data.len() != expected {
            return Err(DeviceError::TextureDataSize {
                expected,
                actual: data.len(),
            });
        }
        if region.right() > pixels.width || region.bottom() > pixels.height || layer >= pixels.layers {
            return Err(DeviceError::RegionOutOfBounds {
                region,
                width: pixels.width,
                height: pixels.height,
                layers: pixels.layers,
            });
        }
        let row_bytes = region.width as usize * 4;
        for row in 0..region.height {
            let dst_y = layer * pixels.height + region.y + row;
            let dst = ((dst_y * pixels.width + region.x) * 4) as usize;
            let src = row as usize * row_bytes;
            pixels.data[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: Texture) -> DeviceResult<()> {
        self.textures
            .remove(texture.handle)
            .map(|_| ())
            .ok_or(DeviceError::UnknownTexture(texture.handle))
    }

    fn texture(&self, handle: TextureHandle) -> Option<Texture> {
        self.textures
            .get(handle)
            .map(|p| Texture::new(handle, p.width, p.height, p.layers))
    }

    fn upload_indices(&mut self, indices: &[u16]) {
        self.indices = indices.to_vec();
    }

    fn apply_frame_state(&mut self, state: &FrameState) {
        if self.current.as_ref() == Some(state) {
            return;
        }
        self.current = Some(state.clone());
        self.frame_states.push(state.clone());
    }

    fn map_vertices(&mut self, texture: Texture, quad_count: usize) -> DeviceResult<&mut [V]> {
        if !self.textures.contains(texture.handle) {
            return Err(DeviceError::UnknownTexture(texture.handle));
        }
        let vertices = vec![V::zeroed(); quad_count * 4];
        let (_, mapped) = self.mapped.insert((texture, vertices));
        Ok(mapped.as_mut_slice())
    }

    fn unmap_vertices(&mut self) {
        self.unmapped = self.mapped.take();
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let Some(frame) = self.current.clone() else {
            log::error!("draw_indexed before apply_frame_state");
            return;
        };
        match self.unmapped.take() {
            Some((texture, vertices)) => self.draws.push(DrawCall {
                texture,
                index_count,
                vertices,
                frame,
            }),
            None => log::error!("draw_indexed without an unmapped vertex region"),
        }
    }

    fn finish_frame(&mut self) -> DeviceResult<()> {
        self.frames_finished += 1;
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_write_lands_in_the_right_texels() {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let tex = device
            .create_texture(&TextureDesc::empty("canvas", 4, 4, 1))
            .unwrap();
        let red = [255u8, 0, 0, 255].repeat(4);
        device
            .write_texture_region(tex, 0, AtlasRect::new(1, 2, 2, 2), &red)
            .unwrap();

        let pixels = device.pixels(tex).unwrap();
        assert_eq!(pixels.pixel(0, 1, 2), [255, 0, 0, 255]);
        assert_eq!(pixels.pixel(0, 2, 3), [255, 0, 0, 255]);
        assert_eq!(pixels.pixel(0, 0, 2), [0, 0, 0, 0]);
        assert_eq!(pixels.pixel(0, 3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn region_outside_the_texture_is_rejected() {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let tex = device
            .create_texture(&TextureDesc::empty("canvas", 4, 4, 1))
            .unwrap();
        let data = [0u8; 16];
        let result = device.write_texture_region(tex, 0, AtlasRect::new(3, 3, 2, 2), &data);
        assert!(matches!(result, Err(DeviceError::RegionOutOfBounds { .. })));
        let result = device.write_texture_region(tex, 1, AtlasRect::new(0, 0, 2, 2), &data);
        assert!(matches!(result, Err(DeviceError::RegionOutOfBounds { .. })));
    }

    #[test]
    fn wrong_data_size_is_rejected() {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let result = device.create_texture(&TextureDesc::rgba("bad", 2, 2, &[0; 3]));
        assert!(matches!(
            result,
            Err(DeviceError::TextureDataSize { expected: 16, actual: 3 })
        ));
    }

    #[test]
    fn destroyed_texture_cannot_be_mapped() {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let tex = device
            .create_texture(&TextureDesc::empty("t", 1, 1, 1))
            .unwrap();
        device.destroy_texture(tex).unwrap();
        assert!(device.texture(tex.handle()).is_none());
        assert!(device.map_vertices(tex, 1).is_err());
    }
}
