//! # Texture — Handles Into a Generation-Checked Resource Table
//!
//! Users never hold a GPU texture directly. Creating a texture through a
//! [`RenderDevice`](super::RenderDevice) returns a [`Texture`]: a small `Copy`
//! value carrying a [`TextureHandle`] plus the texture's size. The device owns
//! the real resource in a [`TextureTable`].
//!
//! ## Why Generations
//!
//! A plain index would be reused as soon as a texture is destroyed and a new
//! one created in its slot, and a stale handle would then silently draw the
//! wrong image. Every slot therefore carries a generation counter that is
//! bumped on removal; a handle only resolves if both index and generation
//! match.
//!
//! ```text
//! TextureTable
//! ┌───────────────────────────────────────────────┐
//! │ slots: Vec<Slot<T>>                           │
//! │   [0] gen 0  white 1x1          ◄── default   │
//! │   [1] gen 3  atlas page 0                     │
//! │   [2] gen 1  <free>             ◄── free list │
//! │   ...                                         │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The batch engine compares textures by [`TextureHandle::key`], a `u64`
//! packing index and generation, so identity checks never depend on where
//! the backend happens to keep its objects.

/// Opaque handle to a texture registered with a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle {
    index: u32,
    generation: u32,
}

impl TextureHandle {
    /// Stable numeric identity: generation in the high half, index in the
    /// low half.
    pub fn key(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// A texture as seen by the batch engine: handle plus dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture {
    pub(crate) handle: TextureHandle,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) layers: u32,
}

impl Texture {
    pub(crate) fn new(handle: TextureHandle, width: u32, height: u32, layers: u32) -> Self {
        Self {
            handle,
            width,
            height,
            layers,
        }
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Array layers. 1 for a plain 2D texture.
    pub fn layers(&self) -> u32 {
        self.layers
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage for backend texture objects, addressed by [`TextureHandle`].
pub struct TextureTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> TextureTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Store a value and return its handle. Reuses freed slots first.
    pub fn insert(&mut self, value: T) -> TextureHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return TextureHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        TextureHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: TextureHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Remove a value. The slot's generation is bumped so the old handle
    /// stops resolving.
    pub fn remove(&mut self, handle: TextureHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(value)
    }

    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TextureTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut table = TextureTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn stale_handle_does_not_resolve_after_reuse() {
        let mut table = TextureTable::new();
        let old = table.insert(1);
        assert_eq!(table.remove(old), Some(1));

        let new = table.insert(2);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.key(), old.key());
        assert_eq!(table.get(old), None);
        assert_eq!(table.get(new), Some(&2));
    }

    #[test]
    fn double_remove_is_harmless() {
        let mut table = TextureTable::new();
        let h = table.insert(());
        assert!(table.remove(h).is_some());
        assert!(table.remove(h).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn key_packs_generation_and_index() {
        let h = TextureHandle {
            index: 7,
            generation: 2,
        };
        assert_eq!(h.key(), (2u64 << 32) | 7);
    }
}
