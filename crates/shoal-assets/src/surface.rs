//! Render surface boundary
//!
//! The core never touches pixels after hydration. It hands the surface
//! raw frames to turn into textures, and once per tick a list of what
//! each entity should show and where.

use std::collections::HashMap;

use shoal_core::{EntityId, TextureHandle, Vec2};

use crate::{HydratedFrame, RawFrame};

/// What an entity shows this tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visual {
    /// No frames yet (or none ever: failed download, empty decode)
    Empty,
    /// Current frame of the entity's own animation
    Animation(TextureHandle),
    /// The fetched representational image
    Representation(TextureHandle),
}

impl Visual {
    pub fn texture(&self) -> Option<TextureHandle> {
        match self {
            Visual::Empty => None,
            Visual::Animation(t) | Visual::Representation(t) => Some(*t),
        }
    }
}

/// Renderable frame / position pair for one entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderItem {
    pub entity: EntityId,
    pub position: Vec2,
    pub visual: Visual,
}

/// Presentation layer owned by the main tick
pub trait RenderSurface {
    /// Turn a raw frame into a texture. The raw buffer is consumed.
    fn hydrate(&mut self, frame: RawFrame) -> TextureHandle;

    /// Free a texture previously returned by `hydrate`
    fn release(&mut self, texture: TextureHandle);

    /// Show this tick's scene
    fn present(&mut self, items: &[RenderItem]);
}

/// Hydrate a decoded sequence in order, keeping each frame's timestamp
pub fn hydrate_frames<S: RenderSurface + ?Sized>(surface: &mut S, raw: Vec<RawFrame>) -> Vec<HydratedFrame> {
    raw.into_iter()
        .map(|frame| {
            let timestamp_ms = frame.timestamp_ms;
            HydratedFrame {
                texture: surface.hydrate(frame),
                timestamp_ms,
            }
        })
        .collect()
}

/// Surface that keeps texture bookkeeping but draws nothing.
///
/// Used by the daemon when no display is attached, and by tests.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    next_texture: u64,
    live: HashMap<TextureHandle, (u32, u32)>,
    hydrated_total: u64,
    released_total: u64,
    presents: u64,
    last_scene: Vec<RenderItem>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, texture: TextureHandle) -> bool {
        self.live.contains_key(&texture)
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.live.get(&texture).copied()
    }

    pub fn hydrated_total(&self) -> u64 {
        self.hydrated_total
    }

    pub fn released_total(&self) -> u64 {
        self.released_total
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    pub fn last_scene(&self) -> &[RenderItem] {
        &self.last_scene
    }

    pub fn item_for(&self, entity: EntityId) -> Option<&RenderItem> {
        self.last_scene.iter().find(|item| item.entity == entity)
    }
}

impl RenderSurface for HeadlessSurface {
    fn hydrate(&mut self, frame: RawFrame) -> TextureHandle {
        self.next_texture += 1;
        let handle = TextureHandle::new(self.next_texture);
        self.live.insert(handle, (frame.width, frame.height));
        self.hydrated_total += 1;
        handle
    }

    fn release(&mut self, texture: TextureHandle) {
        if self.live.remove(&texture).is_some() {
            self.released_total += 1;
        }
    }

    fn present(&mut self, items: &[RenderItem]) {
        self.presents += 1;
        self.last_scene.clear();
        self.last_scene.extend_from_slice(items);
    }
}
