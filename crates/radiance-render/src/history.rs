//! Previous/current history texture pairs.
//!
//! Each pair holds two textures of identical format and size. Swapping
//! exchanges which one is "current"; contents never move.

use crate::error::{RenderError, Result};
use crate::targets::TextureAllocator;
use glam::UVec2;
use radiance_core::constants::HISTORY_PAIR_COUNT;
use radiance_core::{DescriptorSlots, TextureType};
use tracing::{debug, warn};

/// Texture types tracked as history, as `(current, previous)`.
pub const HISTORY_PAIRS: [(TextureType, TextureType); HISTORY_PAIR_COUNT] = [
    (TextureType::LinearDepth, TextureType::PreviousLinearDepth),
    (
        TextureType::BaseColorMetalness,
        TextureType::PreviousBaseColorMetalness,
    ),
    (TextureType::NormalRoughness, TextureType::PreviousNormalRoughness),
    (TextureType::GeometricNormals, TextureType::PreviousGeometricNormals),
];

#[derive(Debug)]
struct HistoryPair<T> {
    current_type: TextureType,
    previous_type: TextureType,
    textures: [T; 2],
    current: usize,
}

impl<T> HistoryPair<T> {
    fn get(&self, ty: TextureType) -> Option<&T> {
        if ty == self.current_type {
            Some(&self.textures[self.current])
        } else if ty == self.previous_type {
            Some(&self.textures[1 - self.current])
        } else {
            None
        }
    }
}

/// History textures for temporal passes.
#[derive(Debug)]
pub struct HistoryBuffers<T> {
    pairs: Vec<HistoryPair<T>>,
    size: UVec2,
    swaps: u64,
}

impl<T> HistoryBuffers<T> {
    /// Allocate every pair at `size` and reset them.
    pub fn new<A>(allocator: &mut A, size: UVec2) -> Result<Self>
    where
        A: TextureAllocator<Texture = T>,
    {
        let mut buffers = Self {
            pairs: Vec::with_capacity(HISTORY_PAIR_COUNT),
            size,
            swaps: 0,
        };
        buffers.allocate(allocator, size)?;
        buffers.reset(allocator)?;
        Ok(buffers)
    }

    /// Allocate every pair; on failure nothing allocated here survives.
    fn allocate<A>(&mut self, allocator: &mut A, size: UVec2) -> Result<()>
    where
        A: TextureAllocator<Texture = T>,
    {
        let mut pairs = Vec::with_capacity(HISTORY_PAIR_COUNT);
        for (current_type, previous_type) in HISTORY_PAIRS {
            let textures = allocator
                .allocate(current_type, size)
                .and_then(|first| match allocator.allocate(previous_type, size) {
                    Ok(second) => Ok([first, second]),
                    Err(err) => {
                        release_partial(allocator, [first]);
                        Err(err)
                    }
                });
            match textures {
                Ok(textures) => pairs.push(HistoryPair {
                    current_type,
                    previous_type,
                    textures,
                    current: 0,
                }),
                Err(err) => {
                    release_partial(allocator, pairs.into_iter().flat_map(|pair| pair.textures));
                    return Err(err);
                }
            }
        }
        self.pairs = pairs;
        self.size = size;
        Ok(())
    }

    /// Exchange previous and current of every pair.
    pub fn swap(&mut self) {
        for pair in &mut self.pairs {
            pair.current = 1 - pair.current;
        }
        self.swaps += 1;
    }

    /// Put every texture into its known state after a temporal reset.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn reset<A>(&mut self, allocator: &mut A) -> Result<()>
    where
        A: TextureAllocator<Texture = T>,
    {
        for pair in &mut self.pairs {
            for texture in &mut pair.textures {
                allocator.prepare(texture)?;
            }
        }
        debug!("History buffers reset");
        Ok(())
    }

    /// Re-create every pair at `size`, then reset.
    pub fn reallocate<A>(&mut self, allocator: &mut A, size: UVec2) -> Result<()>
    where
        A: TextureAllocator<Texture = T>,
    {
        self.release(allocator)?;
        self.allocate(allocator, size)?;
        self.reset(allocator)?;
        debug!(?size, "History buffers reallocated");
        Ok(())
    }

    /// Release every texture. Pairs are dropped even if a release fails.
    pub fn release<A>(&mut self, allocator: &mut A) -> Result<()>
    where
        A: TextureAllocator<Texture = T>,
    {
        let mut first_error = None;
        for mut pair in self.pairs.drain(..) {
            for texture in &mut pair.textures {
                if let Err(err) = allocator.release(texture) {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Look up a history texture. `Previous*` types return the previous slot.
    pub fn get(&self, ty: TextureType) -> Result<&T> {
        self.pairs
            .iter()
            .find_map(|pair| pair.get(ty))
            .ok_or(RenderError::MissingTexture(ty))
    }

    /// Every history texture with its descriptor slots. Slots follow the
    /// role, so after a swap the same slot sees the other texture.
    pub fn bindings(&self) -> impl Iterator<Item = (DescriptorSlots, &T)> + '_ {
        self.pairs.iter().flat_map(|pair| {
            [
                (pair.current_type.descriptor_slots(), &pair.textures[pair.current]),
                (
                    pair.previous_type.descriptor_slots(),
                    &pair.textures[1 - pair.current],
                ),
            ]
        })
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub const fn size(&self) -> UVec2 {
        self.size
    }

    pub const fn swap_count(&self) -> u64 {
        self.swaps
    }
}

fn release_partial<A, T>(allocator: &mut A, textures: impl IntoIterator<Item = T>)
where
    A: TextureAllocator<Texture = T>,
{
    for mut texture in textures {
        if let Err(err) = allocator.release(&mut texture) {
            warn!(%err, "Failed to release history texture after allocation failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::mock::MockAllocator;

    const SIZE: UVec2 = UVec2::new(640, 360);

    fn ids(history: &HistoryBuffers<crate::targets::mock::MockTexture>) -> Vec<u32> {
        HISTORY_PAIRS
            .iter()
            .flat_map(|(current, previous)| [*current, *previous])
            .map(|ty| history.get(ty).unwrap().id)
            .collect()
    }

    #[test]
    fn swap_exchanges_previous_and_current() {
        let mut allocator = MockAllocator::default();
        let mut history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();

        let current = history.get(TextureType::LinearDepth).unwrap().id;
        let previous = history.get(TextureType::PreviousLinearDepth).unwrap().id;
        history.swap();

        assert_eq!(history.get(TextureType::LinearDepth).unwrap().id, previous);
        assert_eq!(history.get(TextureType::PreviousLinearDepth).unwrap().id, current);
    }

    #[test]
    fn double_swap_is_identity() {
        let mut allocator = MockAllocator::default();
        let mut history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();
        let before = ids(&history);

        history.swap();
        history.swap();

        assert_eq!(ids(&history), before);
        assert_eq!(history.swap_count(), 2);
    }

    #[test]
    fn bindings_follow_roles_across_swaps() {
        let mut allocator = MockAllocator::default();
        let mut history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();
        let depth_slots = TextureType::LinearDepth.descriptor_slots();
        let bound = |history: &HistoryBuffers<crate::targets::mock::MockTexture>| {
            history
                .bindings()
                .find(|(slots, _)| *slots == depth_slots)
                .map(|(_, texture)| texture.id)
        };

        let before = bound(&history);
        history.swap();
        assert_eq!(history.bindings().count(), HISTORY_PAIR_COUNT * 2);
        assert_ne!(bound(&history), before);
        assert_eq!(
            bound(&history),
            Some(history.get(TextureType::LinearDepth).unwrap().id)
        );
    }

    #[test]
    fn pair_count_is_fixed() {
        let mut allocator = MockAllocator::default();
        let mut history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();
        assert_eq!(history.pair_count(), HISTORY_PAIR_COUNT);

        history.reallocate(&mut allocator, UVec2::new(1280, 720)).unwrap();
        assert_eq!(history.pair_count(), HISTORY_PAIR_COUNT);
        assert_eq!(allocator.live.len(), HISTORY_PAIR_COUNT * 2);
    }

    #[test]
    fn reset_prepares_every_texture() {
        let mut allocator = MockAllocator::default();
        let mut history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();
        history.reset(&mut allocator).unwrap();

        for (current, previous) in HISTORY_PAIRS {
            assert_eq!(history.get(current).unwrap().prepared, 2);
            assert_eq!(history.get(previous).unwrap().prepared, 2);
        }
    }

    #[test]
    fn reallocate_resizes_and_resets() {
        let mut allocator = MockAllocator::default();
        let mut history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();
        history.swap();

        let size = UVec2::new(1280, 720);
        history.reallocate(&mut allocator, size).unwrap();

        assert_eq!(history.size(), size);
        let depth = history.get(TextureType::LinearDepth).unwrap();
        assert_eq!(depth.size, size);
        assert_eq!(depth.ty, TextureType::LinearDepth);
        assert_eq!(depth.prepared, 1);
    }

    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let mut allocator = MockAllocator {
            fail_at: Some(6),
            ..MockAllocator::default()
        };
        let err = HistoryBuffers::new(&mut allocator, SIZE).unwrap_err();
        assert!(matches!(err, RenderError::Gpu(_)));
        assert!(allocator.live.is_empty());
        assert_eq!(allocator.released.len(), 5);
    }

    #[test]
    fn failed_reallocation_releases_partial_pairs() {
        let mut allocator = MockAllocator::default();
        let mut history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();
        allocator.fail_at = Some(12);

        assert!(history.reallocate(&mut allocator, UVec2::new(1280, 720)).is_err());
        assert_eq!(history.pair_count(), 0);
        assert!(allocator.live.is_empty());

        allocator.fail_at = None;
        history.reallocate(&mut allocator, UVec2::new(1280, 720)).unwrap();
        assert_eq!(history.pair_count(), HISTORY_PAIR_COUNT);
    }

    #[test]
    fn non_history_lookup_fails() {
        let mut allocator = MockAllocator::default();
        let history = HistoryBuffers::new(&mut allocator, SIZE).unwrap();
        assert!(matches!(
            history.get(TextureType::Color),
            Err(RenderError::MissingTexture(TextureType::Color))
        ));
    }
}
