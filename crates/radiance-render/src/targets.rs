//! Resolution-dependent render targets.

use crate::error::{RenderError, Result};
use glam::UVec2;
use radiance_core::{DescriptorSlots, ExtentClass, TextureType};
use tracing::debug;

/// Creates and releases render textures.
pub trait TextureAllocator {
    type Texture;

    /// Allocate a texture of the type's format at `size`.
    fn allocate(&mut self, ty: TextureType, size: UVec2) -> Result<Self::Texture>;

    /// Release a texture. The texture must not be used afterwards.
    fn release(&mut self, texture: &mut Self::Texture) -> Result<()>;

    /// Transition a texture into the layout every pass expects. Contents are
    /// left undefined.
    fn prepare(&mut self, texture: &mut Self::Texture) -> Result<()>;
}

/// Sizes for each extent class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetExtents {
    pub output: UVec2,
    pub render: UVec2,
}

impl TargetExtents {
    pub const fn size_of(&self, ty: TextureType) -> UVec2 {
        match ty.extent_class() {
            ExtentClass::Output => self.output,
            ExtentClass::Render => self.render,
        }
    }
}

/// Every non-history render texture, indexed by [`TextureType`].
#[derive(Debug)]
pub struct RenderTargets<T> {
    textures: [Option<T>; TextureType::COUNT],
    extents: Option<TargetExtents>,
}

impl<T> Default for RenderTargets<T> {
    fn default() -> Self {
        Self {
            textures: std::array::from_fn(|_| None),
            extents: None,
        }
    }
}

impl<T> RenderTargets<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release everything and allocate every target for `extents`.
    ///
    /// Denoiser inputs and outputs are skipped when no denoiser runs.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn reallocate<A>(
        &mut self,
        allocator: &mut A,
        extents: TargetExtents,
        denoiser: bool,
    ) -> Result<()>
    where
        A: TextureAllocator<Texture = T>,
    {
        self.release_all(allocator)?;

        for ty in TextureType::ALL {
            if ty.is_history() || (ty.requires_denoiser() && !denoiser) {
                continue;
            }
            let mut texture = allocator.allocate(ty, extents.size_of(ty))?;
            allocator.prepare(&mut texture)?;
            self.textures[ty.index()] = Some(texture);
        }

        self.extents = Some(extents);
        debug!(
            output = ?extents.output,
            render = ?extents.render,
            denoiser,
            "Render targets allocated"
        );
        Ok(())
    }

    /// Release every allocated target.
    ///
    /// All slots are emptied even if a release fails; the first error is
    /// returned.
    pub fn release_all<A>(&mut self, allocator: &mut A) -> Result<()>
    where
        A: TextureAllocator<Texture = T>,
    {
        let mut first_error = None;
        for slot in &mut self.textures {
            if let Some(mut texture) = slot.take() {
                if let Err(err) = allocator.release(&mut texture) {
                    first_error.get_or_insert(err);
                }
            }
        }
        self.extents = None;
        first_error.map_or(Ok(()), Err)
    }

    pub fn get(&self, ty: TextureType) -> Result<&T> {
        self.textures[ty.index()]
            .as_ref()
            .ok_or(RenderError::MissingTexture(ty))
    }

    pub fn contains(&self, ty: TextureType) -> bool {
        self.textures[ty.index()].is_some()
    }

    pub const fn extents(&self) -> Option<TargetExtents> {
        self.extents
    }

    /// Allocated targets with the descriptor slots they bind to.
    pub fn bindings(&self) -> impl Iterator<Item = (DescriptorSlots, &T)> + '_ {
        TextureType::ALL.into_iter().filter_map(|ty| {
            self.textures[ty.index()]
                .as_ref()
                .map(|texture| (ty.descriptor_slots(), texture))
        })
    }

    pub fn allocated(&self) -> impl Iterator<Item = TextureType> + '_ {
        TextureType::ALL
            .into_iter()
            .filter(|ty| self.textures[ty.index()].is_some())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MockTexture {
        pub id: u32,
        pub ty: TextureType,
        pub size: UVec2,
        pub prepared: u32,
    }

    #[derive(Debug, Default)]
    pub struct MockAllocator {
        pub(crate) next_id: u32,
        pub live: Vec<u32>,
        pub released: Vec<u32>,
        /// Fail the allocation that would receive this id.
        pub fail_at: Option<u32>,
    }

    impl TextureAllocator for MockAllocator {
        type Texture = MockTexture;

        fn allocate(&mut self, ty: TextureType, size: UVec2) -> Result<MockTexture> {
            if self.fail_at == Some(self.next_id + 1) {
                return Err(RenderError::Gpu(radiance_gpu::GpuError::AllocationFailed(
                    format!("{ty} at {size}"),
                )));
            }
            self.next_id += 1;
            self.live.push(self.next_id);
            Ok(MockTexture {
                id: self.next_id,
                ty,
                size,
                prepared: 0,
            })
        }

        fn release(&mut self, texture: &mut MockTexture) -> Result<()> {
            self.live.retain(|id| *id != texture.id);
            self.released.push(texture.id);
            Ok(())
        }

        fn prepare(&mut self, texture: &mut MockTexture) -> Result<()> {
            texture.prepared += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockAllocator;
    use super::*;

    const EXTENTS: TargetExtents = TargetExtents {
        output: UVec2::new(1920, 1080),
        render: UVec2::new(1280, 720),
    };

    #[test]
    fn sizes_follow_extent_class() {
        let mut allocator = MockAllocator::default();
        let mut targets = RenderTargets::new();
        targets.reallocate(&mut allocator, EXTENTS, true).unwrap();

        assert_eq!(targets.get(TextureType::Color).unwrap().size, EXTENTS.output);
        assert_eq!(targets.get(TextureType::MotionVectors).unwrap().size, EXTENTS.render);
        assert_eq!(targets.get(TextureType::Validation).unwrap().size, EXTENTS.output);
    }

    #[test]
    fn history_textures_are_not_owned_here() {
        let mut allocator = MockAllocator::default();
        let mut targets = RenderTargets::new();
        targets.reallocate(&mut allocator, EXTENTS, true).unwrap();

        assert!(targets.allocated().all(|ty| !ty.is_history()));
        assert!(matches!(
            targets.get(TextureType::LinearDepth),
            Err(RenderError::MissingTexture(TextureType::LinearDepth))
        ));
    }

    #[test]
    fn bindings_cover_allocated_targets() {
        let mut allocator = MockAllocator::default();
        let mut targets = RenderTargets::new();
        targets.reallocate(&mut allocator, EXTENTS, false).unwrap();

        let bindings: Vec<_> = targets.bindings().collect();
        assert_eq!(bindings.len(), targets.allocated().count());
        let (color_slots, color) = bindings[0];
        assert_eq!(color.ty, TextureType::Color);
        assert_eq!(color_slots, TextureType::Color.descriptor_slots());
        assert!(bindings
            .iter()
            .all(|(slots, texture)| *slots == texture.ty.descriptor_slots()));
    }

    #[test]
    fn denoiser_targets_skipped_without_denoiser() {
        let mut allocator = MockAllocator::default();
        let mut targets = RenderTargets::new();
        targets.reallocate(&mut allocator, EXTENTS, false).unwrap();

        assert!(!targets.contains(TextureType::NoisyDiffuse));
        assert!(!targets.contains(TextureType::Validation));
        assert!(targets.contains(TextureType::FinalColor));
    }

    #[test]
    fn reallocation_releases_previous_textures() {
        let mut allocator = MockAllocator::default();
        let mut targets = RenderTargets::new();
        targets.reallocate(&mut allocator, EXTENTS, true).unwrap();
        let first = allocator.live.len();

        targets.reallocate(&mut allocator, EXTENTS, true).unwrap();
        assert_eq!(allocator.live.len(), first);
        assert_eq!(allocator.released.len(), first);

        targets.release_all(&mut allocator).unwrap();
        assert!(allocator.live.is_empty());
        assert_eq!(targets.extents(), None);
    }
}
