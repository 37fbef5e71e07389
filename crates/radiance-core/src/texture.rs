//! Render texture and material texture tables.
//!
//! Both tables are closed enumerations resolved with exhaustive matches.
//! Raw identifiers coming from outside the renderer (loaders, tools) go
//! through `TryFrom<u32>`/`FromStr` and fail with
//! [`Error::UnsupportedTextureType`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pixel formats used by render textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba16Float,
    Rgba8Unorm,
    R32Float,
    R11G11B10Float,
    Rg16Snorm,
}

impl TextureFormat {
    /// Size of one texel in bytes.
    pub const fn texel_size(self) -> u32 {
        match self {
            Self::Rgba16Float => 8,
            Self::Rgba8Unorm | Self::R32Float | Self::R11G11B10Float | Self::Rg16Snorm => 4,
        }
    }
}

/// Which negotiated size a texture is allocated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtentClass {
    /// Internal ray tracing resolution.
    Render,
    /// Presentation resolution.
    Output,
}

/// Descriptor table indices of a texture.
///
/// `None` means the texture is never bound for that access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSlots {
    pub sampled: Option<u32>,
    pub storage: Option<u32>,
}

impl DescriptorSlots {
    const fn both(sampled: u32, storage: u32) -> Self {
        Self {
            sampled: Some(sampled),
            storage: Some(storage),
        }
    }

    const fn write_only(storage: u32) -> Self {
        Self {
            sampled: None,
            storage: Some(storage),
        }
    }
}

/// Every resolution-dependent texture the renderer allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TextureType {
    Color = 0,
    FinalColor,
    LinearDepth,
    PreviousLinearDepth,
    NormalizedDepth,
    MotionVectors,
    BaseColorMetalness,
    PreviousBaseColorMetalness,
    EmissiveColor,
    NormalRoughness,
    PreviousNormalRoughness,
    GeometricNormals,
    PreviousGeometricNormals,
    NoisyDiffuse,
    NoisySpecular,
    DenoisedDiffuse,
    DenoisedSpecular,
    Validation,
}

impl TextureType {
    /// Number of texture types.
    pub const COUNT: usize = 18;

    /// All texture types in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Color,
        Self::FinalColor,
        Self::LinearDepth,
        Self::PreviousLinearDepth,
        Self::NormalizedDepth,
        Self::MotionVectors,
        Self::BaseColorMetalness,
        Self::PreviousBaseColorMetalness,
        Self::EmissiveColor,
        Self::NormalRoughness,
        Self::PreviousNormalRoughness,
        Self::GeometricNormals,
        Self::PreviousGeometricNormals,
        Self::NoisyDiffuse,
        Self::NoisySpecular,
        Self::DenoisedDiffuse,
        Self::DenoisedSpecular,
        Self::Validation,
    ];

    /// Position in [`Self::ALL`], usable as a table index.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Color => "Color",
            Self::FinalColor => "FinalColor",
            Self::LinearDepth => "LinearDepth",
            Self::PreviousLinearDepth => "PreviousLinearDepth",
            Self::NormalizedDepth => "NormalizedDepth",
            Self::MotionVectors => "MotionVectors",
            Self::BaseColorMetalness => "BaseColorMetalness",
            Self::PreviousBaseColorMetalness => "PreviousBaseColorMetalness",
            Self::EmissiveColor => "EmissiveColor",
            Self::NormalRoughness => "NormalRoughness",
            Self::PreviousNormalRoughness => "PreviousNormalRoughness",
            Self::GeometricNormals => "GeometricNormals",
            Self::PreviousGeometricNormals => "PreviousGeometricNormals",
            Self::NoisyDiffuse => "NoisyDiffuse",
            Self::NoisySpecular => "NoisySpecular",
            Self::DenoisedDiffuse => "DenoisedDiffuse",
            Self::DenoisedSpecular => "DenoisedSpecular",
            Self::Validation => "Validation",
        }
    }

    pub const fn format(self) -> TextureFormat {
        match self {
            Self::Color
            | Self::FinalColor
            | Self::MotionVectors
            | Self::NoisyDiffuse
            | Self::NoisySpecular
            | Self::DenoisedDiffuse
            | Self::DenoisedSpecular => TextureFormat::Rgba16Float,
            Self::LinearDepth | Self::PreviousLinearDepth | Self::NormalizedDepth => {
                TextureFormat::R32Float
            }
            // Normal/roughness uses the denoiser's 8-bit packing.
            Self::BaseColorMetalness
            | Self::PreviousBaseColorMetalness
            | Self::NormalRoughness
            | Self::PreviousNormalRoughness
            | Self::Validation => TextureFormat::Rgba8Unorm,
            Self::EmissiveColor => TextureFormat::R11G11B10Float,
            Self::GeometricNormals | Self::PreviousGeometricNormals => TextureFormat::Rg16Snorm,
        }
    }

    pub const fn extent_class(self) -> ExtentClass {
        match self {
            Self::Color | Self::FinalColor | Self::Validation => ExtentClass::Output,
            _ => ExtentClass::Render,
        }
    }

    /// Whether this texture is one half of a history pair.
    pub const fn is_history(self) -> bool {
        matches!(
            self,
            Self::LinearDepth
                | Self::PreviousLinearDepth
                | Self::BaseColorMetalness
                | Self::PreviousBaseColorMetalness
                | Self::NormalRoughness
                | Self::PreviousNormalRoughness
                | Self::GeometricNormals
                | Self::PreviousGeometricNormals
        )
    }

    /// Textures only allocated while a denoiser is available.
    pub const fn requires_denoiser(self) -> bool {
        matches!(
            self,
            Self::NoisyDiffuse
                | Self::NoisySpecular
                | Self::DenoisedDiffuse
                | Self::DenoisedSpecular
                | Self::Validation
        )
    }

    pub const fn descriptor_slots(self) -> DescriptorSlots {
        match self {
            Self::Color => DescriptorSlots::both(0, 1),
            Self::FinalColor => DescriptorSlots::both(2, 3),
            Self::LinearDepth => DescriptorSlots::both(4, 5),
            Self::PreviousLinearDepth => DescriptorSlots::both(6, 7),
            Self::NormalizedDepth => DescriptorSlots::both(8, 9),
            Self::MotionVectors => DescriptorSlots::both(10, 11),
            Self::BaseColorMetalness => DescriptorSlots::both(12, 13),
            Self::PreviousBaseColorMetalness => DescriptorSlots::both(14, 15),
            Self::EmissiveColor => DescriptorSlots::both(16, 17),
            Self::NormalRoughness => DescriptorSlots::both(18, 19),
            Self::PreviousNormalRoughness => DescriptorSlots::both(20, 21),
            Self::GeometricNormals => DescriptorSlots::both(22, 23),
            Self::PreviousGeometricNormals => DescriptorSlots::both(24, 25),
            Self::NoisyDiffuse => DescriptorSlots::write_only(26),
            Self::NoisySpecular => DescriptorSlots::write_only(27),
            Self::DenoisedDiffuse => DescriptorSlots::both(28, 29),
            Self::DenoisedSpecular => DescriptorSlots::both(30, 31),
            Self::Validation => DescriptorSlots::both(32, 33),
        }
    }
}

impl TryFrom<u32> for TextureType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| Error::UnsupportedTextureType(format!("render texture id {value}")))
    }
}

impl FromStr for TextureType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| Error::UnsupportedTextureType(s.to_string()))
    }
}

impl std::fmt::Display for TextureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Material texture maps a mesh can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialTextureMap {
    BaseColor,
    EmissiveColor,
    Metallic,
    Roughness,
    AmbientOcclusion,
    Transmission,
    Opacity,
    Normal,
}

impl TryFrom<u32> for MaterialTextureMap {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Self::BaseColor,
            1 => Self::EmissiveColor,
            2 => Self::Metallic,
            3 => Self::Roughness,
            4 => Self::AmbientOcclusion,
            5 => Self::Transmission,
            6 => Self::Opacity,
            7 => Self::Normal,
            other => {
                return Err(Error::UnsupportedTextureType(format!(
                    "material texture map {other}"
                )))
            }
        })
    }
}

/// Per-object descriptor indices of material textures, as read by shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialTextureSlots {
    pub base_color: u32,
    pub emissive_color: u32,
    pub metallic: u32,
    pub roughness: u32,
    pub ambient_occlusion: u32,
    pub transmission: u32,
    pub opacity: u32,
    pub normal: u32,
}

impl MaterialTextureSlots {
    /// Marker for "no texture bound".
    pub const UNSET: u32 = u32::MAX;

    pub const fn empty() -> Self {
        Self {
            base_color: Self::UNSET,
            emissive_color: Self::UNSET,
            metallic: Self::UNSET,
            roughness: Self::UNSET,
            ambient_occlusion: Self::UNSET,
            transmission: Self::UNSET,
            opacity: Self::UNSET,
            normal: Self::UNSET,
        }
    }

    /// Bind a descriptor index to a map.
    pub fn assign(&mut self, map: MaterialTextureMap, descriptor_index: u32) {
        *self.slot_mut(map) = descriptor_index;
    }

    /// Bind a descriptor index to a raw map id from a loader.
    pub fn assign_raw(&mut self, raw_map: u32, descriptor_index: u32) -> Result<()> {
        self.assign(MaterialTextureMap::try_from(raw_map)?, descriptor_index);
        Ok(())
    }

    pub const fn get(&self, map: MaterialTextureMap) -> Option<u32> {
        let index = match map {
            MaterialTextureMap::BaseColor => self.base_color,
            MaterialTextureMap::EmissiveColor => self.emissive_color,
            MaterialTextureMap::Metallic => self.metallic,
            MaterialTextureMap::Roughness => self.roughness,
            MaterialTextureMap::AmbientOcclusion => self.ambient_occlusion,
            MaterialTextureMap::Transmission => self.transmission,
            MaterialTextureMap::Opacity => self.opacity,
            MaterialTextureMap::Normal => self.normal,
        };
        if index == Self::UNSET {
            None
        } else {
            Some(index)
        }
    }

    fn slot_mut(&mut self, map: MaterialTextureMap) -> &mut u32 {
        match map {
            MaterialTextureMap::BaseColor => &mut self.base_color,
            MaterialTextureMap::EmissiveColor => &mut self.emissive_color,
            MaterialTextureMap::Metallic => &mut self.metallic,
            MaterialTextureMap::Roughness => &mut self.roughness,
            MaterialTextureMap::AmbientOcclusion => &mut self.ambient_occlusion,
            MaterialTextureMap::Transmission => &mut self.transmission,
            MaterialTextureMap::Opacity => &mut self.opacity,
            MaterialTextureMap::Normal => &mut self.normal,
        }
    }
}

impl Default for MaterialTextureSlots {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_discriminants() {
        for (i, ty) in TextureType::ALL.into_iter().enumerate() {
            assert_eq!(ty.index(), i);
            assert_eq!(TextureType::try_from(i as u32).unwrap(), ty);
            assert_eq!(ty.name().parse::<TextureType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_texture_ids_are_rejected() {
        let err = TextureType::try_from(TextureType::COUNT as u32).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTextureType(_)));
        assert!("Albedo".parse::<TextureType>().is_err());
    }

    #[test]
    fn descriptor_slots_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for ty in TextureType::ALL {
            let slots = ty.descriptor_slots();
            for slot in [slots.sampled, slots.storage].into_iter().flatten() {
                assert!(seen.insert(slot), "{ty} reuses slot {slot}");
            }
        }
    }

    #[test]
    fn history_pairs_share_formats() {
        let pairs = [
            (TextureType::LinearDepth, TextureType::PreviousLinearDepth),
            (TextureType::BaseColorMetalness, TextureType::PreviousBaseColorMetalness),
            (TextureType::NormalRoughness, TextureType::PreviousNormalRoughness),
            (TextureType::GeometricNormals, TextureType::PreviousGeometricNormals),
        ];
        for (current, previous) in pairs {
            assert_eq!(current.format(), previous.format());
            assert!(current.is_history() && previous.is_history());
        }
        assert!(!TextureType::Color.is_history());
        assert_eq!(TextureType::Color.extent_class(), ExtentClass::Output);
        assert_eq!(TextureType::MotionVectors.extent_class(), ExtentClass::Render);
    }

    #[test]
    fn material_slots() {
        let mut slots = MaterialTextureSlots::empty();
        assert_eq!(slots.get(MaterialTextureMap::Normal), None);

        slots.assign(MaterialTextureMap::Normal, 12);
        slots.assign_raw(0, 3).unwrap();
        assert_eq!(slots.get(MaterialTextureMap::Normal), Some(12));
        assert_eq!(slots.get(MaterialTextureMap::BaseColor), Some(3));

        let err = slots.assign_raw(8, 1).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTextureType(_)));
    }
}
