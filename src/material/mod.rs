//! Surface appearance descriptors and the registry that hands out their
//! identities.
//!
//! Primitives never hold a material directly. They hold a [`MaterialHandle`]
//! issued by a [`MaterialRegistry`], and deduplication during scene
//! compilation compares handles. Two materials with identical channel values
//! are still two materials.

pub mod packer;
pub mod resolver;

use std::sync::Arc;

use image::RgbaImage;

pub use packer::{MaterialAtlas, MaterialPacker, Strip};
pub use resolver::{resolve, ResolvedMaterials};

/// One material channel: either a constant with a per-pixel deviation, or an
/// image resampled into the atlas.
#[derive(Debug, Clone)]
pub enum Channel<T> {
    Procedural { mean: T, deviation: f32 },
    Sampled { image: Arc<RgbaImage> },
}

impl<T> Channel<T> {
    /// Deviation is clamped to `0.0..=1.0`; non-finite values become zero.
    pub fn procedural(mean: T, deviation: f32) -> Self {
        let deviation = if deviation.is_finite() {
            deviation.clamp(0.0, packer::MAX_DEVIATION)
        } else {
            0.0
        };
        Self::Procedural { mean, deviation }
    }

    pub fn sampled(image: impl Into<Arc<RgbaImage>>) -> Self {
        Self::Sampled {
            image: image.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    albedo: Channel<glam::Vec3>,
    roughness: Channel<f32>,
}

impl Material {
    pub const DEFAULT_ALBEDO: glam::Vec3 =
        glam::Vec3::new(245.0 / 255.0, 245.0 / 255.0, 245.0 / 255.0);
    pub const DEFAULT_ROUGHNESS: f32 = 1.0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            albedo: Channel::procedural(Self::DEFAULT_ALBEDO, 0.0),
            roughness: Channel::procedural(Self::DEFAULT_ROUGHNESS, 0.0),
        }
    }

    pub fn with_albedo(mut self, albedo: Channel<glam::Vec3>) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_roughness(mut self, roughness: Channel<f32>) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn albedo(&self) -> &Channel<glam::Vec3> {
        &self.albedo
    }

    pub fn roughness(&self) -> &Channel<f32> {
        &self.roughness
    }

    pub fn set_albedo(&mut self, albedo: Channel<glam::Vec3>) {
        self.albedo = albedo;
    }

    pub fn set_roughness(&mut self, roughness: Channel<f32>) {
        self.roughness = roughness;
    }
}

/// Identity of a registered material.
///
/// A handle stays valid until its material is removed. Slots are reused
/// after removal, but with a bumped generation, so an old handle never
/// aliases the material that took its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for MaterialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    material: Option<Material>,
}

/// Arena of materials addressed by generational handles.
#[derive(Debug, Default)]
pub struct MaterialRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, material: Material) -> MaterialHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.material = Some(material);
            return MaterialHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            material: Some(material),
        });
        MaterialHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.material.as_ref())
    }

    pub fn get_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.material.as_mut())
    }

    pub fn contains(&self, handle: MaterialHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Removes the material and invalidates every copy of `handle`.
    pub fn remove(&mut self, handle: MaterialHandle) -> Option<Material> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let material = slot.material.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(material)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_material_is_off_white_and_rough() {
        let material = Material::new("default");
        match material.albedo() {
            Channel::Procedural { mean, deviation } => {
                assert_eq!(*mean, Material::DEFAULT_ALBEDO);
                assert_eq!(*deviation, 0.0);
            }
            Channel::Sampled { .. } => panic!("expected procedural albedo"),
        }
        assert!(matches!(
            material.roughness(),
            Channel::Procedural { mean, .. } if *mean == 1.0
        ));
    }

    #[test]
    fn negative_deviation_is_clamped() {
        let channel = Channel::procedural(0.5f32, -0.2);
        assert!(matches!(channel, Channel::Procedural { deviation, .. } if deviation == 0.0));
    }

    #[test]
    fn non_finite_deviation_is_dropped() {
        let cases = [(f32::INFINITY, 0.0), (f32::NAN, 0.0), (f32::MAX, 1.0), (0.3, 0.3)];
        for (input, expected) in cases {
            let channel = Channel::procedural(0.5f32, input);
            assert!(
                matches!(channel, Channel::Procedural { deviation, .. } if deviation == expected),
                "{input}"
            );
        }
    }

    #[test]
    fn set_channel_replaces_the_tagged_value() {
        let mut material = Material::new("m");
        material.set_albedo(Channel::sampled(RgbaImage::new(2, 2)));
        assert!(matches!(material.albedo(), Channel::Sampled { .. }));
        material.set_albedo(Channel::procedural(glam::Vec3::ONE, 0.1));
        assert!(matches!(material.albedo(), Channel::Procedural { .. }));
    }

    #[test]
    fn removed_handle_does_not_alias_the_slot_successor() {
        let mut registry = MaterialRegistry::new();
        let first = registry.insert(Material::new("first"));
        assert!(registry.remove(first).is_some());
        assert!(!registry.contains(first));

        let second = registry.insert(Material::new("second"));
        assert_ne!(first, second);
        assert!(registry.get(first).is_none());
        assert_eq!(registry.get(second).map(Material::name), Some("second"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn double_remove_is_rejected() {
        let mut registry = MaterialRegistry::new();
        let handle = registry.insert(Material::new("m"));
        assert!(registry.remove(handle).is_some());
        assert!(registry.remove(handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn get_mut_edits_in_place() {
        let mut registry = MaterialRegistry::new();
        let handle = registry.insert(Material::new("m"));
        if let Some(material) = registry.get_mut(handle) {
            material.set_roughness(Channel::procedural(0.25, 0.0));
        }
        assert!(matches!(
            registry.get(handle).map(Material::roughness),
            Some(Channel::Procedural { mean, .. }) if *mean == 0.25
        ));
    }
}
