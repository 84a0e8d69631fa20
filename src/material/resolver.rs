//! Identity-based material deduplication.

use super::MaterialHandle;
use crate::scene::Primitive;

/// Deduplicated materials of a primitive list.
///
/// `materials` is in first-reference order and `indices[i]` is the position
/// of primitive `i`'s material inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMaterials {
    pub materials: Vec<MaterialHandle>,
    pub indices: Vec<u32>,
}

impl ResolvedMaterials {
    /// Number of primitives referencing the material at `index`.
    pub fn usage(&self, index: usize) -> usize {
        self.indices
            .iter()
            .filter(|&&resolved| resolved as usize == index)
            .count()
    }
}

/// Linear scan; scenes hold tens of primitives and a handful of materials.
pub fn resolve<'a>(primitives: impl IntoIterator<Item = &'a Primitive>) -> ResolvedMaterials {
    let mut resolved = ResolvedMaterials::default();

    for primitive in primitives {
        let handle = primitive.material();
        let index = match resolved.materials.iter().position(|&seen| seen == handle) {
            Some(index) => index,
            None => {
                resolved.materials.push(handle);
                resolved.materials.len() - 1
            }
        };
        resolved.indices.push(index as u32);
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Material, MaterialRegistry};
    use crate::scene::{Sphere, Triangle};
    use glam::Vec3;

    #[test]
    fn shared_material_resolves_to_one_entry() {
        let mut registry = MaterialRegistry::new();
        let m1 = registry.insert(Material::new("m1"));
        let primitives = vec![
            Primitive::from(Sphere::new(Vec3::ZERO, 1.0, m1)),
            Primitive::from(Sphere::new(Vec3::X, 0.5, m1)),
        ];

        let resolved = resolve(&primitives);
        assert_eq!(resolved.materials, vec![m1]);
        assert_eq!(resolved.indices, vec![0, 0]);
        assert_eq!(resolved.usage(0), 2);
    }

    #[test]
    fn distinct_handles_keep_first_seen_order() {
        let mut registry = MaterialRegistry::new();
        let a = registry.insert(Material::new("a"));
        let b = registry.insert(Material::new("b"));
        let c = registry.insert(Material::new("c"));
        let primitives = vec![
            Primitive::from(Sphere::new(Vec3::ZERO, 1.0, c)),
            Primitive::from(Triangle::new(Vec3::X, Vec3::Y, Vec3::Z, a)),
            Primitive::from(Sphere::new(Vec3::ONE, 1.0, c)),
            Primitive::from(Sphere::new(Vec3::NEG_ONE, 1.0, b)),
        ];

        let resolved = resolve(&primitives);
        assert_eq!(resolved.materials, vec![c, a, b]);
        assert_eq!(resolved.indices, vec![0, 1, 0, 2]);
    }

    #[test]
    fn value_identical_materials_are_not_merged() {
        let mut registry = MaterialRegistry::new();
        let a = registry.insert(Material::new("same"));
        let b = registry.insert(Material::new("same"));
        let primitives = vec![
            Primitive::from(Sphere::new(Vec3::ZERO, 1.0, a)),
            Primitive::from(Sphere::new(Vec3::ZERO, 1.0, b)),
        ];

        let resolved = resolve(&primitives);
        assert_eq!(resolved.materials.len(), 2);
        assert_eq!(resolved.indices, vec![0, 1]);
    }

    #[test]
    fn empty_primitive_list_resolves_to_nothing() {
        let resolved = resolve(&Vec::<Primitive>::new());
        assert!(resolved.materials.is_empty());
        assert!(resolved.indices.is_empty());
    }

    #[test]
    fn resolution_is_reproducible() {
        let mut registry = MaterialRegistry::new();
        let a = registry.insert(Material::new("a"));
        let b = registry.insert(Material::new("b"));
        let primitives = vec![
            Primitive::from(Sphere::new(Vec3::ZERO, 1.0, b)),
            Primitive::from(Sphere::new(Vec3::ZERO, 1.0, a)),
        ];
        assert_eq!(resolve(&primitives), resolve(&primitives));
    }
}
