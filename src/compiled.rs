use crate::error::{Error, Result};
use crate::layout::{DeviceSphere, DeviceTriangle};
use crate::material::{
    resolve, Material, MaterialAtlas, MaterialHandle, MaterialPacker, MaterialRegistry,
};
use crate::scene::{Primitive, Scene};
use crate::texture::Texture;
use crate::util::Revision;

/// Immutable, device-ready snapshot of a [`Scene`].
///
/// Every record's `material_index` is a valid index into `materials`, and
/// the atlas holds one strip per entry of `materials` in the same order.
pub struct CompiledScene {
    id: Revision,
    name: String,
    materials: Vec<MaterialHandle>,
    spheres: Vec<DeviceSphere>,
    triangles: Vec<DeviceTriangle>,
    background: glam::Vec3,
    atlas: MaterialAtlas,
    atlas_texture: Option<Texture>,
}

impl CompiledScene {
    pub fn compile(
        name: impl Into<String>,
        scene: &Scene,
        registry: &MaterialRegistry,
        packer: &MaterialPacker,
    ) -> Result<Self> {
        let name = name.into();
        tracing::info!("Compiling scene '{}'", name);
        tracing::trace!("    background = {:?}", scene.background);

        let resolved = resolve(&scene.primitives);
        let materials = resolved
            .materials
            .iter()
            .map(|&handle| registry.get(handle).ok_or(Error::StaleMaterial(handle)))
            .collect::<Result<Vec<&Material>>>()?;

        for (index, material) in materials.iter().enumerate() {
            tracing::trace!(
                "    '{}' is referenced by {} objects",
                material.name(),
                resolved.usage(index)
            );
        }

        let mut spheres = Vec::new();
        let mut triangles = Vec::new();
        for (primitive, &index) in scene.primitives.iter().zip(&resolved.indices) {
            match primitive {
                Primitive::Sphere(sphere) => spheres.push(DeviceSphere::encode(sphere, index)),
                Primitive::Triangle(triangle) => {
                    triangles.push(DeviceTriangle::encode(triangle, index))
                }
            }
        }

        let atlas = packer.pack(&materials)?;

        tracing::info!("    Scene has {} unique materials", materials.len());
        tracing::info!("    Scene has {} spheres", spheres.len());
        tracing::info!("    Scene has {} triangles", triangles.len());

        Ok(Self {
            id: Revision::next(),
            name,
            materials: resolved.materials,
            spheres,
            triangles,
            background: scene.background,
            atlas,
            atlas_texture: None,
        })
    }

    /// Uploads the material atlas. The texture lives as long as the scene.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let label = format!("'{}' material atlas", self.name);
        let texture = Texture::from_image(device, queue, self.atlas.image(), Some(&label));
        let (width, height) = texture.size();
        tracing::trace!("Uploaded {label} ({width} x {height})");
        self.atlas_texture = Some(texture);
    }

    pub fn id(&self) -> Revision {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn materials(&self) -> &[MaterialHandle] {
        &self.materials
    }

    pub fn spheres(&self) -> &[DeviceSphere] {
        &self.spheres
    }

    pub fn triangles(&self) -> &[DeviceTriangle] {
        &self.triangles
    }

    pub fn background(&self) -> glam::Vec3 {
        self.background
    }

    pub fn atlas(&self) -> &MaterialAtlas {
        &self.atlas
    }

    pub fn atlas_texture(&self) -> Option<&Texture> {
        self.atlas_texture.as_ref()
    }
}

impl std::fmt::Debug for CompiledScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScene")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("materials", &self.materials.len())
            .field("spheres", &self.spheres.len())
            .field("triangles", &self.triangles.len())
            .field("uploaded", &self.atlas_texture.is_some())
            .finish()
    }
}
