//! Demo scenes shown by the interactive shell.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::compiled::CompiledScene;
use crate::error::Result;
use crate::material::{Channel, Material, MaterialPacker, MaterialRegistry};
use crate::scene::{Scene, Sphere, Triangle};
use crate::util::math::normalize_rgb8;

/// A scene plus the square atlas size it is compiled with.
#[derive(Debug, Clone)]
pub struct DemoScene {
    pub name: String,
    pub scene: Scene,
    pub atlas_size: u32,
}

impl DemoScene {
    pub fn compile(&self, registry: &MaterialRegistry) -> Result<CompiledScene> {
        let packer = MaterialPacker::new(self.atlas_size, self.atlas_size);
        CompiledScene::compile(self.name.clone(), &self.scene, registry, &packer)
    }
}

fn procedural(name: &str, albedo: Vec3, deviation: f32) -> Material {
    Material::new(name).with_albedo(Channel::procedural(albedo, deviation))
}

pub fn scene_1(registry: &mut MaterialRegistry) -> DemoScene {
    let sphere_mat = registry.insert(procedural("teal", Vec3::new(0.2, 0.9, 0.8), 0.03));
    let red_mat = registry.insert(procedural("red", Vec3::new(0.8, 0.3, 0.3), 0.1));
    let mirror_mat = registry.insert(
        procedural("mirror", Vec3::splat(0.8), 0.02)
            .with_roughness(Channel::procedural(0.0, 0.01)),
    );

    let mut scene = Scene::new(normalize_rgb8([200, 200, 200]));
    scene.add(Sphere::new(Vec3::ZERO, 1.0, sphere_mat));
    scene.add(Sphere::new(Vec3::new(0.0, -6.0, 0.0), 5.0, sphere_mat));
    scene.add(Triangle::new(
        Vec3::new(-1.3, 0.0, -1.2),
        Vec3::new(-2.0, 1.1, 1.0),
        Vec3::new(-2.0, -1.1, 1.0),
        mirror_mat,
    ));
    scene.add(Sphere::new(Vec3::new(-1.3, 0.0, -1.2), 0.1, red_mat));

    DemoScene {
        name: "mirror".to_owned(),
        scene,
        atlas_size: 4096,
    }
}

pub fn scene_2(registry: &mut MaterialRegistry) -> DemoScene {
    let purple = registry.insert(procedural("purple", Vec3::new(1.0, 0.0, 1.0), 0.06));
    let blue = registry.insert(procedural("blue", Vec3::new(0.2, 0.3, 1.0), 0.0));
    let orange = registry.insert(procedural("orange", Vec3::new(1.0, 0.6, 0.2), 0.01));
    let mirror = registry.insert(
        procedural("mirror", Vec3::splat(0.8), 0.0)
            .with_roughness(Channel::procedural(0.0, 0.0)),
    );

    let mut scene = Scene::new(normalize_rgb8([200, 200, 200]));
    scene.add(Sphere::new(Vec3::new(0.5, 0.0, 0.0), 1.0, purple));
    scene.add(Sphere::new(Vec3::new(0.0, -31.0, 0.0), 30.0, blue));
    scene.add(Sphere::new(Vec3::new(10.0, 4.0, -25.0), 15.0, orange));
    scene.add(Triangle::new(
        Vec3::new(0.0, 2.0, -3.0),
        Vec3::new(-2.0, 2.0, -2.0),
        Vec3::new(0.0, -1.0, -3.0),
        mirror,
    ));
    scene.add(Triangle::new(
        Vec3::new(-2.0, 2.0, -2.0),
        Vec3::new(0.0, -1.0, -3.0),
        Vec3::new(-2.0, -1.0, -2.0),
        mirror,
    ));

    DemoScene {
        name: "spheres and mirror".to_owned(),
        scene,
        atlas_size: 4096,
    }
}

/// Spheres scattered in a cube of side 8 around the origin, each picking one
/// of `num_materials` random materials.
pub fn random_scene(
    registry: &mut MaterialRegistry,
    num_spheres: usize,
    num_materials: usize,
    seed: u64,
) -> DemoScene {
    let mut rng = Pcg32::seed_from_u64(seed);

    let materials: Vec<_> = (0..num_materials.max(1))
        .map(|i| {
            let albedo = normalize_rgb8([rng.random(), rng.random(), rng.random()]);
            let roughness = rng.random_range(0..=5) as f32 / 10.0;
            let material = Material::new(format!("random {i}"))
                .with_albedo(Channel::procedural(albedo, 0.05))
                .with_roughness(Channel::procedural(roughness, 0.01));
            registry.insert(material)
        })
        .collect();

    let mut scene = Scene::new(normalize_rgb8([210, 210, 240]));
    for _ in 0..num_spheres {
        let mut coord = || rng.random_range(-40_000..=40_000) as f32 / 10_000.0;
        let position = Vec3::new(coord(), coord(), coord());
        let radius = rng.random_range(5_000..=10_000) as f32 / 10_000.0;
        let material = materials[rng.random_range(0..materials.len())];
        scene.add(Sphere::new(position, radius, material));
    }

    DemoScene {
        name: format!("random {num_spheres}/{num_materials}"),
        scene,
        atlas_size: 2048,
    }
}

pub fn all(registry: &mut MaterialRegistry) -> Vec<DemoScene> {
    vec![
        scene_1(registry),
        scene_2(registry),
        random_scene(registry, 8, 4, 0),
        random_scene(registry, 16, 4, 0),
    ]
}
