use glam::Vec3;
use realtime_raytracing_lib::{
    accumulation::ConfigChangePolicy,
    camera::Camera,
    compiled::CompiledScene,
    config::Config,
    kernel::{HostTarget, KernelLayout, KernelParams, Region, TransportMode, KERNEL_TEMPLATE},
    layout::{DeviceRecord, DeviceSphere, DeviceTriangle, FrameUniforms},
    material::{Channel, Material, MaterialPacker, MaterialRegistry},
    scene::{Scene, Sphere},
    scenes,
    session::RenderSession,
};

fn session(mode: TransportMode) -> (RenderSession, HostTarget) {
    let layout = KernelLayout::new(KernelParams {
        mode,
        ..KernelParams::default()
    })
    .unwrap();
    let target = HostTarget::new(&layout, 4);
    (RenderSession::new(layout, ConfigChangePolicy::Reset), target)
}

fn camera() -> Camera {
    Camera::new(Vec3::new(0.0, 0.0, 6.0), Vec3::NEG_Z, 60.0, (640, 360))
}

#[test]
fn demo_scene_renders_progressively() {
    let mut registry = MaterialRegistry::new();
    let demo = scenes::scene_2(&mut registry);
    let packer = MaterialPacker::new(16, 64);
    let compiled =
        CompiledScene::compile(demo.name.clone(), &demo.scene, &registry, &packer).unwrap();
    let background = compiled.background();

    let (mut session, mut target) = session(TransportMode::Inline);
    let mut camera = camera();
    session.set_camera(&camera, &mut target);
    session.set_scene(compiled, &mut target);
    session.set_config(Config::PRESETS[1], &mut target);

    let frames: Vec<_> = (0..4).filter_map(|_| session.render(&mut target)).collect();
    assert_eq!(frames, vec![1, 2, 3, 4]);

    let frame = target.frame();
    assert_eq!((frame.num_spheres, frame.num_triangles, frame.num_materials), (3, 2, 4));
    assert_eq!(frame.num_samples, 4);
    let [r, g, b, a] = target.output()[0];
    assert!(Vec3::new(r, g, b).abs_diff_eq(background, 1e-6));
    assert_eq!(a, 1.0);

    camera.rotate(0.1, 0.0);
    session.set_camera(&camera, &mut target);
    assert_eq!(session.render(&mut target), Some(1));
    assert_eq!(target.clears(), 1);
}

#[test]
fn transport_modes_agree_on_a_demo_scene() {
    let mut registry = MaterialRegistry::new();
    let demo = scenes::random_scene(&mut registry, 10, 4, 7);
    let packer = MaterialPacker::new(8, 8);

    let mut regions = Vec::new();
    for mode in [TransportMode::Inline, TransportMode::Buffer] {
        let compiled =
        CompiledScene::compile(demo.name.clone(), &demo.scene, &registry, &packer).unwrap();
        let (mut session, mut target) = session(mode);
        session.set_scene(compiled, &mut target);
        regions.push((
            target.region(Region::Spheres).to_vec(),
            target.region(Region::Triangles).to_vec(),
            target.frame().num_spheres,
        ));
    }
    assert_eq!(regions[0], regions[1]);
    assert_eq!(regions[0].2, 10);
}

#[test]
fn sampled_material_reaches_its_strip() {
    let mut registry = MaterialRegistry::new();
    let mut texture = image::RgbaImage::new(2, 2);
    texture.put_pixel(1, 1, image::Rgba([255, 0, 0, 255]));
    let earth = registry.insert(Material::new("earth").with_albedo(Channel::sampled(texture)));
    let plain = registry.insert(Material::new("plain"));

    let mut scene = Scene::default();
    scene.add(Sphere::new(Vec3::ZERO, 1.0, plain));
    scene.add(Sphere::new(Vec3::X, 1.0, earth));

    let compiled =
        CompiledScene::compile("sampled", &scene, &registry, &MaterialPacker::new(4, 8)).unwrap();
    let atlas = compiled.atlas().image();

    // "plain" is first seen, so it owns rows 0..4
    assert_eq!(atlas.get_pixel(0, 0).0, [245, 245, 245, 255]);
    assert_eq!(atlas.get_pixel(3, 7).0[..3], [255, 0, 0]);
    assert_eq!(atlas.get_pixel(0, 4).0[..3], [0, 0, 0]);

    let sphere: DeviceSphere = compiled.spheres()[1];
    assert_eq!(sphere.material_index, 1);
}

#[test]
fn kernel_declares_the_host_layout() {
    let layout = KernelLayout::new(KernelParams::default()).unwrap();
    let source = layout.specialize(KERNEL_TEMPLATE).unwrap();
    assert!(source.contains(&DeviceSphere::wgsl_struct()));
    assert!(source.contains(&DeviceTriangle::wgsl_struct()));
    assert!(source.contains(&FrameUniforms::wgsl_struct()));
    assert!(source.contains("let rows = max(height / max(frame.num_materials, 1u), 1u);"));
}
