use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use realtime_raytracing_lib::{
    accumulation::ConfigChangePolicy,
    application::{AppState, Application, Flow, Layer, Screen, WindowOptions},
    camera::{Camera, CameraController},
    config::Config,
    kernel::{KernelParams, TransportMode},
    material::MaterialRegistry,
    raytracer::Raytracer,
    renderer::Presenter,
    scenes::{self, DemoScene},
    Result,
};
use winit::{
    dpi::PhysicalSize,
    event::{
        ElementState, Event, KeyboardInput, ModifiersState, MouseScrollDelta, VirtualKeyCode,
        WindowEvent,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Storage {
    /// Fixed-size uniform arrays
    Inline,
    /// Storage buffers
    Buffer,
}

#[derive(Debug, Parser)]
#[command(name = "realtime-raytracing", version, about = "Progressive GPU ray tracer")]
struct Options {
    /// Window width
    #[arg(short = 'W', long, default_value_t = 1280)]
    window_width: u32,

    /// Window height
    #[arg(short = 'H', long, default_value_t = 720)]
    window_height: u32,

    /// Window to image ratio
    #[arg(short, long, default_value_t = 2.0)]
    scale: f32,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// How primitives reach the kernel
    #[arg(long, value_enum, default_value_t = Storage::Inline)]
    storage: Storage,

    /// Sphere capacity of the kernel
    #[arg(long, default_value_t = 16)]
    max_spheres: u32,

    /// Triangle capacity of the kernel
    #[arg(long, default_value_t = 5)]
    max_triangles: u32,

    /// Compute workgroup edge length
    #[arg(long, default_value_t = 8)]
    workgroup_size: u32,

    /// Keep accumulating when the sampling config changes
    #[arg(long)]
    keep_on_config_change: bool,

    /// Where Ctrl+S saves the image
    #[arg(short, long, default_value = "output.png")]
    output: PathBuf,
}

impl Options {
    fn image_size(&self) -> (u32, u32) {
        let scale = self.scale.max(0.01);
        let width = (self.window_width as f32 / scale) as u32;
        let height = (self.window_height as f32 / scale) as u32;
        (width.max(1), height.max(1))
    }

    fn kernel_params(&self) -> KernelParams {
        KernelParams {
            workgroup_size: self.workgroup_size,
            sphere_capacity: self.max_spheres,
            triangle_capacity: self.max_triangles,
            mode: match self.storage {
                Storage::Inline => TransportMode::Inline,
                Storage::Buffer => TransportMode::Buffer,
            },
        }
    }
}

/// Steps `index` within `len` on Left/Right. Returns true if it moved.
fn change_index(index: &mut usize, len: usize, key: VirtualKeyCode) -> bool {
    match key {
        VirtualKeyCode::Left => *index = (*index + len - 1) % len,
        VirtualKeyCode::Right => *index = (*index + 1) % len,
        _ => return false,
    }
    true
}

struct RayTracingGPU {
    raytracer: Raytracer,
    presenter: Presenter,
    camera: Camera,
    camera_controller: CameraController,
    registry: MaterialRegistry,
    scenes: Vec<DemoScene>,
    scene_index: usize,
    config_index: usize,
    held: Held,
    modifiers: ModifiersState,
    output: PathBuf,
}

#[derive(Debug, Default)]
struct Held {
    scene_key: bool,
    config_key: bool,
    fov_key: bool,
}

impl RayTracingGPU {
    fn load_scene(&mut self, screen: &Screen) {
        let demo = &self.scenes[self.scene_index];
        match demo.compile(&self.registry) {
            Ok(compiled) => {
                self.raytracer.set_scene(&screen.device, &screen.queue, compiled);
            }
            Err(err) => tracing::error!("Failed to compile scene '{}': {}", demo.name, err),
        }
    }

    fn on_key(&mut self, key: VirtualKeyCode, state: ElementState, screen: &mut Screen) -> Flow {
        let pressed = state == ElementState::Pressed;
        match key {
            VirtualKeyCode::S => self.held.scene_key = pressed,
            VirtualKeyCode::C => self.held.config_key = pressed,
            VirtualKeyCode::Space => self.held.fov_key = pressed,
            _ => {}
        }
        if !pressed {
            return Flow::Continue;
        }

        if key == VirtualKeyCode::Escape {
            return Flow::Exit;
        }
        if key == VirtualKeyCode::S && self.modifiers.ctrl() {
            // S doubles as a movement key
            self.camera_controller.release_all();
            if let Err(err) = self
                .raytracer
                .save_image(&screen.device, &screen.queue, &self.output)
            {
                tracing::error!("Failed to save image: {}", err);
            }
        } else if self.held.scene_key
            && change_index(&mut self.scene_index, self.scenes.len(), key)
        {
            self.camera_controller.release_all();
            self.load_scene(screen);
        } else if self.held.config_key
            && change_index(&mut self.config_index, Config::PRESETS.len(), key)
        {
            self.camera_controller.release_all();
            let config = Config::PRESETS[self.config_index];
            self.raytracer.set_config(&screen.device, &screen.queue, config);
        }
        Flow::Continue
    }
}

impl Layer for RayTracingGPU {
    type Options = Options;

    fn start(options: Options, screen: &mut Screen, _app: &AppState) -> Result<Self> {
        let image_size = options.image_size();
        let policy = if options.keep_on_config_change {
            ConfigChangePolicy::Keep
        } else {
            ConfigChangePolicy::Reset
        };
        let mut raytracer = Raytracer::new(
            &screen.device,
            &screen.queue,
            options.kernel_params(),
            policy,
            image_size,
        )?;
        let presenter = Presenter::new(&screen.device, screen.config.format, raytracer.output());

        let camera = Camera::new(
            glam::Vec3::new(0.0, 0.0, 6.0),
            glam::Vec3::NEG_Z,
            60.0,
            image_size,
        );
        let mut registry = MaterialRegistry::new();
        let scenes = scenes::all(&mut registry);

        let config_index = 2;
        raytracer.set_camera(&screen.device, &screen.queue, &camera);
        raytracer.set_config(&screen.device, &screen.queue, Config::PRESETS[config_index]);

        let mut layer = Self {
            raytracer,
            presenter,
            camera,
            camera_controller: CameraController::new(10.0, 1.5),
            registry,
            scenes,
            scene_index: 0,
            config_index,
            held: Held::default(),
            modifiers: ModifiersState::empty(),
            output: options.output,
        };
        layer.load_scene(screen);
        Ok(layer)
    }

    fn process_event(&mut self, event: &Event<()>, _app: &AppState, screen: &mut Screen) -> Flow {
        let Event::WindowEvent { event, .. } = event else {
            return Flow::Continue;
        };

        match event {
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = *modifiers,
            WindowEvent::MouseWheel { delta, .. } if self.held.fov_key => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / 20.0,
                };
                self.camera.set_fov(self.camera.fov() + lines);
            }
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state,
                        virtual_keycode: Some(key),
                        ..
                    },
                ..
            } => {
                let cycling = self.held.scene_key || self.held.config_key;
                let arrow = matches!(key, VirtualKeyCode::Left | VirtualKeyCode::Right);
                let released = *state == ElementState::Released;
                if released || (!(cycling && arrow) && !self.modifiers.ctrl()) {
                    self.camera_controller.process_events(event);
                }
                return self.on_key(*key, *state, screen);
            }
            _ => {}
        }
        Flow::Continue
    }

    fn resize(&mut self, _new_size: PhysicalSize<u32>, _app: &AppState, _screen: &mut Screen) {
        // the image keeps its size, the quad stretches
    }

    fn update(&mut self, app: &AppState, screen: &mut Screen) {
        self.camera_controller.update(&mut self.camera, app.delta_time());
        // unchanged revisions are not rebound
        self.raytracer.set_camera(&screen.device, &screen.queue, &self.camera);
        self.raytracer.render(&screen.device, &screen.queue);
    }

    fn render(
        &mut self,
        _app: &AppState,
        screen: &mut Screen,
    ) -> std::result::Result<(), wgpu::SurfaceError> {
        self.presenter
            .render(&screen.device, &screen.queue, &screen.surface)
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<()> {
        tracing::info!("exiting after {} accumulated frames", self.raytracer.frame_index());
        Ok(())
    }
}

fn main() {
    let options = Options::parse();
    let level = if options.verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let window = WindowOptions {
        title: "realtime-raytracing".to_owned(),
        size: PhysicalSize::new(options.window_width, options.window_height),
    };
    if let Err(err) = pollster::block_on(Application::<RayTracingGPU>::init(window, options)) {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_at_half_window_size() {
        let options = Options::parse_from(["realtime-raytracing"]);
        assert_eq!(options.image_size(), (640, 360));
        assert_eq!(options.kernel_params(), KernelParams::default());
        assert_eq!(options.output, PathBuf::from("output.png"));
    }

    #[test]
    fn storage_flag_selects_buffer_transport() {
        let options = Options::parse_from([
            "realtime-raytracing",
            "--storage",
            "buffer",
            "--max-spheres",
            "256",
        ]);
        let params = options.kernel_params();
        assert_eq!(params.mode, TransportMode::Buffer);
        assert_eq!(params.sphere_capacity, 256);
    }

    #[test]
    fn index_wraps_in_both_directions() {
        let mut index = 0;
        assert!(change_index(&mut index, 4, VirtualKeyCode::Left));
        assert_eq!(index, 3);
        assert!(change_index(&mut index, 4, VirtualKeyCode::Right));
        assert_eq!(index, 0);
        assert!(!change_index(&mut index, 4, VirtualKeyCode::Up));
    }
}
