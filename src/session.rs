use crate::accumulation::{AccumulationController, ConfigChangePolicy, Observed};
use crate::camera::Camera;
use crate::compiled::CompiledScene;
use crate::config::Config;
use crate::kernel::{KernelLayout, KernelTarget};
use crate::transport::{BindReport, TransportBinder};

/// Per-frame state of one kernel instance, independent of the device.
///
/// Camera, scene and config can be replaced at any time between frames;
/// rendering starts once all three have been set.
#[derive(Debug)]
pub struct RenderSession {
    layout: KernelLayout,
    controller: AccumulationController,
    camera: Option<Camera>,
    scene: Option<CompiledScene>,
    config: Option<Config>,
    last_bind: BindReport,
}

impl RenderSession {
    pub fn new(layout: KernelLayout, policy: ConfigChangePolicy) -> Self {
        Self {
            layout,
            controller: AccumulationController::new(policy),
            camera: None,
            scene: None,
            config: None,
            last_bind: BindReport::default(),
        }
    }

    pub fn layout(&self) -> &KernelLayout {
        &self.layout
    }

    pub fn controller(&self) -> &AccumulationController {
        &self.controller
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn scene(&self) -> Option<&CompiledScene> {
        self.scene.as_ref()
    }

    pub fn config(&self) -> Option<Config> {
        self.config
    }

    pub fn frame_index(&self) -> u32 {
        self.controller.frame_index()
    }

    /// Report of the most recent scene bind.
    pub fn last_bind(&self) -> BindReport {
        self.last_bind
    }

    /// Binds `camera` unless its revision is already bound.
    pub fn set_camera(&mut self, camera: &Camera, target: &mut impl KernelTarget) {
        if self.camera.as_ref().map(Camera::revision) == Some(camera.revision()) {
            return;
        }
        TransportBinder::new(&self.layout).bind_camera(&camera.uniform(), target);
        self.camera = Some(camera.clone());
    }

    /// Binds `scene` and takes ownership of it, returning the previous one.
    pub fn set_scene(
        &mut self,
        scene: CompiledScene,
        target: &mut impl KernelTarget,
    ) -> Option<CompiledScene> {
        tracing::info!("Setting scene '{}' ({})", scene.name(), scene.id());
        self.last_bind = TransportBinder::new(&self.layout).bind_scene(&scene, target);
        self.scene.replace(scene)
    }

    pub fn set_config(&mut self, config: Config, target: &mut impl KernelTarget) {
        if self.config == Some(config) {
            return;
        }
        tracing::info!(
            "Setting config: {} samples, {} bounces",
            config.num_samples,
            config.bounce_limit
        );
        TransportBinder::new(&self.layout).bind_config(config, target);
        self.config = Some(config);
    }

    pub fn can_render(&self) -> bool {
        self.camera.is_some() && self.scene.is_some() && self.config.is_some()
    }

    /// Resets if anything changed since the previous frame, then dispatches.
    ///
    /// Returns the frame index the kernel ran with, or `None` while camera,
    /// scene or config is still missing.
    pub fn render(&mut self, target: &mut impl KernelTarget) -> Option<u32> {
        let (Some(camera), Some(scene), Some(config)) = (&self.camera, &self.scene, self.config)
        else {
            tracing::trace!("Skipping frame: camera, scene and config are not all set");
            return None;
        };

        let observed = Observed {
            camera: camera.revision(),
            scene: scene.id(),
            config,
        };
        self.controller.sync(observed, target);
        let binder = TransportBinder::new(&self.layout);
        Some(self.controller.advance(&binder, target))
    }
}
