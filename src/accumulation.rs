//! Progressive accumulation bookkeeping.
//!
//! The kernel keeps a running average in the output image weighted by the
//! frame index. The controller decides when that average has to start over:
//! whenever the identity of the camera or of the scene differs from the one
//! seen on the previous frame, and, under [`ConfigChangePolicy::Reset`],
//! whenever the sampling config changes.

use crate::config::Config;
use crate::kernel::KernelTarget;
use crate::transport::TransportBinder;
use crate::util::Revision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigChangePolicy {
    /// A different config restarts accumulation.
    #[default]
    Reset,
    /// Frames rendered under different configs are averaged together.
    Keep,
}

/// What the controller compares between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    pub camera: Revision,
    pub scene: Revision,
    pub config: Config,
}

#[derive(Debug)]
pub struct AccumulationController {
    frame_index: u32,
    clear_color: [f32; 4],
    previous: Option<Observed>,
    policy: ConfigChangePolicy,
    resets: usize,
}

impl Default for AccumulationController {
    fn default() -> Self {
        Self::new(ConfigChangePolicy::default())
    }
}

impl AccumulationController {
    pub fn new(policy: ConfigChangePolicy) -> Self {
        Self {
            frame_index: 0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            previous: None,
            policy,
            resets: 0,
        }
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn policy(&self) -> ConfigChangePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ConfigChangePolicy) {
        self.policy = policy;
    }

    /// Number of resets performed so far.
    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn reset(&mut self, target: &mut impl KernelTarget) {
        tracing::trace!("Resetting accumulation after {} frames", self.frame_index);
        self.frame_index = 0;
        target.clear_output(self.clear_color);
        self.resets += 1;
    }

    /// Compares `observed` with the previous frame and resets at most once.
    ///
    /// The first observation is never a change: the controller starts out
    /// reset. Returns true if a reset happened.
    pub fn sync(&mut self, observed: Observed, target: &mut impl KernelTarget) -> bool {
        let changed = match self.previous {
            None => false,
            Some(previous) => {
                previous.camera != observed.camera
                    || previous.scene != observed.scene
                    || (self.policy == ConfigChangePolicy::Reset
                        && previous.config != observed.config)
            }
        };
        self.previous = Some(observed);

        if changed {
            self.reset(target);
        }
        changed
    }

    /// Bumps the frame index and dispatches the kernel with it.
    pub fn advance(&mut self, binder: &TransportBinder, target: &mut impl KernelTarget) -> u32 {
        self.frame_index = self.frame_index.saturating_add(1);
        binder.bind_frame_index(self.frame_index, target);
        target.dispatch();
        self.frame_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{HostTarget, KernelLayout, KernelParams};

    struct Fixture {
        layout: KernelLayout,
        target: HostTarget,
        controller: AccumulationController,
    }

    impl Fixture {
        fn new(policy: ConfigChangePolicy) -> Self {
            let layout = KernelLayout::new(KernelParams::default()).unwrap();
            let target = HostTarget::new(&layout, 2);
            Self {
                layout,
                target,
                controller: AccumulationController::new(policy),
            }
        }

        /// One frame: sync, read the index the frame starts from, dispatch.
        fn frame(&mut self, observed: Observed) -> (bool, u32) {
            let reset = self.controller.sync(observed, &mut self.target);
            let start = self.controller.frame_index();
            let binder = TransportBinder::new(&self.layout);
            self.controller.advance(&binder, &mut self.target);
            (reset, start)
        }
    }

    fn observed(camera: Revision, scene: Revision) -> Observed {
        Observed {
            camera,
            scene,
            config: Config::default(),
        }
    }

    #[test]
    fn frame_index_increases_by_one_per_dispatch() {
        let mut fixture = Fixture::new(ConfigChangePolicy::Reset);
        let state = observed(Revision::next(), Revision::next());
        for _ in 0..3 {
            fixture.frame(state);
        }
        assert_eq!(fixture.target.dispatches(), &[1, 2, 3]);
        assert_eq!(fixture.controller.resets(), 0);
    }

    #[test]
    fn camera_move_resets_exactly_once() {
        let mut fixture = Fixture::new(ConfigChangePolicy::Reset);
        let scene = Revision::next();
        let before = observed(Revision::next(), scene);
        for _ in 0..4 {
            assert!(!fixture.frame(before).0);
        }

        // frame 5: the camera moved
        let after = observed(Revision::next(), scene);
        let starts: Vec<(bool, u32)> = (0..3).map(|_| fixture.frame(after)).collect();
        assert_eq!(starts, vec![(true, 0), (false, 1), (false, 2)]);
        assert_eq!(fixture.controller.resets(), 1);
        assert_eq!(fixture.target.clears(), 1);
        assert_eq!(fixture.target.dispatches(), &[1, 2, 3, 4, 1, 2, 3]);
    }

    #[test]
    fn scene_swap_resets() {
        let mut fixture = Fixture::new(ConfigChangePolicy::Reset);
        let camera = Revision::next();
        fixture.frame(observed(camera, Revision::next()));
        fixture.frame(observed(camera, Revision::next()));
        assert_eq!(fixture.controller.resets(), 1);
    }

    #[test]
    fn camera_and_scene_change_together_reset_once() {
        let mut fixture = Fixture::new(ConfigChangePolicy::Reset);
        let before = Observed {
            config: Config::PRESETS[0],
            ..observed(Revision::next(), Revision::next())
        };
        fixture.frame(before);
        fixture.frame(before);

        let after = Observed {
            config: Config::PRESETS[3],
            ..observed(Revision::next(), Revision::next())
        };
        assert_eq!(fixture.frame(after), (true, 0));
        assert_eq!(fixture.controller.resets(), 1);
        assert_eq!(fixture.target.clears(), 1);
        assert_eq!(fixture.target.dispatches(), &[1, 2, 1]);
    }

    #[test]
    fn config_change_follows_policy() {
        let camera = Revision::next();
        let scene = Revision::next();
        let low = Observed {
            config: Config::PRESETS[0],
            ..observed(camera, scene)
        };
        let high = Observed {
            config: Config::PRESETS[3],
            ..low
        };

        let mut reset = Fixture::new(ConfigChangePolicy::Reset);
        reset.frame(low);
        assert!(reset.frame(high).0);
        assert!(!reset.frame(high).0);

        let mut keep = Fixture::new(ConfigChangePolicy::Keep);
        keep.frame(low);
        assert!(!keep.frame(high).0);
        assert_eq!(keep.target.dispatches(), &[1, 2]);
    }

    #[test]
    fn reset_clears_the_output() {
        let mut fixture = Fixture::new(ConfigChangePolicy::Reset);
        let background = fixture.layout.location("background_color").unwrap();
        fixture
            .target
            .write(background, bytemuck::cast_slice(&[1.0f32, 1.0, 1.0]));
        fixture.frame(observed(Revision::next(), Revision::next()));
        assert_eq!(fixture.target.output()[0], [1.0; 4]);

        let mut controller = AccumulationController::new(ConfigChangePolicy::Reset)
            .with_clear_color([0.1, 0.2, 0.3, 1.0]);
        controller.reset(&mut fixture.target);
        assert_eq!(controller.frame_index(), 0);
        assert!(fixture.target.output().iter().all(|p| *p == [0.1, 0.2, 0.3, 1.0]));
    }
}
