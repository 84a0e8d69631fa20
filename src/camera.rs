use glam::{Mat4, Quat, Vec3};
use winit::event::{ElementState, KeyboardInput, VirtualKeyCode, WindowEvent};

use crate::util::{math, Revision};

/// Pinhole camera described by position, direction and vertical fov.
///
/// Every mutation stamps a new [`Revision`]; the accumulation controller
/// treats a new revision as a new camera.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    direction: Vec3,
    /// Degrees.
    fov_y: f32,
    aspect: f32,
    z_near: f32,
    z_far: f32,
    revision: Revision,
}

/// Matrices the kernel needs to turn a pixel into a world-space ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraUniform {
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub position: Vec3,
}

impl Camera {
    pub const UP: Vec3 = Vec3::Y;
    /// Radians above or below the horizon; `sin` stays under 0.999.
    pub const MAX_ELEVATION: f32 = 1.52;

    pub fn new(position: Vec3, direction: Vec3, fov_y: f32, image_size: (u32, u32)) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            fov_y,
            aspect: image_size.0 as f32 / image_size.1.max(1) as f32,
            z_near: 0.1,
            z_far: 100.0,
            revision: Revision::next(),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn fov(&self) -> f32 {
        self.fov_y
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.revision = Revision::next();
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction.normalize_or_zero();
        self.revision = Revision::next();
    }

    pub fn set_fov(&mut self, fov_y: f32) {
        self.fov_y = fov_y.clamp(1.0, 179.0);
        self.revision = Revision::next();
    }

    pub fn set_image_size(&mut self, image_size: (u32, u32)) {
        self.aspect = image_size.0 as f32 / image_size.1.max(1) as f32;
        self.revision = Revision::next();
    }

    pub fn right(&self) -> Vec3 {
        self.direction.cross(Self::UP).normalize_or_zero()
    }

    /// Yaw around world up, pitch around the camera's right axis; radians.
    ///
    /// Elevation is clamped to [`Camera::MAX_ELEVATION`], so a direction
    /// along `UP` is pulled back off the pole.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        let elevation = self.direction.y.clamp(-1.0, 1.0).asin();
        let target = (elevation - pitch).clamp(-Self::MAX_ELEVATION, Self::MAX_ELEVATION);
        let mut right = self.right();
        if right == Vec3::ZERO {
            right = Vec3::X;
        }
        let pitched = Quat::from_axis_angle(right, target - elevation) * self.direction;
        self.set_direction(Quat::from_axis_angle(Self::UP, -yaw) * pitched);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, Self::UP)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            math::degree_to_radian(self.fov_y),
            self.aspect,
            self.z_near,
            self.z_far,
        )
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            inv_view: self.view_matrix().inverse(),
            inv_proj: self.projection_matrix().inverse(),
            position: self.position,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Movement {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    yaw_left: bool,
    yaw_right: bool,
    pitch_up: bool,
    pitch_down: bool,
}

/// Keyboard fly camera: WASD moves on the view plane, Q/E moves along world
/// up, arrow keys rotate.
pub struct CameraController {
    pub speed: f32,
    pub rotation_speed: f32,
    movement: Movement,
}

impl CameraController {
    pub fn new(speed: f32, rotation_speed: f32) -> Self {
        Self {
            speed,
            rotation_speed,
            movement: Movement::default(),
        }
    }

    /// Returns true when the event was a camera key.
    pub fn process_events(&mut self, event: &WindowEvent) -> bool {
        let WindowEvent::KeyboardInput {
            input:
                KeyboardInput {
                    state,
                    virtual_keycode: Some(keycode),
                    ..
                },
            ..
        } = event
        else {
            return false;
        };

        let pressed = *state == ElementState::Pressed;
        let movement = &mut self.movement;
        let flag = match keycode {
            VirtualKeyCode::W => &mut movement.forward,
            VirtualKeyCode::S => &mut movement.backward,
            VirtualKeyCode::A => &mut movement.left,
            VirtualKeyCode::D => &mut movement.right,
            VirtualKeyCode::Q => &mut movement.up,
            VirtualKeyCode::E => &mut movement.down,
            VirtualKeyCode::Left => &mut movement.yaw_left,
            VirtualKeyCode::Right => &mut movement.yaw_right,
            VirtualKeyCode::Up => &mut movement.pitch_up,
            VirtualKeyCode::Down => &mut movement.pitch_down,
            _ => return false,
        };
        *flag = pressed;
        true
    }

    /// Drops all held keys, e.g. when the keys are needed for another binding.
    pub fn release_all(&mut self) {
        self.movement = Movement::default();
    }

    /// Applies held keys for `dt` seconds. Returns true if the camera moved.
    pub fn update(&self, camera: &mut Camera, dt: f32) -> bool {
        let m = self.movement;
        let axis = |pos: bool, neg: bool| (pos as i32 - neg as i32) as f32;

        let step = self.speed * dt;
        let translation = camera.direction() * axis(m.forward, m.backward) * step
            + camera.right() * axis(m.right, m.left) * step
            + Camera::UP * axis(m.up, m.down) * step;

        let turn = self.rotation_speed * dt;
        let yaw = axis(m.yaw_right, m.yaw_left) * turn;
        let pitch = axis(m.pitch_down, m.pitch_up) * turn;

        let mut moved = false;
        if translation != Vec3::ZERO {
            camera.set_position(camera.position() + translation);
            moved = true;
        }
        if yaw != 0.0 || pitch != 0.0 {
            camera.rotate(yaw, pitch);
            moved = true;
        }
        if moved {
            tracing::trace!("camera moved to {:?}", camera.position());
        }
        moved
    }
}
