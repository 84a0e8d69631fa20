use std::sync::atomic::{AtomicU64, Ordering};

pub mod math {
    pub fn degree_to_radian(degree: f32) -> f32 {
        degree * std::f32::consts::PI / 180.0
    }

    /// Converts an 8-bit color into linear `[0, 1]` floats.
    pub fn normalize_rgb8(rgb: [u8; 3]) -> glam::Vec3 {
        glam::Vec3::new(rgb[0] as f32, rgb[1] as f32, rgb[2] as f32) / 255.0
    }

    pub fn unit_to_u8(value: f32) -> u8 {
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

/// Process-unique identity stamp.
///
/// Cameras take a fresh stamp on every mutation and compiled scenes take one
/// at compilation, so two stamps compare equal only when they name the same
/// state of the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(u64);

impl Revision {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
