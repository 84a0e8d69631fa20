//! Moves a compiled scene and the per-frame parameters into a kernel.
//!
//! Inline mode writes every field of every record to its own named location
//! (`spheres[i].radius`, ...). Buffer mode copies each record list as one
//! block. For a scene within capacity both leave the same bytes on the
//! device.

use bytemuck::Pod;

use crate::camera::CameraUniform;
use crate::compiled::CompiledScene;
use crate::config::Config;
use crate::kernel::{element_name, KernelLayout, KernelTarget, Location, Region, TransportMode};
use crate::layout::DeviceRecord;

/// What a scene bind actually wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindReport {
    pub spheres_bound: u32,
    pub triangles_bound: u32,
    pub spheres_dropped: u32,
    pub triangles_dropped: u32,
}

impl BindReport {
    pub fn is_clamped(&self) -> bool {
        self.spheres_dropped > 0 || self.triangles_dropped > 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransportBinder<'a> {
    layout: &'a KernelLayout,
}

impl<'a> TransportBinder<'a> {
    pub fn new(layout: &'a KernelLayout) -> Self {
        Self { layout }
    }

    pub fn mode(&self) -> TransportMode {
        self.layout.mode()
    }

    pub fn bind_scene(&self, scene: &CompiledScene, target: &mut impl KernelTarget) -> BindReport {
        tracing::trace!(
            "Binding scene '{}' ({} transport)",
            scene.name(),
            self.layout.mode()
        );

        let (spheres_bound, spheres_dropped) =
            self.bind_records(Region::Spheres, scene.spheres(), target);
        let (triangles_bound, triangles_dropped) =
            self.bind_records(Region::Triangles, scene.triangles(), target);

        self.bind_value("num_spheres", &spheres_bound, target);
        self.bind_value("num_triangles", &triangles_bound, target);
        self.bind_value("num_materials", &(scene.materials().len() as u32), target);
        self.bind_value("background_color", &scene.background().to_array(), target);
        target.bind_atlas(scene);

        BindReport {
            spheres_bound,
            triangles_bound,
            spheres_dropped,
            triangles_dropped,
        }
    }

    pub fn bind_camera(&self, camera: &CameraUniform, target: &mut impl KernelTarget) {
        self.bind_value("inv_view", &camera.inv_view.to_cols_array_2d(), target);
        self.bind_value("inv_proj", &camera.inv_proj.to_cols_array_2d(), target);
        self.bind_value("camera_position", &camera.position.to_array(), target);
    }

    pub fn bind_config(&self, config: Config, target: &mut impl KernelTarget) {
        self.bind_value("num_samples", &config.num_samples, target);
        self.bind_value("bounce_limit", &config.bounce_limit, target);
    }

    pub fn bind_frame_index(&self, frame_index: u32, target: &mut impl KernelTarget) {
        self.bind_value("frame_index", &frame_index, target);
    }

    /// Writes up to the region's capacity and returns `(bound, dropped)`.
    fn bind_records<R: DeviceRecord>(
        &self,
        region: Region,
        records: &[R],
        target: &mut impl KernelTarget,
    ) -> (u32, u32) {
        let capacity = self.layout.capacity(region) as usize;
        let bound = records.len().min(capacity);
        let dropped = records.len() - bound;
        if dropped > 0 {
            tracing::warn!(
                "{:?}: {} records exceed the capacity of {}, dropping the last {}",
                region,
                records.len(),
                capacity,
                dropped
            );
        }

        let records = &records[..bound];
        match self.layout.mode() {
            TransportMode::Inline => {
                for (index, record) in records.iter().enumerate() {
                    for field in R::FIELDS {
                        let name = element_name(region, index as u32, field.name);
                        self.bind_bytes(&name, record.field_bytes(field), target);
                    }
                }
            }
            TransportMode::Buffer => {
                let bytes: &[u8] = bytemuck::cast_slice(records);
                if !bytes.is_empty() {
                    let location = Location {
                        region,
                        offset: 0,
                        size: bytes.len() as u64,
                    };
                    target.write(location, bytes);
                }
            }
        }

        (bound as u32, dropped as u32)
    }

    fn bind_value<T: Pod>(&self, name: &str, value: &T, target: &mut impl KernelTarget) {
        self.bind_bytes(name, bytemuck::bytes_of(value), target);
    }

    fn bind_bytes(&self, name: &str, bytes: &[u8], target: &mut impl KernelTarget) {
        match self.layout.location(name) {
            Some(location) => target.write(location, bytes),
            None => tracing::error!("Kernel has no input named '{}'", name),
        }
    }
}
