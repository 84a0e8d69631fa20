//! Kernel specialization and the named-location table.
//!
//! The ray-tracing kernel is WGSL with `{{PLACEHOLDER}}` tokens. A
//! [`KernelLayout`] substitutes them once from a [`KernelParams`] record and
//! records, for every named input the host writes, which device region and
//! byte range it lives in. The table belongs to the layout, so several
//! kernels with different parameters can coexist.

pub mod host;

use std::collections::HashMap;
use std::fmt::Write;

use crate::compiled::CompiledScene;
use crate::error::{Error, Result};
use crate::layout::{DeviceRecord, DeviceSphere, DeviceTriangle, FrameUniforms};

pub use host::HostTarget;

pub const KERNEL_TEMPLATE: &str = include_str!("../asset/shader/raytracer.wgsl");

/// How primitive records reach the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Fixed-size arrays in a uniform block, written field by field.
    #[default]
    Inline,
    /// Runtime-sized storage buffers, written as one block.
    Buffer,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Inline => f.write_str("inline"),
            TransportMode::Buffer => f.write_str("buffer"),
        }
    }
}

/// Compile-time constants of one kernel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelParams {
    pub workgroup_size: u32,
    /// Inline mode: array length compiled into the kernel.
    /// Buffer mode: record capacity of the allocated storage buffer.
    pub sphere_capacity: u32,
    pub triangle_capacity: u32,
    pub mode: TransportMode,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            workgroup_size: 8,
            sphere_capacity: 16,
            triangle_capacity: 5,
            mode: TransportMode::Inline,
        }
    }
}

/// Device-side block a named input lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Frame,
    Spheres,
    Triangles,
}

/// Byte range of a named input inside its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub region: Region,
    pub offset: u64,
    pub size: u64,
}

/// Receiver of everything the host writes to a kernel instance.
///
/// Writes land in resources allocated when the kernel was created; no
/// implementation allocates while binding.
pub trait KernelTarget {
    fn write(&mut self, location: Location, bytes: &[u8]);
    fn bind_atlas(&mut self, scene: &CompiledScene);
    /// Fills the accumulated output image with `color`.
    fn clear_output(&mut self, color: [f32; 4]);
    /// Runs the kernel once with the frame parameters written so far.
    fn dispatch(&mut self);
}

const PLACEHOLDERS: [&str; 5] = [
    "{{WG_SIZE}}",
    "{{FRAME_UNIFORMS}}",
    "{{SPHERE_STRUCT}}",
    "{{TRIANGLE_STRUCT}}",
    "{{SCENE_STORAGE}}",
];

#[derive(Debug, Clone)]
pub struct KernelLayout {
    params: KernelParams,
    locations: HashMap<String, Location>,
}

impl KernelLayout {
    pub fn new(params: KernelParams) -> Result<Self> {
        if params.workgroup_size == 0 {
            return Err(Error::InvalidKernelParams("workgroup size must be non-zero".into()));
        }
        // WGSL arrays and wgpu buffers cannot be empty
        if params.sphere_capacity == 0 || params.triangle_capacity == 0 {
            return Err(Error::InvalidKernelParams(
                "primitive capacities must be non-zero".into(),
            ));
        }

        let mut locations = HashMap::new();
        for field in FrameUniforms::FIELDS {
            locations.insert(
                field.name.to_owned(),
                Location {
                    region: Region::Frame,
                    offset: field.offset as u64,
                    size: field.kind.size() as u64,
                },
            );
        }
        if params.mode == TransportMode::Inline {
            insert_elements::<DeviceSphere>(
                &mut locations,
                Region::Spheres,
                params.sphere_capacity,
            );
            insert_elements::<DeviceTriangle>(
                &mut locations,
                Region::Triangles,
                params.triangle_capacity,
            );
        }

        Ok(Self { params, locations })
    }

    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    pub fn mode(&self) -> TransportMode {
        self.params.mode
    }

    pub fn location(&self, name: &str) -> Option<Location> {
        self.locations.get(name).copied()
    }

    /// Number of named inputs; element entries only exist in inline mode.
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Capacity in records of a primitive region, or 1 for the frame block.
    pub fn capacity(&self, region: Region) -> u32 {
        match region {
            Region::Frame => 1,
            Region::Spheres => self.params.sphere_capacity,
            Region::Triangles => self.params.triangle_capacity,
        }
    }

    pub fn region_size(&self, region: Region) -> u64 {
        let record = match region {
            Region::Frame => std::mem::size_of::<FrameUniforms>(),
            Region::Spheres => std::mem::size_of::<DeviceSphere>(),
            Region::Triangles => std::mem::size_of::<DeviceTriangle>(),
        };
        record as u64 * self.capacity(region) as u64
    }

    /// Substitutes every placeholder of `template`.
    pub fn specialize(&self, template: &str) -> Result<String> {
        let mut source = template.to_owned();
        for placeholder in PLACEHOLDERS {
            if !source.contains(placeholder) {
                return Err(Error::MissingPlaceholder(placeholder));
            }
            let value = match placeholder {
                "{{WG_SIZE}}" => self.params.workgroup_size.to_string(),
                "{{FRAME_UNIFORMS}}" => FrameUniforms::wgsl_struct(),
                "{{SPHERE_STRUCT}}" => DeviceSphere::wgsl_struct(),
                "{{TRIANGLE_STRUCT}}" => DeviceTriangle::wgsl_struct(),
                _ => self.scene_storage(),
            };
            source = source.replace(placeholder, &value);
        }
        Ok(source)
    }

    fn scene_storage(&self) -> String {
        let mut out = String::new();
        let arrays = [
            (
                "SphereArray",
                DeviceSphere::WGSL_NAME,
                self.params.sphere_capacity,
                1,
                "scene_spheres",
                "sphere_count",
                "num_spheres",
            ),
            (
                "TriangleArray",
                DeviceTriangle::WGSL_NAME,
                self.params.triangle_capacity,
                2,
                "scene_triangles",
                "triangle_count",
                "num_triangles",
            ),
        ];
        for (wrapper, record, capacity, binding, var, count_fn, count_field) in arrays {
            // writing into a String cannot fail
            let _ = match self.params.mode {
                TransportMode::Inline => writeln!(
                    out,
                    "struct {wrapper} {{\n    data: array<{record}, {capacity}>,\n}}\n\
                     @group(0) @binding({binding}) var<uniform> {var}: {wrapper};\n\
                     fn {count_fn}() -> u32 {{\n    \
                     return min(frame.{count_field}, {capacity}u);\n}}\n"
                ),
                TransportMode::Buffer => writeln!(
                    out,
                    "struct {wrapper} {{\n    data: array<{record}>,\n}}\n\
                     @group(0) @binding({binding}) var<storage, read> {var}: {wrapper};\n\
                     fn {count_fn}() -> u32 {{\n    \
                     return min(frame.{count_field}, arrayLength(&{var}.data));\n}}\n"
                ),
            };
        }
        out
    }
}

/// Name of one field of one inline array element, e.g. `spheres[3].radius`.
pub fn element_name(region: Region, index: u32, field: &str) -> String {
    let collection = match region {
        Region::Frame => return field.to_owned(),
        Region::Spheres => "spheres",
        Region::Triangles => "triangles",
    };
    format!("{collection}[{index}].{field}")
}

fn insert_elements<R: DeviceRecord>(
    locations: &mut HashMap<String, Location>,
    region: Region,
    capacity: u32,
) {
    let stride = std::mem::size_of::<R>() as u64;
    for index in 0..capacity {
        for field in R::FIELDS {
            locations.insert(
                element_name(region, index, field.name),
                Location {
                    region,
                    offset: stride * index as u64 + field.offset as u64,
                    size: field.kind.size() as u64,
                },
            );
        }
    }
}
