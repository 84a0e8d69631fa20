//! GPU-layout records for primitives and per-frame parameters.
//!
//! Every field starts on the offset WGSL assigns it inside a uniform or
//! storage block, and records are sized to a multiple of 16 bytes so that
//! they can sit in a uniform array. The `FIELDS` table of each record is the
//! only description of that layout: the encoder, the named-location table
//! and the generated WGSL struct declarations are all derived from it.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};

use crate::material::MaterialHandle;
use crate::scene::{Sphere, Triangle};

/// `FIELDS` entry named after the struct field it describes.
macro_rules! field {
    ($record:ident, $name:ident, $kind:ident) => {
        Field::new(stringify!($name), offset_of!($record, $name), FieldKind::$kind)
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    F32,
    U32,
    Vec2,
    Vec3,
    Mat4,
}

impl FieldKind {
    pub fn wgsl_type(self) -> &'static str {
        match self {
            FieldKind::F32 => "f32",
            FieldKind::U32 => "u32",
            FieldKind::Vec2 => "vec2<f32>",
            FieldKind::Vec3 => "vec3<f32>",
            FieldKind::Mat4 => "mat4x4<f32>",
        }
    }

    pub fn size(self) -> usize {
        match self {
            FieldKind::F32 | FieldKind::U32 => 4,
            FieldKind::Vec2 => 8,
            FieldKind::Vec3 => 12,
            FieldKind::Mat4 => 64,
        }
    }

    /// WGSL alignment in host-shareable address spaces.
    pub fn align(self) -> usize {
        match self {
            FieldKind::F32 | FieldKind::U32 => 4,
            FieldKind::Vec2 => 8,
            FieldKind::Vec3 | FieldKind::Mat4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

impl Field {
    const fn new(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self { name, offset, kind }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.kind.size()
    }
}

/// A `#[repr(C)]` record whose byte layout matches a WGSL struct.
pub trait DeviceRecord: Pod {
    const WGSL_NAME: &'static str;
    /// Data fields in offset order; padding is implied by the gaps.
    const FIELDS: &'static [Field];

    fn field(name: &str) -> Option<&'static Field> {
        Self::FIELDS.iter().find(|field| field.name == name)
    }

    fn field_bytes(&self, field: &Field) -> &[u8] {
        &bytemuck::bytes_of(self)[field.range()]
    }

    /// Reads a field back by name.
    fn read(&self, name: &str) -> Option<&[u8]> {
        Self::field(name).map(|field| self.field_bytes(field))
    }

    /// WGSL declaration of the record.
    ///
    /// Fields followed by padding get an explicit `@size`, so the struct
    /// reproduces the host offsets regardless of WGSL's implicit rules.
    fn wgsl_struct() -> String {
        let record_size = size_of::<Self>();
        let mut out = format!("struct {} {{\n", Self::WGSL_NAME);
        for (i, field) in Self::FIELDS.iter().enumerate() {
            let end = Self::FIELDS
                .get(i + 1)
                .map_or(record_size, |next| next.offset);
            let slot = end - field.offset;
            if slot != field.kind.size() {
                out.push_str(&format!("    @size({slot}) "));
            } else {
                out.push_str("    ");
            }
            out.push_str(&format!("{}: {},\n", field.name, field.kind.wgsl_type()));
        }
        out.push_str("}\n");
        out
    }
}

/// 32 bytes: `position` + `radius` fill the first 16-byte slot,
/// `material_index` sits alone in the second.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DeviceSphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub material_index: u32,
    pub _pad: [u32; 3],
}

impl DeviceRecord for DeviceSphere {
    const WGSL_NAME: &'static str = "Sphere";
    const FIELDS: &'static [Field] = &[
        field!(DeviceSphere, position, Vec3),
        field!(DeviceSphere, radius, F32),
        field!(DeviceSphere, material_index, U32),
    ];
}

impl DeviceSphere {
    pub fn encode(sphere: &Sphere, material_index: u32) -> Self {
        Self {
            position: sphere.position.to_array(),
            radius: sphere.radius,
            material_index,
            _pad: [0; 3],
        }
    }

    /// Rebuilds the primitive, looking the material up in the compiled list.
    pub fn decode(&self, materials: &[MaterialHandle]) -> Option<Sphere> {
        let material = *materials.get(self.material_index as usize)?;
        Some(Sphere {
            position: self.position.into(),
            radius: self.radius,
            material,
        })
    }
}

/// 80 bytes: each vertex padded to 16, `uv0`+`uv1` share a slot,
/// `uv2` + `material_index` share the last one.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DeviceTriangle {
    pub v0: [f32; 3],
    pub _pad0: u32,
    pub v1: [f32; 3],
    pub _pad1: u32,
    pub v2: [f32; 3],
    pub _pad2: u32,
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    pub uv2: [f32; 2],
    pub material_index: u32,
    pub _pad3: u32,
}

impl DeviceRecord for DeviceTriangle {
    const WGSL_NAME: &'static str = "Triangle";
    const FIELDS: &'static [Field] = &[
        field!(DeviceTriangle, v0, Vec3),
        field!(DeviceTriangle, v1, Vec3),
        field!(DeviceTriangle, v2, Vec3),
        field!(DeviceTriangle, uv0, Vec2),
        field!(DeviceTriangle, uv1, Vec2),
        field!(DeviceTriangle, uv2, Vec2),
        field!(DeviceTriangle, material_index, U32),
    ];
}

impl DeviceTriangle {
    pub fn encode(triangle: &Triangle, material_index: u32) -> Self {
        Self {
            v0: triangle.v0.to_array(),
            v1: triangle.v1.to_array(),
            v2: triangle.v2.to_array(),
            uv0: triangle.uv0.to_array(),
            uv1: triangle.uv1.to_array(),
            uv2: triangle.uv2.to_array(),
            material_index,
            ..Self::zeroed()
        }
    }

    pub fn decode(&self, materials: &[MaterialHandle]) -> Option<Triangle> {
        let material = *materials.get(self.material_index as usize)?;
        Some(Triangle {
            v0: self.v0.into(),
            v1: self.v1.into(),
            v2: self.v2.into(),
            uv0: self.uv0.into(),
            uv1: self.uv1.into(),
            uv2: self.uv2.into(),
            material,
        })
    }
}

/// Per-frame parameter block: camera, scene info, config and the frame
/// index, bound as one uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub inv_view: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub frame_index: u32,
    pub background_color: [f32; 3],
    pub num_spheres: u32,
    pub num_triangles: u32,
    pub num_materials: u32,
    pub num_samples: u32,
    pub bounce_limit: u32,
}

impl DeviceRecord for FrameUniforms {
    const WGSL_NAME: &'static str = "FrameUniforms";
    const FIELDS: &'static [Field] = &[
        field!(FrameUniforms, inv_view, Mat4),
        field!(FrameUniforms, inv_proj, Mat4),
        field!(FrameUniforms, camera_position, Vec3),
        field!(FrameUniforms, frame_index, U32),
        field!(FrameUniforms, background_color, Vec3),
        field!(FrameUniforms, num_spheres, U32),
        field!(FrameUniforms, num_triangles, U32),
        field!(FrameUniforms, num_materials, U32),
        field!(FrameUniforms, num_samples, U32),
        field!(FrameUniforms, bounce_limit, U32),
    ];
}

const _: () = assert!(size_of::<DeviceSphere>() == 32);
const _: () = assert!(size_of::<DeviceTriangle>() == 80);
const _: () = assert!(size_of::<FrameUniforms>() % 16 == 0);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Material, MaterialRegistry};
    use glam::{Vec2, Vec3};

    fn assert_layout<R: DeviceRecord>() {
        let size = size_of::<R>();
        assert_eq!(size % 16, 0, "{} is not a multiple of 16", R::WGSL_NAME);
        let mut end = 0;
        for field in R::FIELDS {
            assert_eq!(field.offset % field.kind.align(), 0, "{} misaligned", field.name);
            assert!(field.offset >= end, "{} overlaps its predecessor", field.name);
            end = field.range().end;
        }
        assert!(end <= size);
    }

    #[test]
    fn record_layouts_respect_wgsl_alignment() {
        assert_layout::<DeviceSphere>();
        assert_layout::<DeviceTriangle>();
        assert_layout::<FrameUniforms>();
    }

    #[test]
    fn vectors_alone_in_a_slot_are_padded_to_16_bytes() {
        let f = |name| DeviceTriangle::field(name).map(|field| field.offset);
        assert_eq!(f("v0"), Some(0));
        assert_eq!(f("v1"), Some(16));
        assert_eq!(f("v2"), Some(32));
        assert_eq!(f("uv0"), Some(48));
        assert_eq!(f("uv2"), Some(64));
        assert_eq!(f("material_index"), Some(72));
        assert_eq!(DeviceSphere::field("material_index").map(|f| f.offset), Some(16));
    }

    #[test]
    fn sphere_round_trips_through_its_record() {
        let mut registry = MaterialRegistry::new();
        let materials = vec![
            registry.insert(Material::new("a")),
            registry.insert(Material::new("b")),
        ];
        let sphere = Sphere::new(Vec3::new(1.5, -2.0, 3.25), 0.75, materials[1]);

        let record = DeviceSphere::encode(&sphere, 1);
        assert_eq!(record._pad, [0; 3]);
        assert_eq!(record.read("radius"), Some(bytemuck::bytes_of(&0.75f32)));
        assert_eq!(record.read("material_index"), Some(bytemuck::bytes_of(&1u32)));
        assert_eq!(record.read("position"), Some(bytemuck::cast_slice(&[1.5f32, -2.0, 3.25])));
        assert_eq!(record.decode(&materials), Some(sphere));
    }

    #[test]
    fn triangle_round_trips_through_its_record() {
        let mut registry = MaterialRegistry::new();
        let materials = vec![registry.insert(Material::new("a"))];
        let triangle = Triangle::new(Vec3::X, Vec3::Y, Vec3::Z, materials[0]).with_uvs(
            Vec2::new(0.1, 0.2),
            Vec2::new(0.3, 0.4),
            Vec2::new(0.5, 0.6),
        );

        let record = DeviceTriangle::encode(&triangle, 0);
        assert_eq!([record._pad0, record._pad1, record._pad2, record._pad3], [0; 4]);
        assert_eq!(record.read("uv1"), Some(bytemuck::cast_slice(&[0.3f32, 0.4])));
        assert_eq!(record.decode(&materials), Some(triangle));
    }

    #[test]
    fn decode_rejects_out_of_range_material_index() {
        let mut registry = MaterialRegistry::new();
        let handle = registry.insert(Material::new("a"));
        let record = DeviceSphere::encode(&Sphere::new(Vec3::ZERO, 1.0, handle), 3);
        assert_eq!(record.decode(&[handle]), None);
    }

    #[test]
    fn unknown_field_reads_nothing() {
        assert!(DeviceSphere::zeroed().read("color").is_none());
    }

    #[test]
    fn generated_wgsl_pins_padded_fields() {
        let sphere = DeviceSphere::wgsl_struct();
        assert!(sphere.starts_with("struct Sphere {"));
        assert!(sphere.contains("    position: vec3<f32>,\n"));
        assert!(sphere.contains("    @size(16) material_index: u32,\n"));

        let triangle = DeviceTriangle::wgsl_struct();
        assert!(triangle.contains("    @size(16) v0: vec3<f32>,\n"));
        assert!(triangle.contains("    uv0: vec2<f32>,\n"));
        assert!(triangle.contains("    @size(8) material_index: u32,\n"));

        let uniforms = FrameUniforms::wgsl_struct();
        assert!(uniforms.contains("    inv_view: mat4x4<f32>,\n"));
        assert!(!uniforms.contains("@size"));
    }
}
