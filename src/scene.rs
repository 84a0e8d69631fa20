use crate::material::MaterialHandle;

/// Host-authored scene: an ordered primitive list plus a background color.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub primitives: Vec<Primitive>,
    /// Linear RGB, also the radiance of rays that escape the scene.
    pub background: glam::Vec3,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            primitives: Vec::new(),
            background: glam::Vec3::ZERO,
        }
    }
}

impl Scene {
    pub fn new(background: glam::Vec3) -> Self {
        Self {
            primitives: Vec::new(),
            background,
        }
    }

    pub fn add(&mut self, primitive: impl Into<Primitive>) {
        self.primitives.push(primitive.into());
    }

    pub fn spheres(&self) -> impl Iterator<Item = &Sphere> {
        self.primitives.iter().filter_map(|primitive| match primitive {
            Primitive::Sphere(sphere) => Some(sphere),
            Primitive::Triangle(_) => None,
        })
    }

    pub fn triangles(&self) -> impl Iterator<Item = &Triangle> {
        self.primitives.iter().filter_map(|primitive| match primitive {
            Primitive::Triangle(triangle) => Some(triangle),
            Primitive::Sphere(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Sphere(Sphere),
    Triangle(Triangle),
}

impl Primitive {
    pub fn material(&self) -> MaterialHandle {
        match self {
            Primitive::Sphere(sphere) => sphere.material,
            Primitive::Triangle(triangle) => triangle.material,
        }
    }
}

impl From<Sphere> for Primitive {
    fn from(sphere: Sphere) -> Self {
        Primitive::Sphere(sphere)
    }
}

impl From<Triangle> for Primitive {
    fn from(triangle: Triangle) -> Self {
        Primitive::Triangle(triangle)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    pub position: glam::Vec3,
    pub radius: f32,
    pub material: MaterialHandle,
}

impl Sphere {
    pub fn new(position: glam::Vec3, radius: f32, material: MaterialHandle) -> Self {
        Self {
            position,
            radius,
            material,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub v0: glam::Vec3,
    pub v1: glam::Vec3,
    pub v2: glam::Vec3,
    pub uv0: glam::Vec2,
    pub uv1: glam::Vec2,
    pub uv2: glam::Vec2,
    pub material: MaterialHandle,
}

impl Triangle {
    pub const DEFAULT_UVS: [glam::Vec2; 3] = [
        glam::Vec2::new(0.0, 0.0),
        glam::Vec2::new(0.0, 1.0),
        glam::Vec2::new(1.0, 0.0),
    ];

    /// Triangle with the default texture coordinates.
    pub fn new(v0: glam::Vec3, v1: glam::Vec3, v2: glam::Vec3, material: MaterialHandle) -> Self {
        let [uv0, uv1, uv2] = Self::DEFAULT_UVS;
        Self {
            v0,
            v1,
            v2,
            uv0,
            uv1,
            uv2,
            material,
        }
    }

    pub fn with_uvs(mut self, uv0: glam::Vec2, uv1: glam::Vec2, uv2: glam::Vec2) -> Self {
        self.uv0 = uv0;
        self.uv1 = uv1;
        self.uv2 = uv2;
        self
    }
}
