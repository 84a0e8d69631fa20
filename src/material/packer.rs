//! Packs resolved materials into one RGBA atlas, one horizontal strip per
//! material.
//!
//! Albedo lands in the RGB components and roughness in alpha, so the kernel
//! reads every channel of a material with a single sampler:
//!
//! ```text
//! y = 0        +-----------------------------+
//!              | material 0  (rgb=albedo a=r)|
//! y = h/N      +-----------------------------+
//!              | material 1                  |
//!              +-----------------------------+
//!              | ...                         |
//! ```

use image::{imageops, Rgba, RgbaImage};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::{Channel, Material};
use crate::error::{Error, Result};
use crate::util::math::unit_to_u8;

/// Jitter beyond a full unit saturates every texel anyway.
pub(crate) const MAX_DEVIATION: f32 = 1.0;

/// Atlas region owned by one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strip {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Strip {
    pub fn rows(&self) -> std::ops::Range<u32> {
        self.y..self.y + self.height
    }
}

/// Host copy of a packed atlas.
#[derive(Debug, Clone)]
pub struct MaterialAtlas {
    image: RgbaImage,
    material_count: u32,
}

impl MaterialAtlas {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn material_count(&self) -> u32 {
        self.material_count
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaterialPacker {
    width: u32,
    height: u32,
    seed: u64,
}

impl MaterialPacker {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            seed: 0,
        }
    }

    /// Seed of the procedural jitter; the same seed packs the same atlas.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn strip(&self, index: usize, count: usize) -> Strip {
        let height = self.height / count.max(1) as u32;
        Strip {
            x: 0,
            y: height * index as u32,
            width: self.width,
            height,
        }
    }

    /// Atlas row the kernel's `sample_material` reads for material `index`
    /// at texture coordinate `v`. Mirrors the WGSL addressing: the same
    /// integer strip height as [`MaterialPacker::strip`], sampled at the
    /// texel center.
    pub fn strip_row(&self, index: usize, count: usize, v: f32) -> u32 {
        let rows = (self.height / count.max(1) as u32).max(1);
        let local = (((v - v.floor()) * rows as f32) as u32).min(rows - 1);
        let row = index as u32 * rows + local;
        let center = (row as f32 + 0.5) / self.height as f32;
        (center * self.height as f32).floor() as u32
    }

    pub fn pack(&self, materials: &[&Material]) -> Result<MaterialAtlas> {
        if self.width == 0 || (self.height as usize) < materials.len() {
            return Err(Error::AtlasTooSmall {
                count: materials.len(),
                width: self.width,
                height: self.height,
            });
        }

        let mut image = RgbaImage::new(self.width, self.height);
        for (index, material) in materials.iter().enumerate() {
            let strip = self.strip(index, materials.len());
            let mut rng = Pcg32::seed_from_u64(self.seed.wrapping_add(index as u64));
            write_albedo(&mut image, strip, material.albedo(), &mut rng);
            write_roughness(&mut image, strip, material.roughness(), &mut rng);
            tracing::trace!(
                "packed material '{}' into rows {:?}",
                material.name(),
                strip.rows()
            );
        }

        Ok(MaterialAtlas {
            image,
            material_count: materials.len() as u32,
        })
    }
}

fn jitter(rng: &mut Pcg32, deviation: f32) -> f32 {
    if deviation.is_finite() && deviation > 0.0 {
        let deviation = deviation.min(MAX_DEVIATION);
        rng.random_range(-deviation..=deviation)
    } else {
        0.0
    }
}

fn resample(source: &RgbaImage, strip: Strip) -> RgbaImage {
    if source.dimensions() == (strip.width, strip.height) {
        source.clone()
    } else {
        imageops::resize(source, strip.width, strip.height, imageops::FilterType::Nearest)
    }
}

fn write_albedo(
    atlas: &mut RgbaImage,
    strip: Strip,
    channel: &Channel<glam::Vec3>,
    rng: &mut Pcg32,
) {
    match channel {
        Channel::Procedural { mean, deviation } => {
            for y in strip.rows() {
                for x in strip.x..strip.x + strip.width {
                    let pixel = atlas.get_pixel_mut(x, y);
                    pixel.0[0] = unit_to_u8(mean.x + jitter(rng, *deviation));
                    pixel.0[1] = unit_to_u8(mean.y + jitter(rng, *deviation));
                    pixel.0[2] = unit_to_u8(mean.z + jitter(rng, *deviation));
                }
            }
        }
        Channel::Sampled { image } => {
            let resized = resample(image, strip);
            for (x, y, Rgba([r, g, b, _])) in resized.enumerate_pixels() {
                let pixel = atlas.get_pixel_mut(strip.x + x, strip.y + y);
                pixel.0[0] = *r;
                pixel.0[1] = *g;
                pixel.0[2] = *b;
            }
        }
    }
}

fn write_roughness(atlas: &mut RgbaImage, strip: Strip, channel: &Channel<f32>, rng: &mut Pcg32) {
    match channel {
        Channel::Procedural { mean, deviation } => {
            for y in strip.rows() {
                for x in strip.x..strip.x + strip.width {
                    atlas.get_pixel_mut(x, y).0[3] = unit_to_u8(mean + jitter(rng, *deviation));
                }
            }
        }
        // grayscale maps: the red component carries the value
        Channel::Sampled { image } => {
            let resized = resample(image, strip);
            for (x, y, Rgba([r, ..])) in resized.enumerate_pixels() {
                atlas.get_pixel_mut(strip.x + x, strip.y + y).0[3] = *r;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn strips_split_the_height_evenly() {
        let packer = MaterialPacker::new(4096, 4096);
        let strip = packer.strip(2, 4);
        assert_eq!(
            strip,
            Strip {
                x: 0,
                y: 2048,
                width: 4096,
                height: 1024
            }
        );
        assert_eq!(strip.rows(), 2048..3072);
    }

    #[test]
    fn strips_are_disjoint_and_ordered() {
        let packer = MaterialPacker::new(8, 30);
        let strips: Vec<_> = (0..7).map(|i| packer.strip(i, 7)).collect();
        for pair in strips.windows(2) {
            assert_eq!(pair[0].rows().end, pair[1].rows().start);
        }
        assert!(strips.last().map_or(false, |s| s.rows().end <= 30));
    }

    #[test]
    fn kernel_addressing_stays_inside_uneven_strips() {
        let packer = MaterialPacker::new(8, 30);
        for index in 0..7 {
            let rows = packer.strip(index, 7).rows();
            for step in 0..=100 {
                let v = step as f32 / 100.0;
                let row = packer.strip_row(index, 7, v);
                assert!(
                    rows.contains(&row),
                    "material {index} at v={v} read row {row}, strip {rows:?}"
                );
            }
        }
    }

    #[test]
    fn uneven_atlas_samples_no_blank_rows() {
        let materials: Vec<_> = (0..3).map(|i| Material::new(format!("m{i}"))).collect();
        let refs: Vec<_> = materials.iter().collect();
        let packer = MaterialPacker::new(2, 4096);
        let atlas = packer.pack(&refs).unwrap();
        for index in 0..3 {
            for v in [0.0, 0.5, 0.99, 1.0] {
                let row = packer.strip_row(index, 3, v);
                assert_eq!(atlas.image().get_pixel(0, row).0, [245, 245, 245, 255]);
            }
        }
    }

    #[test]
    fn procedural_channels_fill_their_strip() {
        let red = Material::new("red")
            .with_albedo(Channel::procedural(Vec3::new(1.0, 0.0, 0.0), 0.0))
            .with_roughness(Channel::procedural(0.0, 0.0));
        let blue = Material::new("blue")
            .with_albedo(Channel::procedural(Vec3::new(0.0, 0.0, 1.0), 0.0))
            .with_roughness(Channel::procedural(1.0, 0.0));

        let atlas = MaterialPacker::new(4, 8).pack(&[&red, &blue]).unwrap();
        assert_eq!(atlas.material_count(), 2);
        for y in 0..4 {
            assert_eq!(atlas.image().get_pixel(3, y).0, [255, 0, 0, 0]);
        }
        for y in 4..8 {
            assert_eq!(atlas.image().get_pixel(0, y).0, [0, 0, 255, 255]);
        }
    }

    #[test]
    fn deviation_bounds_the_jitter() {
        let grey = Material::new("grey")
            .with_albedo(Channel::procedural(Vec3::splat(0.5), 0.1))
            .with_roughness(Channel::procedural(0.5, 0.0));

        let atlas = MaterialPacker::new(16, 16).pack(&[&grey]).unwrap();
        let mut varied = false;
        for pixel in atlas.image().pixels() {
            for component in &pixel.0[..3] {
                assert!((101..=154).contains(component), "{component} outside 0.5 +- 0.1");
                varied |= *component != 128;
            }
            assert_eq!(pixel.0[3], 128);
        }
        assert!(varied);
    }

    #[test]
    fn unbounded_deviation_packs_without_jitter() {
        let wild = Material::new("wild")
            .with_albedo(Channel::Procedural {
                mean: Vec3::splat(0.5),
                deviation: f32::INFINITY,
            })
            .with_roughness(Channel::Procedural {
                mean: 0.5,
                deviation: f32::NAN,
            });
        let huge = Material::new("huge").with_albedo(Channel::Procedural {
            mean: Vec3::splat(0.5),
            deviation: f32::MAX,
        });

        let atlas = MaterialPacker::new(4, 4).pack(&[&wild, &huge]).unwrap();
        for y in 0..2 {
            assert_eq!(atlas.image().get_pixel(0, y).0, [128, 128, 128, 128]);
        }
        assert_eq!(atlas.image().get_pixel(0, 3).0[3], 255);
    }

    #[test]
    fn packing_is_deterministic_per_seed() {
        let noisy = Material::new("noisy").with_albedo(Channel::procedural(Vec3::splat(0.5), 0.2));
        let packer = MaterialPacker::new(8, 8).with_seed(7);
        let a = packer.pack(&[&noisy]).unwrap();
        let b = packer.pack(&[&noisy]).unwrap();
        assert_eq!(a.image().as_raw(), b.image().as_raw());
    }

    #[test]
    fn sampled_channels_are_resized_nearest() {
        let mut checker = RgbaImage::new(2, 2);
        checker.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        checker.put_pixel(1, 0, Rgba([40, 50, 60, 255]));
        checker.put_pixel(0, 1, Rgba([70, 80, 90, 255]));
        checker.put_pixel(1, 1, Rgba([100, 110, 120, 255]));
        let mut rough_map = RgbaImage::new(1, 1);
        rough_map.put_pixel(0, 0, Rgba([200, 0, 0, 255]));

        let textured = Material::new("textured")
            .with_albedo(Channel::sampled(checker))
            .with_roughness(Channel::sampled(rough_map));
        let flat = Material::new("flat");

        let atlas = MaterialPacker::new(4, 8).pack(&[&flat, &textured]).unwrap();
        let image = atlas.image();
        assert_eq!(image.get_pixel(0, 4).0, [10, 20, 30, 200]);
        assert_eq!(image.get_pixel(3, 4).0, [40, 50, 60, 200]);
        assert_eq!(image.get_pixel(0, 7).0, [70, 80, 90, 200]);
        assert_eq!(image.get_pixel(3, 7).0, [100, 110, 120, 200]);
        assert_eq!(image.get_pixel(0, 0).0, [245, 245, 245, 255]);
    }

    #[test]
    fn too_many_materials_for_the_atlas_height() {
        let m = Material::new("m");
        let err = MaterialPacker::new(4, 2).pack(&[&m, &m, &m]).unwrap_err();
        assert!(matches!(err, Error::AtlasTooSmall { count: 3, .. }));
    }

    #[test]
    fn empty_material_list_packs_a_blank_atlas() {
        let atlas = MaterialPacker::new(4, 4).pack(&[]).unwrap();
        assert_eq!(atlas.material_count(), 0);
        assert!(atlas.image().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }
}
