use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use super::{KernelLayout, KernelTarget, Location, Region};
use crate::compiled::CompiledScene;
use crate::layout::FrameUniforms;
use crate::util::Revision;

/// In-memory kernel instance.
///
/// Mirrors the device regions of a [`KernelLayout`] as byte vectors and
/// stands in for the kernel on dispatch by averaging the background color
/// into the output, which is enough to observe accumulation without a
/// device.
#[derive(Debug)]
pub struct HostTarget {
    regions: HashMap<Region, Vec<u8>>,
    atlas: Option<Revision>,
    output: Vec<[f32; 4]>,
    clears: usize,
    dispatches: Vec<u32>,
}

impl HostTarget {
    pub fn new(layout: &KernelLayout, pixels: usize) -> Self {
        let regions = [Region::Frame, Region::Spheres, Region::Triangles]
            .into_iter()
            .map(|region| (region, vec![0; layout.region_size(region) as usize]))
            .collect();
        Self {
            regions,
            atlas: None,
            output: vec![[0.0; 4]; pixels],
            clears: 0,
            dispatches: Vec::new(),
        }
    }

    pub fn region(&self, region: Region) -> &[u8] {
        self.regions.get(&region).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reads the `index`-th record of a region, `None` past its end.
    pub fn read<R: Pod>(&self, region: Region, index: usize) -> Option<R> {
        let size = std::mem::size_of::<R>();
        let start = index.checked_mul(size)?;
        let bytes = self.region(region).get(start..start.checked_add(size)?)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn frame(&self) -> FrameUniforms {
        self.read(Region::Frame, 0).unwrap_or_else(FrameUniforms::zeroed)
    }

    /// Identity of the scene whose atlas is bound.
    pub fn bound_atlas(&self) -> Option<Revision> {
        self.atlas
    }

    pub fn output(&self) -> &[[f32; 4]] {
        &self.output
    }

    /// Frame index seen by each dispatch so far.
    pub fn dispatches(&self) -> &[u32] {
        &self.dispatches
    }

    pub fn clears(&self) -> usize {
        self.clears
    }
}

impl KernelTarget for HostTarget {
    fn write(&mut self, location: Location, bytes: &[u8]) {
        let Some(region) = self.regions.get_mut(&location.region) else {
            return;
        };
        let start = location.offset as usize;
        let end = start + bytes.len();
        if end > region.len() || bytes.len() as u64 > location.size {
            tracing::error!(
                "write of {} bytes at {:?}+{} exceeds its location",
                bytes.len(),
                location.region,
                location.offset
            );
            return;
        }
        region[start..end].copy_from_slice(bytes);
    }

    fn bind_atlas(&mut self, scene: &CompiledScene) {
        self.atlas = Some(scene.id());
    }

    fn clear_output(&mut self, color: [f32; 4]) {
        self.output.fill(color);
        self.clears += 1;
    }

    fn dispatch(&mut self) {
        let frame = self.frame();
        self.dispatches.push(frame.frame_index);

        let weight = 1.0 / frame.frame_index.max(1) as f32;
        let [r, g, b] = frame.background_color;
        let sample = [r, g, b, 1.0];
        for pixel in &mut self.output {
            for (channel, value) in pixel.iter_mut().zip(sample) {
                *channel += (value - *channel) * weight;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelParams;

    fn target() -> (KernelLayout, HostTarget) {
        let layout = KernelLayout::new(KernelParams::default()).unwrap();
        let target = HostTarget::new(&layout, 4);
        (layout, target)
    }

    #[test]
    fn writes_land_at_their_location() {
        let (layout, mut target) = target();
        let location = layout.location("num_samples").unwrap();
        target.write(location, bytemuck::bytes_of(&16u32));
        assert_eq!(target.frame().num_samples, 16);
    }

    #[test]
    fn oversized_writes_are_dropped() {
        let (layout, mut target) = target();
        let location = layout.location("frame_index").unwrap();
        target.write(location, &[1; 8]);
        assert_eq!(target.frame().frame_index, 0);
        assert_eq!(target.frame().background_color, [0.0; 3]);
    }

    #[test]
    fn reads_past_the_region_end_are_none() {
        let (_, target) = target();
        assert!(target.read::<FrameUniforms>(Region::Frame, 0).is_some());
        assert!(target.read::<FrameUniforms>(Region::Frame, 1).is_none());
        assert!(target.read::<u8>(Region::Spheres, usize::MAX).is_none());
    }

    #[test]
    fn dispatch_averages_towards_the_background() {
        let (layout, mut target) = target();
        let background = layout.location("background_color").unwrap();
        let frame_index = layout.location("frame_index").unwrap();
        target.write(background, bytemuck::cast_slice(&[1.0f32, 0.5, 0.0]));

        target.clear_output([0.0; 4]);
        target.write(frame_index, bytemuck::bytes_of(&1u32));
        target.dispatch();
        assert_eq!(target.output()[0], [1.0, 0.5, 0.0, 1.0]);

        target.write(background, bytemuck::cast_slice(&[0.0f32, 0.5, 1.0]));
        target.write(frame_index, bytemuck::bytes_of(&2u32));
        target.dispatch();
        assert_eq!(target.output()[3], [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(target.dispatches(), &[1, 2]);
        assert_eq!(target.clears(), 1);
    }
}
