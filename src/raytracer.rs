//! Device side of the ray tracer.
//!
//! [`Kernel`] is the specialized compute pipeline, [`KernelResources`] the
//! buffers and images it reads and writes, and [`GpuTarget`] routes the
//! writes of a [`RenderSession`] into them through the wgpu queue.
//!
//! ## Usage
//! ```ignore
//! let mut raytracer = Raytracer::new(&device, &queue, params, policy, (640, 360))?;
//! raytracer.set_config(&device, &queue, Config::default());
//! raytracer.set_scene(&device, &queue, compiled);
//! raytracer.set_camera(&device, &queue, &camera);
//! raytracer.render(&device, &queue); // once per frame
//! ```

use std::path::Path;

use crate::accumulation::ConfigChangePolicy;
use crate::camera::Camera;
use crate::compiled::CompiledScene;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::kernel::{
    KernelLayout, KernelParams, KernelTarget, Location, Region, TransportMode, KERNEL_TEMPLATE,
};
use crate::session::RenderSession;
use crate::texture::Texture;
use crate::util::{math, Revision};

const ACCUMULATION_TEXEL: u64 = std::mem::size_of::<[f32; 4]>() as u64;

/// Compute pipeline built from one specialization of the kernel template.
pub struct Kernel {
    params: KernelParams,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl Kernel {
    pub fn new(device: &wgpu::Device, layout: &KernelLayout) -> Result<Self> {
        let params = *layout.params();
        let source = layout.specialize(KERNEL_TEMPLATE)?;

        tracing::info!("Compiling compute kernel with:");
        tracing::info!("    Workgroup size: {}", params.workgroup_size);
        tracing::info!("    Transport: {}", params.mode);
        tracing::info!("    Sphere capacity: {}", params.sphere_capacity);
        tracing::info!("    Triangle capacity: {}", params.triangle_capacity);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Raytracer Kernel"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let scene_binding = match params.mode {
            TransportMode::Inline => wgpu::BufferBindingType::Uniform,
            TransportMode::Buffer => wgpu::BufferBindingType::Storage { read_only: true },
        };
        let buffer_entry = |binding: u32, ty: wgpu::BufferBindingType| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Raytracer Bind Group Layout"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, scene_binding),
                buffer_entry(2, scene_binding),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                buffer_entry(5, wgpu::BufferBindingType::Storage { read_only: false }),
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Raytracer Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Raytracer Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::KernelCreation(err.to_string()));
        }
        tracing::trace!("Compute kernel compiled");

        Ok(Self {
            params,
            bind_group_layout,
            pipeline,
        })
    }

    pub fn params(&self) -> &KernelParams {
        &self.params
    }
}

/// Host copy of the accumulation clear pattern, refilled only when the
/// clear color changes.
#[derive(Debug)]
struct ClearTexels(Vec<[f32; 4]>);

impl ClearTexels {
    fn new(count: usize) -> Self {
        Self(vec![[0.0; 4]; count])
    }

    fn fill(&mut self, color: [f32; 4]) -> &[u8] {
        if self.0.first() != Some(&color) {
            self.0.fill(color);
        }
        bytemuck::cast_slice(&self.0)
    }
}

enum AtlasSelection<G> {
    AlreadyBound,
    Swap(G),
    Missing,
}

/// Tracks which scene's atlas the active bind group references, plus one
/// group built ahead of time at upload.
#[derive(Debug)]
struct AtlasBindings<G> {
    bound: Option<Revision>,
    staged: Option<(Revision, G)>,
}

impl<G> AtlasBindings<G> {
    fn new() -> Self {
        Self {
            bound: None,
            staged: None,
        }
    }

    fn needs(&self, scene: Revision) -> bool {
        self.bound != Some(scene) && self.staged.as_ref().map(|(id, _)| *id) != Some(scene)
    }

    fn stage(&mut self, scene: Revision, group: G) {
        self.staged = Some((scene, group));
    }

    fn select(&mut self, scene: Revision) -> AtlasSelection<G> {
        if self.bound == Some(scene) {
            return AtlasSelection::AlreadyBound;
        }
        match self.staged.take() {
            Some((id, group)) if id == scene => {
                self.bound = Some(scene);
                AtlasSelection::Swap(group)
            }
            other => {
                self.staged = other;
                AtlasSelection::Missing
            }
        }
    }
}

/// Everything the kernel binds, allocated once per kernel and image size.
pub struct KernelResources {
    frame: wgpu::Buffer,
    spheres: wgpu::Buffer,
    triangles: wgpu::Buffer,
    accumulation: wgpu::Buffer,
    output: Texture,
    placeholder_atlas: Texture,
    bind_group: wgpu::BindGroup,
    atlas_bindings: AtlasBindings<wgpu::BindGroup>,
    clear_texels: ClearTexels,
    image_size: (u32, u32),
}

impl KernelResources {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        kernel: &Kernel,
        layout: &KernelLayout,
        image_size: (u32, u32),
    ) -> Self {
        let scene_usage = match kernel.params.mode {
            TransportMode::Inline => wgpu::BufferUsages::UNIFORM,
            TransportMode::Buffer => wgpu::BufferUsages::STORAGE,
        };
        let buffer = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let (width, height) = image_size;
        let frame = buffer(
            "Frame Uniforms",
            layout.region_size(Region::Frame),
            wgpu::BufferUsages::UNIFORM,
        );
        let spheres = buffer(
            "Scene Spheres",
            layout.region_size(Region::Spheres),
            scene_usage,
        );
        let triangles = buffer(
            "Scene Triangles",
            layout.region_size(Region::Triangles),
            scene_usage,
        );
        let accumulation = buffer(
            "Accumulation Buffer",
            width as u64 * height as u64 * ACCUMULATION_TEXEL,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let output = Texture::storage(device, width, height, Some("Output Image"));

        let blank = image::RgbaImage::new(1, 1);
        let placeholder_atlas =
            Texture::from_image(device, queue, &blank, Some("Placeholder Atlas"));

        let bind_group = Self::create_bind_group(
            device,
            kernel,
            [&frame, &spheres, &triangles, &accumulation],
            &placeholder_atlas,
            &output,
        );

        Self {
            frame,
            spheres,
            triangles,
            accumulation,
            output,
            placeholder_atlas,
            bind_group,
            atlas_bindings: AtlasBindings::new(),
            clear_texels: ClearTexels::new(width as usize * height as usize),
            image_size,
        }
    }

    fn create_bind_group(
        device: &wgpu::Device,
        kernel: &Kernel,
        [frame, spheres, triangles, accumulation]: [&wgpu::Buffer; 4],
        atlas: &Texture,
        output: &Texture,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Raytracer Bind Group"),
            layout: &kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: spheres.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&atlas.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&atlas.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: accumulation.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(&output.view),
                },
            ],
        })
    }

    fn atlas_bind_group(
        &self,
        device: &wgpu::Device,
        kernel: &Kernel,
        atlas: Option<&Texture>,
    ) -> wgpu::BindGroup {
        Self::create_bind_group(
            device,
            kernel,
            [&self.frame, &self.spheres, &self.triangles, &self.accumulation],
            atlas.unwrap_or(&self.placeholder_atlas),
            &self.output,
        )
    }

    /// Builds the bind group of an uploaded scene so binding it later only
    /// swaps groups.
    pub fn prepare_atlas(&mut self, device: &wgpu::Device, kernel: &Kernel, scene: &CompiledScene) {
        let Some(atlas) = scene.atlas_texture() else {
            return;
        };
        if self.atlas_bindings.needs(scene.id()) {
            let group = self.atlas_bind_group(device, kernel, Some(atlas));
            self.atlas_bindings.stage(scene.id(), group);
        }
    }

    fn region(&self, region: Region) -> &wgpu::Buffer {
        match region {
            Region::Frame => &self.frame,
            Region::Spheres => &self.spheres,
            Region::Triangles => &self.triangles,
        }
    }

    pub fn output(&self) -> &Texture {
        &self.output
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }
}

/// [`KernelTarget`] writing through a wgpu queue.
pub struct GpuTarget<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub kernel: &'a Kernel,
    pub resources: &'a mut KernelResources,
}

impl KernelTarget for GpuTarget<'_> {
    fn write(&mut self, location: Location, bytes: &[u8]) {
        let buffer = self.resources.region(location.region);
        if location.offset + bytes.len() as u64 > buffer.size() {
            tracing::error!(
                "write of {} bytes at {:?}+{} exceeds the {} byte buffer",
                bytes.len(),
                location.region,
                location.offset,
                buffer.size()
            );
            return;
        }
        self.queue.write_buffer(buffer, location.offset, bytes);
    }

    fn bind_atlas(&mut self, scene: &CompiledScene) {
        match self.resources.atlas_bindings.select(scene.id()) {
            AtlasSelection::AlreadyBound => {}
            AtlasSelection::Swap(group) => self.resources.bind_group = group,
            AtlasSelection::Missing => {
                let atlas = scene.atlas_texture();
                if atlas.is_none() {
                    tracing::warn!(
                        "Scene '{}' has no uploaded atlas, binding a blank one",
                        scene.name()
                    );
                }
                let group = self.resources.atlas_bind_group(self.device, self.kernel, atlas);
                self.resources.bind_group = group;
                self.resources.atlas_bindings.bound = atlas.map(|_| scene.id());
            }
        }
    }

    fn clear_output(&mut self, color: [f32; 4]) {
        let resources = &mut *self.resources;
        let bytes = resources.clear_texels.fill(color);
        self.queue.write_buffer(&resources.accumulation, 0, bytes);
    }

    fn dispatch(&mut self) {
        let (width, height) = self.resources.image_size;
        let wg_size = self.kernel.params.workgroup_size;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Raytracer Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Raytracer Pass"),
            });
            pass.set_pipeline(&self.kernel.pipeline);
            pass.set_bind_group(0, &self.resources.bind_group, &[]);
            pass.dispatch_workgroups(
                (width + wg_size - 1) / wg_size,
                (height + wg_size - 1) / wg_size,
                1,
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

pub struct Raytracer {
    kernel: Kernel,
    resources: KernelResources,
    session: RenderSession,
}

impl Raytracer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        params: KernelParams,
        policy: ConfigChangePolicy,
        image_size: (u32, u32),
    ) -> Result<Self> {
        let layout = KernelLayout::new(params)?;
        let kernel = Kernel::new(device, &layout)?;
        let resources = KernelResources::new(device, queue, &kernel, &layout, image_size);
        tracing::info!("Output image is {} x {}", image_size.0, image_size.1);

        Ok(Self {
            kernel,
            resources,
            session: RenderSession::new(layout, policy),
        })
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    pub fn frame_index(&self) -> u32 {
        self.session.frame_index()
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.resources.image_size
    }

    /// The 8-bit image the kernel writes, for presentation.
    pub fn output(&self) -> &Texture {
        self.resources.output()
    }

    pub fn set_camera(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, camera: &Camera) {
        let mut target = GpuTarget {
            device,
            queue,
            kernel: &self.kernel,
            resources: &mut self.resources,
        };
        self.session.set_camera(camera, &mut target);
    }

    /// Uploads the scene atlas if needed and binds the scene, returning the
    /// previously bound scene.
    pub fn set_scene(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mut scene: CompiledScene,
    ) -> Option<CompiledScene> {
        if scene.atlas_texture().is_none() {
            scene.upload(device, queue);
        }
        self.resources.prepare_atlas(device, &self.kernel, &scene);
        let mut target = GpuTarget {
            device,
            queue,
            kernel: &self.kernel,
            resources: &mut self.resources,
        };
        self.session.set_scene(scene, &mut target)
    }

    pub fn set_config(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, config: Config) {
        let mut target = GpuTarget {
            device,
            queue,
            kernel: &self.kernel,
            resources: &mut self.resources,
        };
        self.session.set_config(config, &mut target);
    }

    pub fn render(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Option<u32> {
        let mut target = GpuTarget {
            device,
            queue,
            kernel: &self.kernel,
            resources: &mut self.resources,
        };
        self.session.render(&mut target)
    }

    /// Reads the accumulated image back and writes it to `path`.
    ///
    /// Blocks until the device has finished every submitted frame.
    pub fn save_image(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let path = path.as_ref();
        let (width, height) = self.resources.image_size;
        let size = self.resources.accumulation.size();

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.resources.accumulation, 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver.recv().unwrap_or(Err(wgpu::BufferAsyncError))?;

        let image = {
            let data = slice.get_mapped_range();
            let texels: &[[f32; 4]] = bytemuck::cast_slice(&data[..]);
            encode_texels(texels, width, height)
        };
        staging.unmap();

        image.save(path)?;
        tracing::info!("Saved {} x {} image to {}", width, height, path.display());
        Ok(())
    }
}

/// Linear float texels to gamma-encoded 8-bit pixels.
fn encode_texels(texels: &[[f32; 4]], width: u32, height: u32) -> image::RgbaImage {
    image::RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b, _] = texels
            .get((y * width + x) as usize)
            .copied()
            .unwrap_or_default();
        let gamma = |c: f32| math::unit_to_u8(c.max(0.0).powf(1.0 / 2.2));
        image::Rgba([gamma(r), gamma(g), gamma(b), 255])
    })
}
