use thiserror::Error;

use crate::material::MaterialHandle;

#[derive(Debug, Error)]
pub enum Error {
    #[error("material handle {0} is stale or was never registered")]
    StaleMaterial(MaterialHandle),

    #[error("atlas of {width}x{height} cannot address {count} materials")]
    AtlasTooSmall { count: usize, width: u32, height: u32 },

    #[error("kernel source is missing placeholder `{0}`")]
    MissingPlaceholder(&'static str),

    #[error("invalid kernel parameters: {0}")]
    InvalidKernelParams(String),

    #[error("kernel creation failed: {0}")]
    KernelCreation(String),

    #[error("no compatible graphics adapter found")]
    NoAdapter,

    #[error("surface is not supported by the adapter")]
    UnsupportedSurface,

    #[error(transparent)]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error(transparent)]
    Window(#[from] winit::error::OsError),

    #[error("failed to read back the output image: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
