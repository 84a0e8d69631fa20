pub mod accumulation;
pub mod application;
pub mod camera;
pub mod compiled;
pub mod config;
pub mod error;
pub mod kernel;
pub mod layout;
pub mod material;
pub mod raytracer;
pub mod renderer;
pub mod scene;
pub mod scenes;
pub mod session;
pub mod texture;
pub mod transport;
pub mod util;

pub use error::{Error, Result};
