use std::time::Instant;

use wgpu::SurfaceError;
use winit::{
    dpi::PhysicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window, WindowBuilder},
};

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct AppState {
    previous_time: Instant,
    /// Seconds since the previous update.
    delta_time: f32,
    frame_count: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            previous_time: Instant::now(),
            delta_time: 0.0,
            frame_count: 0,
        }
    }

    pub fn update(&mut self) {
        let current_time = Instant::now();
        self.delta_time = current_time
            .duration_since(self.previous_time)
            .as_secs_f32();
        self.previous_time = current_time;
        self.frame_count += 1;
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the layer wants the event loop to do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct WindowOptions {
    pub title: String,
    pub size: PhysicalSize<u32>,
}

pub struct Application<L: Layer + 'static> {
    layer: Option<L>,
    options: Option<L::Options>,
    screen: Screen,
    state: AppState,
}

impl<L: Layer + 'static> Application<L> {
    pub fn new(screen: Screen, options: L::Options) -> Self {
        Self {
            screen,
            layer: None,
            options: Some(options),
            state: AppState::new(),
        }
    }

    fn run(
        &mut self,
        event: Event<()>,
        _event_loop: &EventLoopWindowTarget<()>,
        control_flow: &mut ControlFlow,
    ) {
        control_flow.set_wait();

        if let Some(layer) = self.layer.as_mut() {
            if layer.process_event(&event, &self.state, &mut self.screen) == Flow::Exit {
                self.exit(control_flow);
                return;
            }
        }

        match event {
            Event::NewEvents(StartCause::Init) => {
                let Some(options) = self.options.take() else {
                    return;
                };
                match L::start(options, &mut self.screen, &self.state) {
                    Ok(layer) => self.layer = Some(layer),
                    Err(err) => {
                        tracing::error!("Failed to start: {}", err);
                        control_flow.set_exit_with_code(1);
                    }
                }
            }
            Event::WindowEvent {
                window_id,
                ref event,
            } if self.screen.window().id() == window_id => match event {
                WindowEvent::CloseRequested => self.exit(control_flow),
                WindowEvent::Resized(physical_size) => {
                    self.screen.resize(*physical_size);
                    if let Some(layer) = self.layer.as_mut() {
                        layer.resize(*physical_size, &self.state, &mut self.screen);
                    }
                }
                WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                    self.screen.resize(**new_inner_size);
                    if let Some(layer) = self.layer.as_mut() {
                        layer.resize(**new_inner_size, &self.state, &mut self.screen);
                    }
                }
                _ => {}
            },
            Event::MainEventsCleared => {
                self.state.update();
                self.screen.window().request_redraw();
            }
            Event::RedrawRequested(window_id) if self.screen.window().id() == window_id => {
                let Some(layer) = self.layer.as_mut() else {
                    return;
                };
                layer.update(&self.state, &mut self.screen);

                match layer.render(&self.state, &mut self.screen) {
                    Ok(_) => {}
                    Err(SurfaceError::Lost) => self.screen.resize_to_current(),
                    Err(SurfaceError::OutOfMemory) => control_flow.set_exit_with_code(137),
                    Err(e) => tracing::error!("{:?}", e),
                }
            }
            _ => {}
        }
    }

    fn exit(&mut self, control_flow: &mut ControlFlow) {
        control_flow.set_exit_with_code(0);
        if let Some(layer) = self.layer.as_mut() {
            if let Err(err) = layer.shutdown(&self.state, &mut self.screen) {
                tracing::error!("Shutdown failed: {}", err);
                control_flow.set_exit_with_code(1);
            }
        }
    }

    /// Opens the window and runs the event loop. Only returns on a startup
    /// failure.
    pub async fn init(window: WindowOptions, options: L::Options) -> Result<()> {
        let event_loop = EventLoop::new();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let screen = Screen::new(&event_loop, &instance, window).await?;
        let mut application = Self::new(screen, options);
        event_loop.run(move |event, event_loop, control_flow| {
            application.run(event, event_loop, control_flow);
        });
    }
}

pub struct Screen {
    pub surface: wgpu::Surface,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    window: Window,
}

impl Screen {
    pub async fn new(
        event_loop: &EventLoopWindowTarget<()>,
        instance: &wgpu::Instance,
        options: WindowOptions,
    ) -> Result<Self> {
        let window = WindowBuilder::new()
            .with_title(options.title)
            .with_inner_size(options.size)
            .build(event_loop)?;

        // SAFETY:
        // The surface needs to live as long as the window that created it.
        // Screen owns the window so this should be safe.
        let surface = unsafe { instance.create_surface(&window) }?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(Error::NoAdapter)?;
        tracing::info!("Using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: adapter.features(),
                    limits: wgpu::Limits::default(),
                    label: None,
                },
                None,
            )
            .await?;
        let size = window.inner_size();
        let config = surface
            .get_default_config(&adapter, size.width, size.height)
            .ok_or(Error::UnsupportedSurface)?;
        surface.configure(&device, &config);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resize the screen to new window size.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Resize the screen to current window inner size.
    pub fn resize_to_current(&mut self) {
        self.resize(self.window.inner_size());
    }
}

pub trait Layer: Sized {
    type Options: 'static;

    fn start(options: Self::Options, screen: &mut Screen, app: &AppState) -> Result<Self>;
    fn process_event(&mut self, event: &Event<()>, app: &AppState, screen: &mut Screen) -> Flow;
    fn resize(&mut self, new_size: PhysicalSize<u32>, app: &AppState, screen: &mut Screen);
    fn update(&mut self, app: &AppState, screen: &mut Screen);
    fn render(
        &mut self,
        app: &AppState,
        screen: &mut Screen,
    ) -> std::result::Result<(), SurfaceError>;
    fn shutdown(&mut self, app: &AppState, screen: &mut Screen) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_time_is_measured_in_seconds() {
        let mut state = AppState::new();
        std::thread::sleep(std::time::Duration::from_millis(20));
        state.update();
        assert!(state.delta_time() >= 0.02);
        assert!(state.delta_time() < 5.0);
        assert_eq!(state.frame_count(), 1);
    }
}
