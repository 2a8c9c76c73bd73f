//! # Graphics Resources Builder
//!
//! Creates the window, surface and device, and reads the shaders named in
//! the configuration. The result is delivered to the event loop as a user
//! event so that `ApplicationState` can build the engine from it.
//!
//! The main components are:
//! - `Graphics`: everything the engine is built from
//! - `GraphicsBuilder`: runs the asynchronous setup once
//! - `MaybeGraphics`: where the setup currently stands

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use wgpu::{Surface, SurfaceConfiguration};
use winit::{
    event_loop::{ActiveEventLoop, EventLoopProxy},
    window::Window,
};

use crate::engine_state::{
    compute::DeviceContext,
    config::{EngineConfig, MesherBackend},
    error::StartupError,
    ShaderSources,
};

/// Window title
const WINDOW_TITLE: &str = "Voxel Terrain";

/// The outcome of graphics setup, sent back through the event loop.
pub type GraphicsEvent = anyhow::Result<Graphics>;

/// Everything the engine needs from the platform.
pub struct Graphics {
    pub window: Arc<Window>,
    pub surface: Surface<'static>,
    pub surface_config: SurfaceConfiguration,
    pub context: DeviceContext,
    pub shaders: ShaderSources,
}

/// Reads a WGSL file.
pub fn read_shader(path: &Path) -> Result<String, StartupError> {
    std::fs::read_to_string(path).map_err(|source| StartupError::ShaderRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the render shader, and the compute shader if the GPU mesher is used.
fn read_shaders(config: &EngineConfig) -> Result<ShaderSources, StartupError> {
    let render = read_shader(&config.render_shader_path)?;
    let compute = match config.mesher {
        MesherBackend::Gpu => Some(read_shader(&config.compute_shader_path)?),
        MesherBackend::Cpu => None,
    };
    Ok(ShaderSources { render, compute })
}

/// Creates the window and surface, then returns a future that opens the
/// device and configures the surface.
fn create_graphics(
    event_loop: &ActiveEventLoop,
    config: &EngineConfig,
) -> anyhow::Result<impl Future<Output = anyhow::Result<Graphics>> + 'static> {
    let window_attrs = Window::default_attributes().with_title(WINDOW_TITLE);
    let window = Arc::new(
        event_loop
            .create_window(window_attrs)
            .context("failed to create the window")?,
    );

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        flags: wgpu::InstanceFlags::empty(),
        backend_options: wgpu::BackendOptions::from_env_or_default(),
    });

    let surface = instance
        .create_surface(window.clone())
        .context("failed to create the window surface")?;

    let shaders = read_shaders(config).context("failed to load shaders")?;

    Ok(async move {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(StartupError::from)?;

        let info = adapter.get_info();
        log::info!("Using {} ({:?})", info.name, info.backend);

        let context = DeviceContext::from_adapter(&adapter).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("the surface is not supported by the adapter")?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &surface_config);

        Ok(Graphics {
            window,
            surface,
            surface_config,
            context,
            shaders,
        })
    })
}

/// Runs graphics setup once and hands the result to the event loop.
pub struct GraphicsBuilder {
    event_loop_proxy: Option<EventLoopProxy<GraphicsEvent>>,
    config: EngineConfig,
}

/// Where graphics setup currently stands.
pub enum MaybeGraphics {
    /// Waiting for the first `resumed`
    Builder(GraphicsBuilder),

    /// Ready to build the engine from
    Graphics(Graphics),

    /// Handed over to the engine
    Moved,
}

impl GraphicsBuilder {
    /// # Arguments
    /// * `event_loop_proxy` - Delivers the setup result back to the event loop
    /// * `config` - Supplies the shader paths and mesher backend
    pub fn new(event_loop_proxy: EventLoopProxy<GraphicsEvent>, config: EngineConfig) -> Self {
        Self {
            event_loop_proxy: Some(event_loop_proxy),
            config,
        }
    }

    /// Runs graphics setup and sends the result, success or failure, to the
    /// event loop. Later calls do nothing.
    pub fn build_and_send(&mut self, event_loop: &ActiveEventLoop) {
        let Some(event_loop_proxy) = self.event_loop_proxy.take() else {
            // Graphics were already built.
            return;
        };

        let graphics = create_graphics(event_loop, &self.config)
            .and_then(|graphics_future| pollster::block_on(graphics_future));

        if event_loop_proxy.send_event(graphics).is_err() {
            log::error!("Event loop closed before graphics setup finished");
        }
    }
}
