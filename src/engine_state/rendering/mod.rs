//! Rendering system for the terrain.
//!
//! Owns the surface, the render-side buffer registry and the terrain
//! pipeline, and draws the presented terrain once per frame. Streaming passes
//! hand finished meshes over through the `TerrainSink` implementation.

use wgpu::{Surface, SurfaceConfiguration};

use super::{
    buffer_state::BufferState,
    camera_state::camera,
    compute::DeviceContext,
    error::StartupError,
    streaming::tasks::TerrainSink,
};

mod bind_group_state;
pub mod meshing;
mod texture;
mod vertex;

// Re-export commonly used types
pub use vertex::Vertex;

use bind_group_state::BindGroupState;
use meshing::{TerrainMesh, TerrainRenderer};
use texture::Texture;

/// Colour behind the terrain
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.53,
    g: 0.71,
    b: 0.92,
    a: 1.0,
};

/// Manages the surface and everything drawn to it.
pub struct RenderManager {
    /// The surface being rendered to
    pub surface: Surface<'static>,
    /// Size and format of the surface
    pub surface_config: SurfaceConfiguration,
    context: DeviceContext,
    /// Render-side buffers: the camera uniform and the terrain draw buffers
    pub buffer_state: BufferState,
    bind_group_state: BindGroupState,
    depth_texture: Texture,
    terrain_renderer: TerrainRenderer,
    /// Camera projection settings
    pub camera_projection: camera::Projection,
}

impl RenderManager {
    /// Creates the render pipeline and its bind groups.
    ///
    /// `buffer_state` must already hold the camera uniform buffer.
    ///
    /// # Errors
    /// `Buffer` if the camera buffer is missing, `Validation` if the device
    /// rejects the terrain shader or pipeline.
    pub fn new(
        surface: Surface<'static>,
        surface_config: SurfaceConfiguration,
        context: DeviceContext,
        buffer_state: BufferState,
        shader_string: &str,
        camera_projection: camera::Projection,
    ) -> Result<Self, StartupError> {
        let bind_group_state = BindGroupState::new(&context.device, &buffer_state)?;
        let depth_texture =
            Texture::create_depth_texture(&context.device, &surface_config, "Depth Texture");
        let terrain_renderer = TerrainRenderer::new(
            &buffer_state,
            shader_string,
            surface_config.format,
            &bind_group_state,
            Some(Texture::depth_stencil_state()),
        )?;

        log::info!(
            "Render pipeline ready for a {}x{} {:?} surface",
            surface_config.width,
            surface_config.height,
            surface_config.format
        );

        Ok(Self {
            surface,
            surface_config,
            context,
            buffer_state,
            bind_group_state,
            depth_texture,
            terrain_renderer,
            camera_projection,
        })
    }

    /// Reconfigures the surface, depth buffer and projection for a new size.
    ///
    /// Zero sizes are ignored; the surface cannot be configured with them.
    pub fn resize_surface(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface
            .configure(&self.context.device, &self.surface_config);

        self.camera_projection.resize(size.width, size.height);
        self.depth_texture = Texture::create_depth_texture(
            &self.context.device,
            &self.surface_config,
            "Depth Texture",
        );
    }

    /// Number of terrain indices currently presented.
    pub fn presented_index_count(&self) -> u32 {
        self.terrain_renderer.index_count()
    }

    /// Renders a frame.
    ///
    /// A lost or outdated surface is reconfigured and the frame skipped;
    /// other surface errors skip the frame with an error log.
    pub fn render(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface
                    .configure(&self.context.device, &self.surface_config);
                return;
            }
            Err(error) => {
                log::error!("Error getting current frame: {error}");
                return;
            }
        };

        let view = frame.texture.create_view(&Default::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Terrain Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Terrain Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Err(error) =
                self.terrain_renderer
                    .render(&mut render_pass, &self.buffer_state, &self.bind_group_state)
            {
                log::error!("Terrain draw skipped: {error}");
            }
        }

        self.context.queue.submit([encoder.finish()]);
        frame.present();
    }
}

impl TerrainSink for RenderManager {
    fn replace_terrain_mesh(&mut self, mesh: &TerrainMesh) {
        match self
            .terrain_renderer
            .replace_terrain_mesh(&mut self.buffer_state, mesh)
        {
            Ok(()) => log::info!(
                "Presenting terrain: {} vertices, {} triangles",
                mesh.vertices.len(),
                mesh.index_count() / 3
            ),
            Err(error) => log::error!("Terrain upload failed: {error}"),
        }
    }
}
