//! Terrain renderer.
//!
//! Draws the aggregate terrain mesh with a single indexed draw. The vertex and
//! index buffers are registered in the render-side `BufferState` and only
//! grow: a new mesh that fits is written into the existing buffers, a larger
//! one replaces them.
//!
//! # Architecture
//!
//! The terrain renderer is responsible for:
//! 1. Creating and managing its own render pipeline
//! 2. Replacing the presented mesh as a whole when a streaming pass finishes
//! 3. Issuing the draw for the current mesh

use wgpu::{BufferUsages, RenderPass, RenderPipeline, TextureFormat};

use crate::engine_state::{
    buffer_state::BufferState,
    error::{BufferError, StartupError},
    rendering::{
        bind_group_state::{BindGroupState, CAMERA_BIND_GROUP, CAMERA_BIND_GROUP_LAYOUT},
        Vertex,
    },
};

use super::mesh::TerrainMesh;

/// Vertex buffer of the presented terrain
pub const TERRAIN_VERTEX_BUFFER_NAME: &str = "terrain_vertex_buffer";
/// Index buffer of the presented terrain
pub const TERRAIN_INDEX_BUFFER_NAME: &str = "terrain_index_buffer";

/// Renders the presented terrain mesh.
pub struct TerrainRenderer {
    render_pipeline: RenderPipeline,
    vertex_bytes: u64,
    index_bytes: u64,
    index_count: u32,
}

impl TerrainRenderer {
    /// Creates the terrain render pipeline.
    ///
    /// # Arguments
    /// * `buffer_state` - The render-side buffer registry
    /// * `shader_string` - WGSL source with `vs_main` and `fs_main`
    /// * `texture_format` - Format of the surface being drawn to
    /// * `bind_group_state` - Holds the camera bind group layout
    /// * `depth_stencil` - Depth state of the pass
    ///
    /// # Errors
    /// `Validation` if the device rejects the shader or the pipeline.
    pub fn new(
        buffer_state: &BufferState,
        shader_string: &str,
        texture_format: TextureFormat,
        bind_group_state: &BindGroupState,
        depth_stencil: Option<wgpu::DepthStencilState>,
    ) -> Result<Self, StartupError> {
        let device = &buffer_state.context().device;

        let camera_layout = bind_group_state
            .get_bind_group_layout(CAMERA_BIND_GROUP_LAYOUT)
            .ok_or_else(|| StartupError::Validation {
                stage: "terrain pipeline",
                message: format!("bind group layout '{CAMERA_BIND_GROUP_LAYOUT}' was not created"),
            })?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Terrain Render Pipeline Layout"),
            bind_group_layouts: &[camera_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Terrain Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_string.into()),
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Terrain Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Both faces are drawn so the surface stays visible from below.
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(StartupError::Validation {
                stage: "terrain pipeline",
                message: error.to_string(),
            });
        }

        Ok(Self {
            render_pipeline,
            vertex_bytes: 0,
            index_bytes: 0,
            index_count: 0,
        })
    }

    /// Number of indices drawn per frame.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Makes sure the named buffer holds at least `needed` bytes.
    fn reserve(
        buffer_state: &mut BufferState,
        name: &'static str,
        usage: BufferUsages,
        needed: u64,
    ) {
        let current = buffer_state.get_buffer_size(name).unwrap_or(0);
        if current >= needed {
            return;
        }
        let size = needed.next_power_of_two();
        log::debug!("Growing {name} from {current} to {size} bytes");
        buffer_state.create_buffer(
            name,
            wgpu::BufferDescriptor {
                label: Some(name),
                size,
                usage: usage | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            },
        );
    }

    /// Replaces the presented terrain with `mesh`.
    ///
    /// An empty mesh clears the terrain; nothing is drawn until the next
    /// non-empty one.
    pub fn replace_terrain_mesh(
        &mut self,
        buffer_state: &mut BufferState,
        mesh: &TerrainMesh,
    ) -> Result<(), BufferError> {
        if mesh.is_empty() {
            self.vertex_bytes = 0;
            self.index_bytes = 0;
            self.index_count = 0;
            return Ok(());
        }

        let vertex_data: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let index_data: &[u8] = bytemuck::cast_slice(&mesh.indices);

        Self::reserve(
            buffer_state,
            TERRAIN_VERTEX_BUFFER_NAME,
            BufferUsages::VERTEX,
            vertex_data.len() as u64,
        );
        Self::reserve(
            buffer_state,
            TERRAIN_INDEX_BUFFER_NAME,
            BufferUsages::INDEX,
            index_data.len() as u64,
        );

        buffer_state.write_buffer(TERRAIN_VERTEX_BUFFER_NAME, 0, vertex_data)?;
        buffer_state.write_buffer(TERRAIN_INDEX_BUFFER_NAME, 0, index_data)?;

        self.vertex_bytes = vertex_data.len() as u64;
        self.index_bytes = index_data.len() as u64;
        self.index_count = mesh.index_count();
        Ok(())
    }

    /// Draws the presented terrain.
    pub fn render(
        &self,
        render_pass: &mut RenderPass<'_>,
        buffer_state: &BufferState,
        bind_group_state: &BindGroupState,
    ) -> Result<(), BufferError> {
        if self.index_count == 0 {
            return Ok(());
        }
        let Some(camera_bind_group) = bind_group_state.get_bind_group(CAMERA_BIND_GROUP) else {
            log::error!("Camera bind group missing, skipping terrain");
            return Ok(());
        };

        render_pass.set_pipeline(&self.render_pipeline);
        render_pass.set_bind_group(0, camera_bind_group, &[]);
        render_pass.set_vertex_buffer(
            0,
            buffer_state
                .get_buffer(TERRAIN_VERTEX_BUFFER_NAME)?
                .slice(..self.vertex_bytes),
        );
        render_pass.set_index_buffer(
            buffer_state
                .get_buffer(TERRAIN_INDEX_BUFFER_NAME)?
                .slice(..self.index_bytes),
            wgpu::IndexFormat::Uint32,
        );
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
        Ok(())
    }
}
