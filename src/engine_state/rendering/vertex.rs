//! Vertex layout shared by the compute mesher, readback and the render pipeline.
//!
//! The compute shader writes this exact record into its vertex storage buffer,
//! readback reinterprets the staging bytes as `[Vertex]`, and the render
//! pipeline consumes the same bytes as its vertex buffer.

/// A terrain vertex.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes)
/// - Normal: [f32; 3] (12 bytes)
///
/// Total size: 24 bytes, 4-byte aligned. The WGSL side declares six scalar
/// `f32` fields instead of two `vec3<f32>` so that storage-buffer alignment
/// rules do not pad it to 32 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in world space
    pub position: [f32; 3],
    /// Unit surface normal pointing out of the solid
    pub normal: [f32; 3],
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Vertex>() as u64;

    /// Creates a vertex.
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }

    /// Returns the vertex buffer layout description for the render pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<f32>)
    /// - `location = 1`: normal (vec3<f32>)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}
