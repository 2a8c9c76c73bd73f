//! Device buffers used to mesh one chunk at a time.
//!
//! Every buffer is allocated once, at worst-case size, and reused for every
//! chunk. Names are registered in the compute stage's own `BufferState`.

use wgpu::BufferUsages;

use crate::engine_state::{
    buffer_state::BufferState,
    error::BufferError,
    rendering::{
        meshing::{MAX_INDICES_PER_CHUNK, MAX_VERTICES_PER_CHUNK},
        Vertex,
    },
    voxels::{
        chunk::{CHUNK_CELLS, CHUNK_SAMPLES, CHUNK_SIZE, SAMPLES_PER_CHUNK},
        lookup_table::TriangleTable,
    },
};

use super::DeviceContext;

/// Chunk origin uniform, binding 0
pub const CHUNK_UNIFORM_BUFFER_NAME: &str = "chunk_uniform_buffer";
/// Vertex output, binding 1
pub const VERTEX_STORAGE_BUFFER_NAME: &str = "vertex_storage_buffer";
/// Index output, binding 2
pub const INDEX_STORAGE_BUFFER_NAME: &str = "index_storage_buffer";
/// Triangle lookup table, binding 3
pub const TRIANGLE_TABLE_BUFFER_NAME: &str = "triangle_table_buffer";
/// Density samples, binding 4
pub const DENSITY_BUFFER_NAME: &str = "density_buffer";
/// Output counters, binding 5
pub const COUNTER_BUFFER_NAME: &str = "counter_buffer";
/// Per-dispatch scratch, binding 6
pub const SCRATCH_BUFFER_NAME: &str = "scratch_buffer";

pub const VERTEX_STAGING_BUFFER_NAME: &str = "vertex_staging_buffer";
pub const INDEX_STAGING_BUFFER_NAME: &str = "index_staging_buffer";
pub const COUNTER_STAGING_BUFFER_NAME: &str = "counter_staging_buffer";

/// Size of the chunk origin uniform (`vec4<i32>`).
pub const CHUNK_UNIFORM_SIZE: u64 = std::mem::size_of::<[i32; 4]>() as u64;
/// Size of the counter block (`vertex_count`, `index_count`).
pub const COUNTER_SIZE: u64 = std::mem::size_of::<[u32; 2]>() as u64;
/// Size of the vertex output buffer.
pub const VERTEX_STORAGE_SIZE: u64 = MAX_VERTICES_PER_CHUNK as u64 * Vertex::SIZE;
/// Size of the index output buffer.
pub const INDEX_STORAGE_SIZE: u64 = MAX_INDICES_PER_CHUNK as u64 * 4;
/// Size of the density sample buffer.
pub const DENSITY_SIZE: u64 = SAMPLES_PER_CHUNK as u64 * 4;

/// Words in the scratch block: cell configurations, corner-row vertex
/// offsets, cell-row index offsets and the lattice-edge vertex map.
const SCRATCH_WORDS: usize = CHUNK_CELLS
    + CHUNK_SAMPLES * CHUNK_SAMPLES
    + (CHUNK_SIZE * CHUNK_SIZE) as usize
    + SAMPLES_PER_CHUNK * 3;
/// Size of the scratch buffer.
pub const SCRATCH_SIZE: u64 = SCRATCH_WORDS as u64 * 4;

/// The buffers a chunk dispatch reads, writes and reads back through.
pub struct ChunkStorage {
    buffers: BufferState,
}

impl ChunkStorage {
    /// Allocates every chunk buffer and uploads the lookup table.
    pub fn new(context: DeviceContext, table: &TriangleTable) -> Self {
        let mut buffers = BufferState::new(context);

        let device_buffers = [
            (
                CHUNK_UNIFORM_BUFFER_NAME,
                CHUNK_UNIFORM_SIZE,
                BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            ),
            (
                DENSITY_BUFFER_NAME,
                DENSITY_SIZE,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            ),
            (
                VERTEX_STORAGE_BUFFER_NAME,
                VERTEX_STORAGE_SIZE,
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            ),
            (
                INDEX_STORAGE_BUFFER_NAME,
                INDEX_STORAGE_SIZE,
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            ),
            (
                COUNTER_BUFFER_NAME,
                COUNTER_SIZE,
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            ),
            (SCRATCH_BUFFER_NAME, SCRATCH_SIZE, BufferUsages::STORAGE),
            (
                VERTEX_STAGING_BUFFER_NAME,
                VERTEX_STORAGE_SIZE,
                BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            ),
            (
                INDEX_STAGING_BUFFER_NAME,
                INDEX_STORAGE_SIZE,
                BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            ),
            (
                COUNTER_STAGING_BUFFER_NAME,
                COUNTER_SIZE,
                BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            ),
        ];

        for (name, size, usage) in device_buffers {
            buffers.create_buffer(
                name,
                wgpu::BufferDescriptor {
                    label: Some(name),
                    size,
                    usage,
                    mapped_at_creation: false,
                },
            );
        }

        buffers.create_buffer_init(
            TRIANGLE_TABLE_BUFFER_NAME,
            wgpu::util::BufferInitDescriptor {
                label: Some(TRIANGLE_TABLE_BUFFER_NAME),
                contents: table.as_bytes(),
                usage: BufferUsages::STORAGE,
            },
        );

        log::info!(
            "Allocated {} KiB of chunk storage",
            buffers.get_total_allocated_memory() / 1024
        );

        Self { buffers }
    }

    /// The registry holding the chunk buffers.
    pub fn buffers(&self) -> &BufferState {
        &self.buffers
    }

    /// Writes the chunk origin and density samples ahead of a dispatch.
    pub fn write_inputs(&mut self, origin: [i32; 4], samples: &[f32]) -> Result<(), BufferError> {
        self.buffers
            .write_buffer(CHUNK_UNIFORM_BUFFER_NAME, 0, bytemuck::cast_slice(&origin))?;
        self.buffers
            .write_buffer(DENSITY_BUFFER_NAME, 0, bytemuck::cast_slice(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_the_shader_declarations() {
        // array<u32, 32768> + array<u32, 1089> + array<u32, 1024> + array<u32, 107811>
        assert_eq!(SCRATCH_WORDS, 32768 + 1089 + 1024 + 107811);
        assert_eq!(VERTEX_STORAGE_SIZE, 104544 * 24);
        assert_eq!(INDEX_STORAGE_SIZE, 491520 * 4);
        assert_eq!(DENSITY_SIZE, 35937 * 4);
        assert_eq!(CHUNK_UNIFORM_SIZE, 16);
        assert_eq!(COUNTER_SIZE, 8);
    }
}
