use crate::engine_state::{
    error::ChunkError,
    rendering::meshing::{ChunkMesh, MarchingCubes},
    voxels::{chunk::ChunkCoord, lookup_table::TriangleTable},
};

use super::ChunkMesher;

/// Meshes chunks on the calling thread.
///
/// Emits the same layout as the compute shader and needs no device, which
/// makes it the backend for tests and for machines where the compute stage
/// cannot be built.
pub struct CpuChunkMesher {
    marching_cubes: MarchingCubes,
}

impl CpuChunkMesher {
    pub fn new(table: TriangleTable) -> Self {
        Self {
            marching_cubes: MarchingCubes::new(table),
        }
    }
}

impl Default for CpuChunkMesher {
    fn default() -> Self {
        Self::new(TriangleTable::marching_cubes())
    }
}

impl ChunkMesher for CpuChunkMesher {
    fn mesh_chunk(&mut self, coord: ChunkCoord, samples: &[f32]) -> Result<ChunkMesh, ChunkError> {
        self.marching_cubes.extract(coord, samples)
    }

    fn backend(&self) -> &'static str {
        "cpu"
    }
}
