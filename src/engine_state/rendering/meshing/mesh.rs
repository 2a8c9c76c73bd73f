//! Per-chunk meshes and the aggregate terrain mesh.
//!
//! `ChunkMesh` is what one mesher invocation produces: vertices and triangle
//! indices local to a single chunk. `TerrainMesh` concatenates chunk meshes into
//! the single vertex/index pair the renderer draws, rebasing every chunk's
//! indices onto the running vertex count as it goes.

use crate::engine_state::{
    error::ChunkError,
    rendering::Vertex,
    voxels::chunk::{ChunkCoord, CHUNK_CELLS, CHUNK_SAMPLES, CHUNK_SIZE},
};

/// Vertex capacity of one chunk: one vertex per lattice edge of the sample
/// grid, `CHUNK_SIZE` edges along each of the three axes per grid line.
pub const MAX_VERTICES_PER_CHUNK: usize = 3 * CHUNK_SIZE as usize * CHUNK_SAMPLES * CHUNK_SAMPLES;
/// Index capacity of one chunk (five triangles per cell).
pub const MAX_INDICES_PER_CHUNK: usize = CHUNK_CELLS * 15;

/// Mesh output of a single chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMesh {
    /// The chunk this mesh was extracted from
    pub coord: ChunkCoord,
    /// Vertices in world space
    pub vertices: Vec<Vertex>,
    /// Triangle indices into `vertices`
    pub indices: Vec<u32>,
}

impl ChunkMesh {
    /// Creates a mesh with no geometry.
    pub fn empty(coord: ChunkCoord) -> Self {
        Self {
            coord,
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Whether the chunk produced no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks the mesh against the per-chunk capacity and index invariants.
    ///
    /// # Errors
    /// - `CapacityExceeded` if either count is above the chunk capacity
    /// - `PartialTriangle` if the index count is not a multiple of 3
    /// - `IndexOutOfRange` if any index does not name one of the mesh's vertices
    pub fn validate(&self) -> Result<(), ChunkError> {
        let vertex_count = self.vertices.len() as u32;
        let index_count = self.indices.len() as u32;

        check_counts(self.coord, vertex_count, index_count)?;

        if let Some(&index) = self.indices.iter().find(|&&index| index >= vertex_count) {
            return Err(ChunkError::IndexOutOfRange {
                coord: self.coord,
                index,
                vertex_count,
            });
        }
        Ok(())
    }
}

/// Checks reported output counts against the per-chunk capacity.
pub fn check_counts(coord: ChunkCoord, vertices: u32, indices: u32) -> Result<(), ChunkError> {
    if vertices as usize > MAX_VERTICES_PER_CHUNK || indices as usize > MAX_INDICES_PER_CHUNK {
        return Err(ChunkError::CapacityExceeded {
            coord,
            vertices,
            indices,
            max_vertices: MAX_VERTICES_PER_CHUNK as u32,
            max_indices: MAX_INDICES_PER_CHUNK as u32,
        });
    }
    if indices % 3 != 0 {
        return Err(ChunkError::PartialTriangle { coord, indices });
    }
    Ok(())
}

/// The concatenated mesh of every visible chunk.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TerrainMesh {
    /// All vertices, chunk after chunk
    pub vertices: Vec<Vertex>,
    /// All indices, rebased onto `vertices`
    pub indices: Vec<u32>,
    /// Number of chunks appended
    pub chunk_count: usize,
}

impl TerrainMesh {
    /// Creates an empty mesh with room for the given chunk meshes.
    ///
    /// Reserves exactly what the chunks need, so appending them never
    /// reallocates.
    pub fn with_capacity_for<'a>(chunks: impl IntoIterator<Item = &'a ChunkMesh>) -> Self {
        let (vertices, indices) = chunks.into_iter().fold((0, 0), |(v, i), mesh| {
            (v + mesh.vertices.len(), i + mesh.indices.len())
        });
        Self {
            vertices: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(indices),
            chunk_count: 0,
        }
    }

    /// Appends one chunk's mesh, offsetting its indices by the vertices
    /// already present.
    pub fn append(&mut self, chunk: &ChunkMesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&chunk.vertices);
        self.indices
            .extend(chunk.indices.iter().map(|&index| index + base));
        self.chunk_count += 1;
    }

    /// Releases unused capacity and returns the finished mesh.
    pub fn finish(mut self) -> Self {
        self.vertices.shrink_to_fit();
        self.indices.shrink_to_fit();
        self
    }

    /// Whether there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of indices to draw.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_fan(coord: ChunkCoord, vertex_count: u32) -> ChunkMesh {
        let vertices = (0..vertex_count)
            .map(|i| Vertex::new([i as f32, 0.0, 0.0], [0.0, 1.0, 0.0]))
            .collect();
        let indices = (1..vertex_count.saturating_sub(1))
            .flat_map(|i| [0, i, i + 1])
            .collect();
        ChunkMesh {
            coord,
            vertices,
            indices,
        }
    }

    #[test]
    fn append_rebases_indices_onto_the_running_vertex_count() {
        let chunks = [
            triangle_fan(ChunkCoord::from_grid(0, 0, 0), 5),
            ChunkMesh::empty(ChunkCoord::from_grid(1, 0, 0)),
            triangle_fan(ChunkCoord::from_grid(2, 0, 0), 3),
            triangle_fan(ChunkCoord::from_grid(3, 0, 0), 7),
        ];

        let mut terrain = TerrainMesh::with_capacity_for(&chunks);
        let mut appended_vertices = 0usize;
        for chunk in &chunks {
            let before = terrain.indices.len();
            terrain.append(chunk);
            appended_vertices += chunk.vertices.len();
            assert!(terrain.indices[before..]
                .iter()
                .all(|&index| (index as usize) < appended_vertices));
        }
        let terrain = terrain.finish();

        assert_eq!(terrain.chunk_count, 4);
        assert_eq!(terrain.vertices.len(), 15);
        assert_eq!(terrain.indices.len(), (3 + 1 + 5) * 3);
        assert_eq!(&terrain.indices[9..12], &[5, 6, 7]);
        assert_eq!(terrain.indices.len() % 3, 0);
    }

    #[test]
    fn presized_mesh_does_not_reallocate() {
        let chunks = [
            triangle_fan(ChunkCoord::from_grid(0, 0, 0), 6),
            triangle_fan(ChunkCoord::from_grid(0, 1, 0), 4),
        ];
        let mut terrain = TerrainMesh::with_capacity_for(&chunks);
        let vertex_capacity = terrain.vertices.capacity();
        let index_capacity = terrain.indices.capacity();
        for chunk in &chunks {
            terrain.append(chunk);
        }
        assert_eq!(terrain.vertices.capacity(), vertex_capacity);
        assert_eq!(terrain.indices.capacity(), index_capacity);
    }

    #[test]
    fn validate_rejects_bad_indices() {
        let coord = ChunkCoord::from_grid(0, 0, 0);
        let mut mesh = triangle_fan(coord, 4);
        assert!(mesh.validate().is_ok());

        mesh.indices.push(0);
        assert!(matches!(
            mesh.validate(),
            Err(ChunkError::PartialTriangle { indices: 7, .. })
        ));

        mesh.indices.extend([1, 9]);
        assert!(matches!(
            mesh.validate(),
            Err(ChunkError::IndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn counts_above_capacity_are_rejected() {
        let coord = ChunkCoord::from_grid(0, 0, 0);
        assert!(check_counts(coord, MAX_VERTICES_PER_CHUNK as u32, MAX_INDICES_PER_CHUNK as u32).is_ok());
        assert!(matches!(
            check_counts(coord, MAX_VERTICES_PER_CHUNK as u32 + 1, 0),
            Err(ChunkError::CapacityExceeded { .. })
        ));
    }
}
