//! Host-side Marching Cubes extraction.
//!
//! This is the reference implementation of the compute shader in
//! `assets/shaders/build_mesh.wgsl`. Both walk the chunk in the same order and
//! apply the same classification, interpolation and normal rules, so for a
//! given sample grid they emit the same vertices and indices in the same order:
//!
//! 1. Vertices: one per lattice edge whose endpoints straddle the surface,
//!    visited row by row (`z`, then `y`), then along `x`, then by axis.
//! 2. Triangles: cells visited in the same row order, each emitting the edge
//!    triples of its configuration, resolved to the shared edge vertices.
//!
//! Sharing vertices between neighbouring cells bounds the vertex count by the
//! number of lattice edges rather than by five triangles per cell.

use crate::engine_state::{
    error::ChunkError,
    rendering::Vertex,
    voxels::{
        chunk::{ChunkCoord, CHUNK_SAMPLES, CHUNK_SIZE, SAMPLES_PER_CHUNK},
        density::sample_index,
        lookup_table::{TriangleTable, CORNER_OFFSETS, EDGE_ORIGINS},
    },
};

use super::mesh::{check_counts, ChunkMesh};

/// Marker for lattice edges without a vertex.
const NO_VERTEX: u32 = u32::MAX;

/// Index of a lattice edge: the corner it starts from and its axis.
fn edge_slot(x: usize, y: usize, z: usize, axis: usize) -> usize {
    sample_index(x, y, z) * 3 + axis
}

/// Whether a corner lies below the surface (empty space).
fn is_below(density: f32) -> bool {
    density < 0.0
}

/// Density gradient at a corner, by central differences clamped at the border.
fn gradient(samples: &[f32], x: usize, y: usize, z: usize) -> [f32; 3] {
    let last = CHUNK_SAMPLES - 1;
    let axis_difference = |lo: (usize, usize, usize), hi: (usize, usize, usize), span: usize| {
        (samples[sample_index(hi.0, hi.1, hi.2)] - samples[sample_index(lo.0, lo.1, lo.2)])
            / span as f32
    };

    let (x0, x1) = (x.saturating_sub(1), (x + 1).min(last));
    let (y0, y1) = (y.saturating_sub(1), (y + 1).min(last));
    let (z0, z1) = (z.saturating_sub(1), (z + 1).min(last));

    [
        axis_difference((x0, y, z), (x1, y, z), x1 - x0),
        axis_difference((x, y0, z), (x, y1, z), y1 - y0),
        axis_difference((x, y, z0), (x, y, z1), z1 - z0),
    ]
}

/// Outward normal from an interpolated density gradient.
fn surface_normal(g0: [f32; 3], g1: [f32; 3], t: f32) -> [f32; 3] {
    let n = [
        -(g0[0] + (g1[0] - g0[0]) * t),
        -(g0[1] + (g1[1] - g0[1]) * t),
        -(g0[2] + (g1[2] - g0[2]) * t),
    ];
    let length = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if length < 1e-6 {
        [0.0, 1.0, 0.0]
    } else {
        [n[0] / length, n[1] / length, n[2] / length]
    }
}

/// Reusable extraction state for one thread.
pub struct MarchingCubes {
    table: TriangleTable,
    edge_vertices: Vec<u32>,
}

impl MarchingCubes {
    /// Creates an extractor around a lookup table.
    pub fn new(table: TriangleTable) -> Self {
        Self {
            table,
            edge_vertices: vec![NO_VERTEX; SAMPLES_PER_CHUNK * 3],
        }
    }

    /// The lookup table in use.
    pub fn table(&self) -> &TriangleTable {
        &self.table
    }

    /// Cube configuration of the cell whose minimum corner is `(x, y, z)`.
    fn configuration(samples: &[f32], x: usize, y: usize, z: usize) -> u8 {
        CORNER_OFFSETS
            .iter()
            .enumerate()
            .fold(0u8, |configuration, (corner, offset)| {
                let density = samples[sample_index(x + offset[0], y + offset[1], z + offset[2])];
                if is_below(density) {
                    configuration | (1 << corner)
                } else {
                    configuration
                }
            })
    }

    /// Extracts the isosurface of one chunk.
    ///
    /// # Arguments
    /// * `coord` - The chunk being meshed, used for world positions
    /// * `samples` - `SAMPLES_PER_CHUNK` densities laid out by `sample_index`
    ///
    /// # Errors
    /// - `SampleCount` if `samples` has the wrong length
    /// - `CapacityExceeded` if the surface needs more vertices or indices than
    ///   a chunk is allowed to hold
    pub fn extract(&mut self, coord: ChunkCoord, samples: &[f32]) -> Result<ChunkMesh, ChunkError> {
        if samples.len() != SAMPLES_PER_CHUNK {
            return Err(ChunkError::SampleCount {
                coord,
                expected: SAMPLES_PER_CHUNK,
                actual: samples.len(),
            });
        }

        let origin = coord.origin();
        let origin = [origin.x as f32, origin.y as f32, origin.z as f32];
        let last = CHUNK_SAMPLES - 1;

        self.edge_vertices.fill(NO_VERTEX);
        let mut vertices = Vec::new();

        for z in 0..CHUNK_SAMPLES {
            for y in 0..CHUNK_SAMPLES {
                for x in 0..CHUNK_SAMPLES {
                    let corner = [x, y, z];
                    let d0 = samples[sample_index(x, y, z)];
                    for axis in 0..3 {
                        if corner[axis] == last {
                            continue;
                        }
                        let mut tip = corner;
                        tip[axis] += 1;
                        let d1 = samples[sample_index(tip[0], tip[1], tip[2])];
                        if is_below(d0) == is_below(d1) {
                            continue;
                        }

                        let t = d0 / (d0 - d1);
                        let mut position = [
                            origin[0] + x as f32,
                            origin[1] + y as f32,
                            origin[2] + z as f32,
                        ];
                        position[axis] += t;

                        let normal = surface_normal(
                            gradient(samples, x, y, z),
                            gradient(samples, tip[0], tip[1], tip[2]),
                            t,
                        );

                        self.edge_vertices[edge_slot(x, y, z, axis)] = vertices.len() as u32;
                        vertices.push(Vertex::new(position, normal));
                    }
                }
            }
        }

        let mut indices = Vec::new();
        let cells = CHUNK_SIZE as usize;
        for z in 0..cells {
            for y in 0..cells {
                for x in 0..cells {
                    let configuration = Self::configuration(samples, x, y, z);
                    for triangle in self.table.triangles(configuration) {
                        for edge in triangle {
                            let (offset, axis) = EDGE_ORIGINS[edge];
                            indices.push(self.edge_vertices[edge_slot(
                                x + offset[0],
                                y + offset[1],
                                z + offset[2],
                                axis,
                            )]);
                        }
                    }
                }
            }
        }

        check_counts(coord, vertices.len() as u32, indices.len() as u32)?;

        Ok(ChunkMesh {
            coord,
            vertices,
            indices,
        })
    }
}
