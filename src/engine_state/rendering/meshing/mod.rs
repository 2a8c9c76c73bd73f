//! Isosurface meshing and terrain mesh management.
//!
//! # Architecture
//! - `mesh`: per-chunk mesh output and the concatenated terrain mesh
//! - `marching_cubes`: host-side extraction, the reference for the compute shader
//! - `mesh_cache`: LRU cache of chunk meshes between streaming passes
//! - `renderer`: uploads the terrain mesh and draws it

mod marching_cubes;
mod mesh;
mod mesh_cache;
mod renderer;

pub use marching_cubes::MarchingCubes;
pub use mesh::{check_counts, ChunkMesh, TerrainMesh, MAX_INDICES_PER_CHUNK, MAX_VERTICES_PER_CHUNK};
pub use mesh_cache::ChunkMeshCache;
pub use renderer::TerrainRenderer;
