//! Chunk mesh cache.
//!
//! Keeps the meshes of recently visible chunks so that a streaming pass only
//! dispatches chunks it has never seen, or has evicted. Recency is refreshed by
//! distance from the viewpoint after each pass: chunks are promoted farthest
//! first, leaving the nearest chunks most recently used and the farthest
//! chunks, together with chunks that left the active set, at the eviction end.

use std::num::NonZeroUsize;

use cgmath::Point3;
use lru::LruCache;

use crate::engine_state::voxels::chunk::ChunkCoord;

use super::mesh::ChunkMesh;

/// LRU cache of chunk meshes keyed by chunk coordinate.
pub struct ChunkMeshCache {
    meshes: LruCache<ChunkCoord, ChunkMesh>,
}

impl ChunkMeshCache {
    /// Creates a cache holding at most `capacity` chunk meshes.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            meshes: LruCache::new(capacity),
        }
    }

    /// Maximum number of meshes kept.
    pub fn capacity(&self) -> usize {
        self.meshes.cap().get()
    }

    /// Number of meshes currently kept.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Whether a mesh for `coord` is cached. Does not touch recency.
    pub fn contains(&self, coord: &ChunkCoord) -> bool {
        self.meshes.contains(coord)
    }

    /// Looks up a mesh without touching recency.
    pub fn peek(&self, coord: &ChunkCoord) -> Option<&ChunkMesh> {
        self.meshes.peek(coord)
    }

    /// Stores a mesh, evicting the least recently used one if full.
    ///
    /// # Returns
    /// The coordinate of the evicted mesh, if a different chunk was evicted.
    pub fn insert(&mut self, mesh: ChunkMesh) -> Option<ChunkCoord> {
        let coord = mesh.coord;
        match self.meshes.push(coord, mesh) {
            Some((evicted, _)) if evicted != coord => Some(evicted),
            _ => None,
        }
    }

    /// Moves chunks that left the active set to the eviction end.
    pub fn demote(&mut self, coords: &[ChunkCoord]) {
        for coord in coords {
            self.meshes.demote(coord);
        }
    }

    /// Refreshes recency for the visible chunks, nearest chunk last.
    ///
    /// # Arguments
    /// * `visible` - The chunks of the current active set
    /// * `viewpoint` - The viewpoint the set was computed for
    pub fn promote_by_distance(&mut self, visible: &[ChunkCoord], viewpoint: Point3<f32>) {
        let mut by_distance: Vec<(f32, ChunkCoord)> = visible
            .iter()
            .map(|coord| (coord.distance_squared_to(viewpoint), *coord))
            .collect();
        by_distance.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, coord) in by_distance {
            self.meshes.promote(&coord);
        }
    }

    /// Coordinate of the mesh that would be evicted next.
    pub fn next_eviction(&self) -> Option<ChunkCoord> {
        self.meshes.peek_lru().map(|(coord, _)| *coord)
    }
}
