//! # Chunk Module
//!
//! This module provides `ChunkCoord`, the identity of a cubic region of the
//! procedural volume, together with the constants that size every per-chunk
//! buffer in the engine.
//!
//! ## Coordinate Spaces
//!
//! Two integer spaces are used throughout the engine:
//! - **Grid space**: chunk indices, one unit per chunk (`(1, 0, -2)`)
//! - **World space**: voxel corners, one unit per cell (`(32, 0, -64)`)
//!
//! A `ChunkCoord` stores the world-space origin of its chunk. Every component
//! of that origin is a multiple of `CHUNK_SIZE`, which is enforced by only
//! constructing coordinates through grid indices or floor division.
//!
//! ## Sizing
//!
//! A chunk holds `CHUNK_SIZE³` marching-cubes cells. Sampling the density field
//! at every cell corner needs one extra layer on each positive face, so the
//! per-chunk sample grid is `CHUNK_SAMPLES³`.

use cgmath::{MetricSpace, Point3};

pub mod active_set;

/// Edge length of a chunk in cells.
pub const CHUNK_SIZE: i32 = 32;
/// Number of cells in a single chunk (CHUNK_SIZE³).
pub const CHUNK_CELLS: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;
/// Edge length of the density sample grid for one chunk.
pub const CHUNK_SAMPLES: usize = CHUNK_SIZE as usize + 1;
/// Number of density samples in a single chunk (CHUNK_SAMPLES³).
pub const SAMPLES_PER_CHUNK: usize = CHUNK_SAMPLES * CHUNK_SAMPLES * CHUNK_SAMPLES;

/// Identity of a chunk: the world-space origin of its cell volume.
///
/// Coordinates are immutable once built and cheap to copy, which makes them
/// usable as keys for the active chunk set and the mesh cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    origin: Point3<i32>,
}

impl ChunkCoord {
    /// Creates a chunk coordinate from grid indices.
    ///
    /// # Arguments
    /// * `x`, `y`, `z` - The chunk indices in grid space
    ///
    /// # Returns
    /// The chunk whose origin is `(x, y, z) * CHUNK_SIZE`.
    pub fn from_grid(x: i32, y: i32, z: i32) -> Self {
        Self {
            origin: Point3::new(x * CHUNK_SIZE, y * CHUNK_SIZE, z * CHUNK_SIZE),
        }
    }

    /// Returns the chunk that contains a world-space position.
    ///
    /// Uses floor division so that negative positions map to negative chunks
    /// (`-0.5` belongs to chunk `-1`, not chunk `0`).
    pub fn containing(position: Point3<f32>) -> Self {
        let size = CHUNK_SIZE as f32;
        Self::from_grid(
            (position.x / size).floor() as i32,
            (position.y / size).floor() as i32,
            (position.z / size).floor() as i32,
        )
    }

    /// World-space origin of the chunk (its minimum corner).
    pub fn origin(&self) -> Point3<i32> {
        self.origin
    }

    /// Chunk indices in grid space.
    pub fn grid(&self) -> Point3<i32> {
        Point3::new(
            self.origin.x.div_euclid(CHUNK_SIZE),
            self.origin.y.div_euclid(CHUNK_SIZE),
            self.origin.z.div_euclid(CHUNK_SIZE),
        )
    }

    /// Returns the chunk offset from this one by a number of grid steps.
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        let grid = self.grid();
        Self::from_grid(grid.x + dx, grid.y + dy, grid.z + dz)
    }

    /// World-space center of the chunk volume.
    pub fn center(&self) -> Point3<f32> {
        let half = CHUNK_SIZE as f32 / 2.0;
        Point3::new(
            self.origin.x as f32 + half,
            self.origin.y as f32 + half,
            self.origin.z as f32 + half,
        )
    }

    /// Squared distance from the chunk center to a world-space point.
    pub fn distance_squared_to(&self, point: Point3<f32>) -> f32 {
        self.center().distance2(point)
    }

    /// Origin packed for the compute uniform block (`vec4<i32>`, w unused).
    pub fn to_uniform(&self) -> [i32; 4] {
        [self.origin.x, self.origin.y, self.origin.z, 0]
    }
}

/// Orders by origin, x first, then y, then z.
impl Ord for ChunkCoord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let key = |coord: &Self| (coord.origin.x, coord.origin.y, coord.origin.z);
        key(self).cmp(&key(other))
    }
}

impl PartialOrd for ChunkCoord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.origin.x, self.origin.y, self.origin.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containing_uses_floor_division() {
        assert_eq!(
            ChunkCoord::containing(Point3::new(0.0, 0.0, 0.0)),
            ChunkCoord::from_grid(0, 0, 0)
        );
        assert_eq!(
            ChunkCoord::containing(Point3::new(31.9, 32.0, -0.5)),
            ChunkCoord::from_grid(0, 1, -1)
        );
        assert_eq!(
            ChunkCoord::containing(Point3::new(-64.0, -64.1, 95.0)),
            ChunkCoord::from_grid(-2, -3, 2)
        );
    }

    #[test]
    fn origin_is_a_multiple_of_chunk_size() {
        let coord = ChunkCoord::from_grid(-3, 7, 2);
        let origin = coord.origin();
        assert_eq!(origin, Point3::new(-96, 224, 64));
        assert_eq!(coord.grid(), Point3::new(-3, 7, 2));
        assert_eq!(coord.offset(1, -1, 0), ChunkCoord::from_grid(-2, 6, 2));
    }

    #[test]
    fn center_distance() {
        let coord = ChunkCoord::from_grid(0, 0, 0);
        assert_eq!(coord.center(), Point3::new(16.0, 16.0, 16.0));
        assert_eq!(coord.distance_squared_to(Point3::new(16.0, 16.0, 16.0)), 0.0);
        assert_eq!(coord.distance_squared_to(Point3::new(16.0, 20.0, 16.0)), 16.0);
    }

    #[test]
    fn coords_order_by_x_then_y_then_z() {
        let mut coords = vec![
            ChunkCoord::from_grid(1, 0, 0),
            ChunkCoord::from_grid(0, 1, -1),
            ChunkCoord::from_grid(0, 0, 5),
            ChunkCoord::from_grid(-1, 9, 9),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                ChunkCoord::from_grid(-1, 9, 9),
                ChunkCoord::from_grid(0, 0, 5),
                ChunkCoord::from_grid(0, 1, -1),
                ChunkCoord::from_grid(1, 0, 0),
            ]
        );
    }
}
