//! # Active Chunk Set
//!
//! Computes which chunks are visible around a viewpoint and memoizes the
//! result so that a viewpoint moving inside one chunk never triggers work.
//!
//! The visible region is a cuboid of `(2D+1) × (D+1) × (2D+1)` chunks for a
//! visibility distance `D`: full reach on the horizontal axes, half reach
//! vertically, since terrain is mostly spread along the ground plane.
//!
//! When the viewpoint crosses into another chunk, `ActiveChunkSet::update`
//! returns a `ChunkSetDiff` naming the chunks that entered, left, and stayed,
//! so the streaming loop only regenerates what actually changed.

use std::collections::HashSet;

use cgmath::Point3;

use super::ChunkCoord;

/// Returns the vertical grid offsets covered for a visibility distance.
///
/// `D + 1` layers, split so the layer holding the viewpoint is included and
/// the extra layer (for odd `D`) lies below it.
fn vertical_range(visibility_distance: u32) -> std::ops::RangeInclusive<i32> {
    let d = visibility_distance as i32;
    -((d + 1) / 2)..=(d / 2)
}

/// Number of chunks in the active set for a visibility distance.
pub fn active_chunk_count(visibility_distance: u32) -> usize {
    let horizontal = 2 * visibility_distance as usize + 1;
    horizontal * horizontal * (visibility_distance as usize + 1)
}

/// Computes the ordered active chunk set around a viewpoint.
///
/// # Arguments
/// * `viewpoint` - World-space position of the viewer
/// * `visibility_distance` - Horizontal reach in chunks (`D`)
///
/// # Returns
/// `(2D+1)² × (D+1)` distinct chunk coordinates centered on the chunk that
/// contains `viewpoint`, ordered by y, then z, then x.
pub fn active_chunks(viewpoint: Point3<f32>, visibility_distance: u32) -> Vec<ChunkCoord> {
    let center = ChunkCoord::containing(viewpoint);
    let d = visibility_distance as i32;

    let mut chunks = Vec::with_capacity(active_chunk_count(visibility_distance));
    for dy in vertical_range(visibility_distance) {
        for dz in -d..=d {
            for dx in -d..=d {
                chunks.push(center.offset(dx, dy, dz));
            }
        }
    }
    chunks
}

/// Difference between two consecutive active sets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkSetDiff {
    /// Chunks visible now that were not visible before
    pub added: Vec<ChunkCoord>,
    /// Chunks that are no longer visible
    pub removed: Vec<ChunkCoord>,
    /// Chunks visible both before and now
    pub retained: Vec<ChunkCoord>,
}

/// Memoized active set.
///
/// Holds the chunk containing the last viewpoint and the set computed for it.
#[derive(Debug)]
pub struct ActiveChunkSet {
    visibility_distance: u32,
    center: Option<ChunkCoord>,
    chunks: Vec<ChunkCoord>,
    members: HashSet<ChunkCoord>,
}

impl ActiveChunkSet {
    /// Creates an empty set for the given visibility distance.
    pub fn new(visibility_distance: u32) -> Self {
        Self {
            visibility_distance,
            center: None,
            chunks: Vec::new(),
            members: HashSet::new(),
        }
    }

    /// The visibility distance (`D`) this set was built with.
    pub fn visibility_distance(&self) -> u32 {
        self.visibility_distance
    }

    /// The current chunks, in the order produced by `active_chunks`.
    pub fn chunks(&self) -> &[ChunkCoord] {
        &self.chunks
    }

    /// Whether a chunk is part of the current set.
    pub fn contains(&self, coord: &ChunkCoord) -> bool {
        self.members.contains(coord)
    }

    /// Recomputes the set for a new viewpoint.
    ///
    /// # Returns
    /// - `None` if the viewpoint is still inside the same chunk as last time
    /// - `Some(diff)` otherwise, with the set replaced by the new one
    pub fn update(&mut self, viewpoint: Point3<f32>) -> Option<ChunkSetDiff> {
        let center = ChunkCoord::containing(viewpoint);
        if self.center == Some(center) {
            return None;
        }

        let chunks = active_chunks(viewpoint, self.visibility_distance);
        let members: HashSet<ChunkCoord> = chunks.iter().copied().collect();

        let mut diff = ChunkSetDiff::default();
        for chunk in &chunks {
            if self.members.contains(chunk) {
                diff.retained.push(*chunk);
            } else {
                diff.added.push(*chunk);
            }
        }
        diff.removed = self
            .chunks
            .iter()
            .filter(|chunk| !members.contains(chunk))
            .copied()
            .collect();

        self.center = Some(center);
        self.chunks = chunks;
        self.members = members;
        Some(diff)
    }

    /// Forgets the memoized center so the next `update` reports a diff.
    pub fn force_refresh(&mut self) {
        self.center = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::CHUNK_SIZE;

    #[test]
    fn active_set_has_expected_size_and_alignment() {
        let viewpoints = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-100.5, 12.0, 77.0),
            Point3::new(1000.0, -333.3, -1.0),
        ];
        for viewpoint in viewpoints {
            for d in 0..4 {
                let chunks = active_chunks(viewpoint, d);
                let d = d as usize;
                assert_eq!(chunks.len(), (2 * d + 1) * (2 * d + 1) * (d + 1));

                let distinct: HashSet<_> = chunks.iter().collect();
                assert_eq!(distinct.len(), chunks.len());

                let center = ChunkCoord::containing(viewpoint).grid();
                for chunk in &chunks {
                    let origin = chunk.origin();
                    assert_eq!(origin.x % CHUNK_SIZE, 0);
                    assert_eq!(origin.y % CHUNK_SIZE, 0);
                    assert_eq!(origin.z % CHUNK_SIZE, 0);

                    let grid = chunk.grid();
                    assert!((grid.x - center.x).abs() <= d as i32);
                    assert!((grid.z - center.z).abs() <= d as i32);
                    assert!(vertical_range(d as u32).contains(&(grid.y - center.y)));
                }
            }
        }
    }

    #[test]
    fn distance_one_at_origin_is_three_by_three_by_two() {
        let chunks = active_chunks(Point3::new(0.0, 0.0, 0.0), 1);
        assert_eq!(chunks.len(), 18);

        let xs: HashSet<_> = chunks.iter().map(|c| c.grid().x).collect();
        let ys: HashSet<_> = chunks.iter().map(|c| c.grid().y).collect();
        let zs: HashSet<_> = chunks.iter().map(|c| c.grid().z).collect();
        assert_eq!(xs, HashSet::from([-1, 0, 1]));
        assert_eq!(zs, HashSet::from([-1, 0, 1]));
        assert_eq!(ys, HashSet::from([-1, 0]));
        assert!(chunks.contains(&ChunkCoord::from_grid(0, 0, 0)));
    }

    #[test]
    fn update_is_memoized_within_a_chunk() {
        let mut set = ActiveChunkSet::new(1);
        let first = set.update(Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(first.added.len(), 18);
        assert!(first.removed.is_empty());
        assert!(first.retained.is_empty());

        assert!(set.update(Point3::new(30.0, 2.0, 5.0)).is_none());
        assert!(set.update(Point3::new(1.0, 1.0, 1.0)).is_none());

        set.force_refresh();
        let refreshed = set.update(Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(refreshed.added.is_empty());
        assert_eq!(refreshed.retained.len(), 18);
    }

    #[test]
    fn crossing_a_boundary_reports_the_diff() {
        let mut set = ActiveChunkSet::new(1);
        set.update(Point3::new(1.0, 1.0, 1.0));

        let diff = set.update(Point3::new(33.0, 1.0, 1.0)).unwrap();
        // One column of 3 × 2 chunks enters on +x, one leaves on -x.
        assert_eq!(diff.added.len(), 6);
        assert_eq!(diff.removed.len(), 6);
        assert_eq!(diff.retained.len(), 12);
        assert!(diff.added.iter().all(|c| c.grid().x == 2));
        assert!(diff.removed.iter().all(|c| c.grid().x == -1));
        assert!(set.contains(&ChunkCoord::from_grid(2, 0, 0)));
        assert!(!set.contains(&ChunkCoord::from_grid(-1, 0, 0)));
    }
}
