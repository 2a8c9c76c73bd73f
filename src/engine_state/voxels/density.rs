//! # Density Fields
//!
//! The scalar volume the isosurface is extracted from. A field returns a
//! signed density for any world-space point: positive values are solid,
//! negative values are empty, and the terrain surface is the zero level set.
//!
//! Fields are sampled on the host, one `(CHUNK_SIZE + 1)³` grid per chunk,
//! and the samples are handed to whichever mesher backend is active. Sampling
//! on the host keeps both backends fed with bit-identical input.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use super::chunk::{ChunkCoord, CHUNK_SAMPLES, SAMPLES_PER_CHUNK};

/// A signed scalar field over world space.
pub trait DensityField: Send + Sync {
    /// Density at a world-space point. Positive is solid.
    fn density(&self, x: f32, y: f32, z: f32) -> f32;
}

/// Linear index of a corner in a chunk sample grid (x fastest, then y, then z).
pub fn sample_index(x: usize, y: usize, z: usize) -> usize {
    (z * CHUNK_SAMPLES + y) * CHUNK_SAMPLES + x
}

/// Samples a field at every cell corner of a chunk.
///
/// # Arguments
/// * `field` - The density field to sample
/// * `coord` - The chunk to sample
///
/// # Returns
/// `SAMPLES_PER_CHUNK` values laid out as described by `sample_index`.
pub fn sample_chunk(field: &dyn DensityField, coord: ChunkCoord) -> Vec<f32> {
    let origin = coord.origin();
    let mut samples = Vec::with_capacity(SAMPLES_PER_CHUNK);
    for z in 0..CHUNK_SAMPLES {
        for y in 0..CHUNK_SAMPLES {
            for x in 0..CHUNK_SAMPLES {
                samples.push(field.density(
                    (origin.x + x as i32) as f32,
                    (origin.y + y as i32) as f32,
                    (origin.z + z as i32) as f32,
                ));
            }
        }
    }
    samples
}

/// Parameters of the procedural terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Seed for the Perlin noise source
    pub seed: u32,
    /// Horizontal frequency of the height field
    pub frequency: f64,
    /// Peak height deviation in world units
    pub amplitude: f32,
    /// Mean surface height
    pub base_height: f32,
    /// Strength of the 3D detail noise that carves overhangs
    pub detail: f32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            frequency: 0.01,
            amplitude: 24.0,
            base_height: 0.0,
            detail: 6.0,
        }
    }
}

/// Rolling terrain: a Perlin height field plus a band of 3D detail noise.
pub struct PerlinTerrain {
    perlin: Perlin,
    settings: TerrainSettings,
}

impl PerlinTerrain {
    /// Creates a terrain field from its settings.
    pub fn new(settings: TerrainSettings) -> Self {
        Self {
            perlin: Perlin::new(settings.seed),
            settings,
        }
    }
}

impl DensityField for PerlinTerrain {
    fn density(&self, x: f32, y: f32, z: f32) -> f32 {
        let frequency = self.settings.frequency;
        let (sx, sy, sz) = (
            x as f64 * frequency,
            y as f64 * frequency,
            z as f64 * frequency,
        );

        let height = self.settings.base_height
            + self.perlin.get([sx, sz]) as f32 * self.settings.amplitude;
        let detail = self.perlin.get([sx * 4.0, sy * 4.0, sz * 4.0]) as f32 * self.settings.detail;

        height - y + detail
    }
}

/// A field with the same density everywhere. Yields no surface.
#[derive(Debug, Clone, Copy)]
pub struct ConstantField(pub f32);

impl DensityField for ConstantField {
    fn density(&self, _x: f32, _y: f32, _z: f32) -> f32 {
        self.0
    }
}

/// Solid below a horizontal plane, empty above it.
#[derive(Debug, Clone, Copy)]
pub struct PlaneField {
    /// World-space height of the surface
    pub height: f32,
}

impl DensityField for PlaneField {
    fn density(&self, _x: f32, y: f32, _z: f32) -> f32 {
        self.height - y
    }
}

/// A solid sphere.
#[derive(Debug, Clone, Copy)]
pub struct SphereField {
    /// World-space center
    pub center: [f32; 3],
    /// Radius in world units
    pub radius: f32,
}

impl DensityField for SphereField {
    fn density(&self, x: f32, y: f32, z: f32) -> f32 {
        let dx = x - self.center[0];
        let dy = y - self.center[1];
        let dz = z - self.center[2];
        self.radius - (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_cover_every_corner_in_order() {
        let coord = ChunkCoord::from_grid(1, -1, 0);
        let samples = sample_chunk(&PlaneField { height: 0.0 }, coord);
        assert_eq!(samples.len(), SAMPLES_PER_CHUNK);

        // Density of a plane only depends on y, so index y back out.
        assert_eq!(samples[sample_index(0, 0, 0)], 32.0);
        assert_eq!(samples[sample_index(5, 7, 9)], 32.0 - 7.0);
        assert_eq!(samples[sample_index(32, 32, 32)], 0.0);
    }

    #[test]
    fn perlin_terrain_is_deterministic_per_seed() {
        let a = PerlinTerrain::new(TerrainSettings::default());
        let b = PerlinTerrain::new(TerrainSettings::default());
        let coord = ChunkCoord::from_grid(0, 0, 0);
        assert_eq!(sample_chunk(&a, coord), sample_chunk(&b, coord));

        // Far above the amplitude everything is empty, far below it is solid.
        assert!(a.density(10.0, 500.0, 10.0) < 0.0);
        assert!(a.density(10.0, -500.0, 10.0) > 0.0);
    }
}
