//! # Terrain Streaming
//!
//! Keeps the terrain mesh in step with a moving viewpoint.
//!
//! ## Key Components
//! - `StreamingLoop`: the pass that turns a viewpoint into a `TerrainMesh`
//! - `StreamState`: what the loop is doing right now, readable from any thread
//! - `CancelSource` / `CancelToken`: supersede an in-flight pass
//! - `tasks`: runs passes on a `TaskManager` worker and uploads on the main thread
//!
//! ## Pass Lifecycle
//! 1. The active chunk set is recomputed for the viewpoint. If the viewpoint is
//!    still in the same chunk nothing else happens.
//! 2. Chunks that left the set are demoted in the mesh cache.
//! 3. Every visible chunk without a cached mesh is sampled and meshed, one at
//!    a time. The token is checked before each chunk.
//! 4. Cached meshes of the visible chunks are concatenated in active set order.
//!
//! A chunk that fails to mesh is logged and skipped. It keeps whatever mesh
//! it had and is tried again on the next pass.

use std::{collections::HashSet, num::NonZeroUsize};

use cgmath::Point3;

use crate::core::MtResource;

use super::{
    compute::ChunkMesher,
    config::EngineConfig,
    error::StartupError,
    rendering::meshing::{ChunkMesh, ChunkMeshCache, TerrainMesh},
    voxels::{
        chunk::{
            active_set::{active_chunk_count, ActiveChunkSet},
            ChunkCoord,
        },
        density::{sample_chunk, DensityField},
    },
};

mod cancel;
pub mod tasks;

pub use cancel::{CancelSource, CancelToken};

/// What the streaming loop is currently doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Idle,
    /// Meshing the `chunk_index`th of `total` chunks that need a mesh
    Computing { chunk_index: usize, total: usize },
    /// Concatenating the visible chunk meshes
    Assembling,
    /// Handing the assembled mesh to the renderer
    Uploading,
}

/// The result of one `StreamingLoop::run_pass`.
#[derive(Debug)]
pub enum PassOutcome {
    /// The viewpoint is in the same chunk as last time; keep the current mesh
    Unchanged,
    /// The token was cancelled before the pass finished
    Superseded,
    /// The new terrain mesh
    Assembled(TerrainMesh),
}

/// Counters of one pass, for logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub visible: usize,
    pub meshed: usize,
    pub failed: usize,
    pub cache_hits: usize,
}

pub struct StreamingLoop {
    active_set: ActiveChunkSet,
    cache: ChunkMeshCache,
    mesher: Box<dyn ChunkMesher>,
    field: Box<dyn DensityField>,
    /// Cached chunks to mesh again on the next pass
    stale: HashSet<ChunkCoord>,
    state: MtResource<StreamState>,
    last_stats: PassStats,
}

impl StreamingLoop {
    /// Creates a loop with an empty cache sized from the configuration.
    ///
    /// # Errors
    /// `ConfigValue` if the cache cannot hold the active set.
    pub fn new(
        config: &EngineConfig,
        mesher: Box<dyn ChunkMesher>,
        field: Box<dyn DensityField>,
    ) -> Result<Self, StartupError> {
        let visible = active_chunk_count(config.visibility_distance);
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .filter(|capacity| capacity.get() >= visible)
            .ok_or_else(|| {
                StartupError::ConfigValue(format!(
                    "cache_capacity {} cannot hold {visible} visible chunks",
                    config.cache_capacity
                ))
            })?;

        log::info!(
            "Streaming {} chunks with the {} mesher, caching up to {}",
            visible,
            mesher.backend(),
            capacity
        );

        Ok(Self {
            active_set: ActiveChunkSet::new(config.visibility_distance),
            cache: ChunkMeshCache::new(capacity),
            mesher,
            field,
            stale: HashSet::new(),
            state: MtResource::new(StreamState::Idle),
            last_stats: PassStats::default(),
        })
    }

    /// Shared handle to the loop's current state.
    pub fn state(&self) -> MtResource<StreamState> {
        self.state.clone()
    }

    /// Counters of the last finished pass.
    pub fn last_stats(&self) -> PassStats {
        self.last_stats
    }

    /// The chunks of the last computed active set.
    pub fn active_chunks(&self) -> &[ChunkCoord] {
        self.active_set.chunks()
    }

    pub fn cache(&self) -> &ChunkMeshCache {
        &self.cache
    }

    /// Marks every visible chunk for meshing again and forces the next pass
    /// to run even if the viewpoint has not left its chunk.
    pub fn request_rebuild(&mut self) {
        self.stale.extend(self.active_set.chunks().iter().copied());
        self.active_set.force_refresh();
    }

    fn set_state(&self, state: StreamState) {
        *self.state.get_mut() = state;
    }

    /// Runs one streaming pass for `viewpoint`.
    pub fn run_pass(&mut self, viewpoint: Point3<f32>, cancel: &CancelToken) -> PassOutcome {
        let Some(diff) = self.active_set.update(viewpoint) else {
            return PassOutcome::Unchanged;
        };
        let started = web_time::Instant::now();

        self.cache.demote(&diff.removed);

        let pending: Vec<ChunkCoord> = self
            .active_set
            .chunks()
            .iter()
            .filter(|coord| !self.cache.contains(coord) || self.stale.contains(coord))
            .copied()
            .collect();

        let mut stats = PassStats {
            visible: self.active_set.chunks().len(),
            cache_hits: self.active_set.chunks().len() - pending.len(),
            ..PassStats::default()
        };

        for (chunk_index, &coord) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                log::debug!(
                    "Pass for chunk {} superseded after {chunk_index} of {} chunks",
                    ChunkCoord::containing(viewpoint),
                    pending.len()
                );
                self.active_set.force_refresh();
                self.set_state(StreamState::Idle);
                return PassOutcome::Superseded;
            }
            self.set_state(StreamState::Computing {
                chunk_index,
                total: pending.len(),
            });

            let samples = sample_chunk(self.field.as_ref(), coord);
            match self.mesher.mesh_chunk(coord, &samples) {
                Ok(mesh) => {
                    self.cache.insert(mesh);
                    self.stale.remove(&coord);
                    stats.meshed += 1;
                }
                Err(error) => {
                    log::warn!("Skipping chunk {coord}: {error}");
                    stats.failed += 1;
                }
            }
        }

        // Failed chunks are retried by the next pass, even at this viewpoint.
        if stats.failed > 0 {
            self.active_set.force_refresh();
        }

        self.set_state(StreamState::Assembling);
        self.cache
            .promote_by_distance(self.active_set.chunks(), viewpoint);
        let mesh = self.assemble();
        self.set_state(StreamState::Idle);

        log::debug!(
            "Pass at chunk {}: {} visible, {} cached, {} meshed, {} failed, {} vertices, {} triangles in {:?}",
            ChunkCoord::containing(viewpoint),
            stats.visible,
            stats.cache_hits,
            stats.meshed,
            stats.failed,
            mesh.vertices.len(),
            mesh.indices.len() / 3,
            started.elapsed()
        );
        self.last_stats = stats;

        PassOutcome::Assembled(mesh)
    }

    /// Concatenates the cached meshes of the visible chunks.
    fn assemble(&self) -> TerrainMesh {
        let meshes: Vec<&ChunkMesh> = self
            .active_set
            .chunks()
            .iter()
            .filter_map(|coord| self.cache.peek(coord))
            .collect();

        let mut terrain = TerrainMesh::with_capacity_for(meshes.iter().copied());
        for mesh in meshes {
            terrain.append(mesh);
        }
        terrain.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::engine_state::{
        compute::CpuChunkMesher,
        error::ChunkError,
        rendering::meshing::{MAX_INDICES_PER_CHUNK, MAX_VERTICES_PER_CHUNK},
        voxels::{
            chunk::CHUNK_SIZE,
            density::{ConstantField, PlaneField},
        },
    };

    /// Counts the chunks it meshes, failing the ones in `failing`.
    struct RecordingMesher {
        inner: CpuChunkMesher,
        meshed: Arc<AtomicUsize>,
        failing: Vec<ChunkCoord>,
        cancel_after: Option<(usize, CancelSource)>,
    }

    impl RecordingMesher {
        fn new(meshed: Arc<AtomicUsize>) -> Self {
            Self {
                inner: CpuChunkMesher::default(),
                meshed,
                failing: Vec::new(),
                cancel_after: None,
            }
        }
    }

    impl ChunkMesher for RecordingMesher {
        fn mesh_chunk(&mut self, coord: ChunkCoord, samples: &[f32]) -> Result<ChunkMesh, ChunkError> {
            let count = self.meshed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, source)) = &self.cancel_after {
                if count == *limit {
                    source.supersede();
                }
            }
            if self.failing.contains(&coord) {
                return Err(ChunkError::SampleCount {
                    coord,
                    expected: samples.len(),
                    actual: 0,
                });
            }
            self.inner.mesh_chunk(coord, samples)
        }

        fn backend(&self) -> &'static str {
            "recording"
        }
    }

    /// Records the loop's state each time a chunk is meshed.
    struct StateObservingMesher {
        inner: CpuChunkMesher,
        state: MtResource<StreamState>,
        seen: MtResource<Vec<StreamState>>,
    }

    impl ChunkMesher for StateObservingMesher {
        fn mesh_chunk(&mut self, coord: ChunkCoord, samples: &[f32]) -> Result<ChunkMesh, ChunkError> {
            let state = *self.state.get();
            self.seen.get_mut().push(state);
            self.inner.mesh_chunk(coord, samples)
        }

        fn backend(&self) -> &'static str {
            "observing"
        }
    }

    fn config(visibility_distance: u32) -> EngineConfig {
        EngineConfig {
            visibility_distance,
            cache_capacity: 64,
            ..EngineConfig::default()
        }
    }

    fn plane() -> Box<dyn DensityField> {
        Box::new(PlaneField { height: 10.5 })
    }

    fn assembled(outcome: PassOutcome) -> TerrainMesh {
        match outcome {
            PassOutcome::Assembled(mesh) => mesh,
            other => panic!("expected an assembled mesh, got {other:?}"),
        }
    }

    #[test]
    fn end_to_end_at_the_origin() {
        let mut streaming = StreamingLoop::new(
            &config(1),
            Box::new(CpuChunkMesher::default()),
            plane(),
        )
        .unwrap();

        let mesh = assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &CancelToken::never()));

        assert_eq!(streaming.active_chunks().len(), 18);
        for coord in streaming.active_chunks() {
            let origin = coord.origin();
            assert_eq!(origin.x % CHUNK_SIZE, 0);
            assert_eq!(origin.y % CHUNK_SIZE, 0);
            assert_eq!(origin.z % CHUNK_SIZE, 0);
        }
        assert_eq!(mesh.chunk_count, 18);
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(mesh.vertices.len() <= 18 * MAX_VERTICES_PER_CHUNK);
        assert!(mesh.indices.len() <= 18 * MAX_INDICES_PER_CHUNK);
        assert!(mesh
            .indices
            .iter()
            .all(|&index| (index as usize) < mesh.vertices.len()));

        // The plane crosses only the nine chunks of the upper layer, one
        // vertex per vertical lattice edge and two triangles per cell.
        assert_eq!(mesh.vertices.len(), 9 * 33 * 33);
        assert_eq!(mesh.indices.len(), 9 * 32 * 32 * 6);
        assert!(mesh
            .vertices
            .iter()
            .all(|vertex| (vertex.position[1] - 10.5).abs() < 1e-4));
        assert_eq!(streaming.last_stats().meshed, 18);
        assert_eq!(*streaming.state().get(), StreamState::Idle);
    }

    #[test]
    fn passes_report_each_chunk_while_computing() {
        let mut streaming = StreamingLoop::new(
            &config(1),
            Box::new(CpuChunkMesher::default()),
            plane(),
        )
        .unwrap();
        let seen = MtResource::new(Vec::new());
        streaming.mesher = Box::new(StateObservingMesher {
            inner: CpuChunkMesher::default(),
            state: streaming.state(),
            seen: seen.clone(),
        });
        let token = CancelToken::never();
        let computing = |total: usize| -> Vec<StreamState> {
            (0..total)
                .map(|chunk_index| StreamState::Computing { chunk_index, total })
                .collect()
        };

        assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &token));
        assert_eq!(*seen.get(), computing(18));
        assert_eq!(*streaming.state().get(), StreamState::Idle);

        // Only the column entering the set is counted.
        seen.get_mut().clear();
        assembled(streaming.run_pass(Point3::new(40.0, 0.0, 0.0), &token));
        assert_eq!(*seen.get(), computing(6));
        assert_eq!(*streaming.state().get(), StreamState::Idle);
    }

    #[test]
    fn unchanged_viewpoint_does_not_recompute() {
        let meshed = Arc::new(AtomicUsize::new(0));
        let mut streaming = StreamingLoop::new(
            &config(1),
            Box::new(RecordingMesher::new(meshed.clone())),
            plane(),
        )
        .unwrap();
        let token = CancelToken::never();

        assembled(streaming.run_pass(Point3::new(1.0, 2.0, 3.0), &token));
        assert_eq!(meshed.load(Ordering::SeqCst), 18);

        // Same chunk, different position.
        assert!(matches!(
            streaming.run_pass(Point3::new(30.0, 20.0, 10.0), &token),
            PassOutcome::Unchanged
        ));
        assert_eq!(meshed.load(Ordering::SeqCst), 18);
    }

    #[test]
    fn only_chunks_entering_the_set_are_meshed() {
        let meshed = Arc::new(AtomicUsize::new(0));
        let mut streaming = StreamingLoop::new(
            &config(1),
            Box::new(RecordingMesher::new(meshed.clone())),
            plane(),
        )
        .unwrap();
        let token = CancelToken::never();

        assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &token));
        let mesh = assembled(streaming.run_pass(Point3::new(40.0, 0.0, 0.0), &token));

        // One new column of 3 × 2 chunks on the +x side.
        assert_eq!(meshed.load(Ordering::SeqCst), 18 + 6);
        assert_eq!(streaming.last_stats().cache_hits, 12);
        assert_eq!(mesh.chunk_count, 18);

        // Walking back reuses the cached column.
        assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &token));
        assert_eq!(meshed.load(Ordering::SeqCst), 18 + 6);
    }

    #[test]
    fn cancelled_passes_are_superseded_and_resume() {
        let meshed = Arc::new(AtomicUsize::new(0));
        let source = CancelSource::new();
        let mut mesher = RecordingMesher::new(meshed.clone());
        mesher.cancel_after = Some((5, source.clone()));
        let mut streaming =
            StreamingLoop::new(&config(1), Box::new(mesher), plane()).unwrap();

        let token = source.token();
        assert!(matches!(
            streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &token),
            PassOutcome::Superseded
        ));
        assert_eq!(meshed.load(Ordering::SeqCst), 5);
        assert_eq!(*streaming.state().get(), StreamState::Idle);

        // The same viewpoint runs again and only meshes what is still missing.
        let mesh = assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &source.token()));
        assert_eq!(meshed.load(Ordering::SeqCst), 18);
        assert_eq!(mesh.chunk_count, 18);
    }

    #[test]
    fn failed_chunks_are_skipped_and_keep_their_previous_mesh() {
        let meshed = Arc::new(AtomicUsize::new(0));
        let broken = ChunkCoord::from_grid(0, 0, 0);
        let mut mesher = RecordingMesher::new(meshed.clone());
        mesher.failing.push(broken);
        let mut streaming =
            StreamingLoop::new(&config(1), Box::new(mesher), plane()).unwrap();
        let token = CancelToken::never();

        let mesh = assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &token));
        assert_eq!(mesh.chunk_count, 17);
        assert_eq!(streaming.last_stats().failed, 1);
        assert!(!streaming.cache().contains(&broken));
        assert_eq!(mesh.vertices.len(), 8 * 33 * 33);
    }

    #[test]
    fn rebuild_failures_keep_the_cached_mesh() {
        let meshed = Arc::new(AtomicUsize::new(0));
        let source = CancelSource::new();
        let mut streaming = StreamingLoop::new(
            &config(1),
            Box::new(RecordingMesher::new(meshed.clone())),
            plane(),
        )
        .unwrap();

        let before = assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &source.token()));

        // Swap in a mesher that fails everything, then rebuild.
        let mut failing = RecordingMesher::new(meshed.clone());
        failing.failing = streaming.active_chunks().to_vec();
        streaming.mesher = Box::new(failing);
        streaming.request_rebuild();

        let after = assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &source.token()));
        assert_eq!(meshed.load(Ordering::SeqCst), 36);
        assert_eq!(streaming.last_stats().failed, 18);
        assert_eq!(after, before);

        // The rebuild is still owed once meshing works again.
        streaming.mesher = Box::new(RecordingMesher::new(meshed.clone()));
        let retried = assembled(streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &source.token()));
        assert_eq!(meshed.load(Ordering::SeqCst), 54);
        assert_eq!(streaming.last_stats().meshed, 18);
        assert_eq!(streaming.last_stats().failed, 0);
        assert_eq!(retried, before);

        // Nothing is owed after that.
        assert!(matches!(
            streaming.run_pass(Point3::new(0.0, 0.0, 0.0), &source.token()),
            PassOutcome::Unchanged
        ));
    }

    #[test]
    fn empty_world_assembles_an_empty_mesh() {
        let mut streaming = StreamingLoop::new(
            &config(0),
            Box::new(CpuChunkMesher::default()),
            Box::new(ConstantField(-1.0)),
        )
        .unwrap();
        let mesh = assembled(streaming.run_pass(Point3::new(5.0, 5.0, 5.0), &CancelToken::never()));
        assert!(mesh.is_empty());
        assert!(mesh.vertices.is_empty());
        assert_eq!(mesh.chunk_count, 1);
    }

    #[test]
    fn cache_smaller_than_the_active_set_is_rejected() {
        let config = EngineConfig {
            visibility_distance: 2,
            cache_capacity: 10,
            ..EngineConfig::default()
        };
        assert!(matches!(
            StreamingLoop::new(&config, Box::new(CpuChunkMesher::default()), plane()),
            Err(StartupError::ConfigValue(_))
        ));
    }
}
