//! # Streaming Task
//!
//! Runs one streaming pass on a worker thread. The loop and its mesher are
//! shared through an `MtResource`, so passes never overlap: a newer task waits
//! for the lock while the older pass notices its token was cancelled and
//! returns early.

use cgmath::Point3;

use crate::{
    core::MtResource,
    engine_state::{
        rendering::meshing::TerrainMesh,
        task_management::task::{Task, TaskResult},
    },
};

use super::super::{CancelToken, PassOutcome, StreamState, StreamingLoop};

/// Main-thread owner of the presented terrain.
pub trait TerrainSink {
    /// Replaces the presented terrain with `mesh`.
    fn replace_terrain_mesh(&mut self, mesh: &TerrainMesh);
}

/// A streaming pass for one viewpoint.
pub struct StreamingTask {
    streaming: MtResource<StreamingLoop>,
    viewpoint: Point3<f32>,
    token: CancelToken,
}

impl StreamingTask {
    pub fn new(
        streaming: MtResource<StreamingLoop>,
        viewpoint: Point3<f32>,
        token: CancelToken,
    ) -> Self {
        Self {
            streaming,
            viewpoint,
            token,
        }
    }
}

impl<C: TerrainSink + 'static> Task<C> for StreamingTask {
    fn process(&self) -> Box<dyn TaskResult<C> + Send> {
        let state = self.streaming.get().state();

        // Superseded while still queued.
        let outcome = if self.token.is_cancelled() {
            PassOutcome::Superseded
        } else {
            self.streaming.get_mut().run_pass(self.viewpoint, &self.token)
        };

        Box::new(StreamingResult {
            outcome,
            token: self.token.clone(),
            state,
        })
    }
}

/// The outcome of a pass, delivered to the main thread.
pub struct StreamingResult {
    outcome: PassOutcome,
    token: CancelToken,
    state: MtResource<StreamState>,
}

impl<C: TerrainSink + 'static> TaskResult<C> for StreamingResult {
    /// Uploads an assembled mesh unless a newer pass has been requested since.
    fn handle_result(self: Box<Self>, context: &mut C) -> Vec<Box<dyn Task<C> + Send>> {
        match self.outcome {
            PassOutcome::Assembled(mesh) if !self.token.is_cancelled() => {
                *self.state.get_mut() = StreamState::Uploading;
                context.replace_terrain_mesh(&mesh);
                *self.state.get_mut() = StreamState::Idle;
            }
            PassOutcome::Assembled(_) => {
                log::debug!(
                    "Dropping terrain mesh of stale generation {}",
                    self.token.generation()
                );
            }
            PassOutcome::Superseded => {
                log::debug!("Streaming generation {} superseded", self.token.generation());
            }
            PassOutcome::Unchanged => {}
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::engine_state::{
        compute::CpuChunkMesher,
        config::EngineConfig,
        streaming::CancelSource,
        task_management::TaskManager,
        voxels::density::PlaneField,
    };

    #[derive(Default)]
    struct RecordingSink {
        uploads: Vec<usize>,
    }

    impl TerrainSink for RecordingSink {
        fn replace_terrain_mesh(&mut self, mesh: &TerrainMesh) {
            self.uploads.push(mesh.vertices.len());
        }
    }

    /// Records the loop's state each time the terrain is replaced.
    struct StateObservingSink {
        state: MtResource<StreamState>,
        seen: Vec<StreamState>,
    }

    impl TerrainSink for StateObservingSink {
        fn replace_terrain_mesh(&mut self, _mesh: &TerrainMesh) {
            self.seen.push(*self.state.get());
        }
    }

    fn streaming_loop() -> MtResource<StreamingLoop> {
        let config = EngineConfig {
            visibility_distance: 1,
            cache_capacity: 64,
            ..EngineConfig::default()
        };
        MtResource::new(
            StreamingLoop::new(
                &config,
                Box::new(CpuChunkMesher::default()),
                Box::new(PlaneField { height: 10.5 }),
            )
            .unwrap(),
        )
    }

    fn drain<C: TerrainSink + 'static>(manager: &mut TaskManager<C>, sink: &mut C) {
        let deadline = Instant::now() + Duration::from_secs(60);
        while manager.pending_tasks() > 0 {
            assert!(Instant::now() < deadline, "streaming did not finish");
            manager.process_completed_tasks(sink);
            manager.process_queued_tasks();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn worker_passes_upload_on_the_main_thread() {
        let streaming = streaming_loop();
        let source = CancelSource::new();
        let mut manager: TaskManager<RecordingSink> = TaskManager::new(1);
        let mut sink = RecordingSink::default();

        manager.publish_task(Box::new(StreamingTask::new(
            streaming.clone(),
            Point3::new(0.0, 0.0, 0.0),
            source.supersede(),
        )));
        drain(&mut manager, &mut sink);

        assert_eq!(sink.uploads, vec![9 * 33 * 33]);
        assert_eq!(*streaming.get().state().get(), StreamState::Idle);
    }

    #[test]
    fn uploads_happen_in_the_uploading_state() {
        let streaming = streaming_loop();
        let source = CancelSource::new();
        let mut manager: TaskManager<StateObservingSink> = TaskManager::new(1);
        let mut sink = StateObservingSink {
            state: streaming.get().state(),
            seen: Vec::new(),
        };

        manager.publish_task(Box::new(StreamingTask::new(
            streaming.clone(),
            Point3::new(0.0, 0.0, 0.0),
            source.supersede(),
        )));
        drain(&mut manager, &mut sink);

        assert_eq!(sink.seen, vec![StreamState::Uploading]);
        assert_eq!(*sink.state.get(), StreamState::Idle);
    }

    #[test]
    fn superseded_requests_never_upload() {
        let streaming = streaming_loop();
        let source = CancelSource::new();
        let mut manager: TaskManager<RecordingSink> = TaskManager::new(1);
        let mut sink = RecordingSink::default();

        let stale = source.supersede();
        let current = source.supersede();
        manager.publish_task(Box::new(StreamingTask::new(
            streaming.clone(),
            Point3::new(0.0, 0.0, 0.0),
            stale,
        )));
        manager.publish_task(Box::new(StreamingTask::new(
            streaming.clone(),
            Point3::new(40.0, 0.0, 0.0),
            current,
        )));
        drain(&mut manager, &mut sink);

        assert_eq!(sink.uploads.len(), 1);
        assert_eq!(
            streaming.get().active_chunks()[0],
            crate::engine_state::voxels::chunk::ChunkCoord::from_grid(0, -1, -1)
        );
    }

    #[test]
    fn results_finishing_after_a_new_request_are_dropped() {
        let source = CancelSource::new();
        let token = source.supersede();
        let result = StreamingResult {
            outcome: PassOutcome::Assembled(TerrainMesh::default()),
            token,
            state: MtResource::new(StreamState::Assembling),
        };
        source.supersede();

        let mut sink = RecordingSink::default();
        let follow_ups = TaskResult::<RecordingSink>::handle_result(Box::new(result), &mut sink);
        assert!(follow_ups.is_empty());
        assert!(sink.uploads.is_empty());
    }
}
