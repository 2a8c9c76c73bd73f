//! Reading a chunk's output back to the host.
//!
//! The dispatch encoder already copies the counter block to its staging
//! buffer. Readback maps that first, then copies and maps only the used
//! prefix of the vertex and index outputs, so the cost of a chunk scales with
//! its surface rather than with the worst-case buffer size.

use std::sync::mpsc;

use wgpu::{Buffer, BufferAsyncError, CommandEncoder, SubmissionIndex};

use crate::engine_state::{
    buffer_state::BufferState,
    error::{BufferError, ChunkError},
    rendering::{
        meshing::{check_counts, ChunkMesh},
        Vertex,
    },
    voxels::chunk::ChunkCoord,
};

use super::{
    storage::{
        ChunkStorage, COUNTER_BUFFER_NAME, COUNTER_SIZE, COUNTER_STAGING_BUFFER_NAME,
        INDEX_STAGING_BUFFER_NAME, INDEX_STORAGE_BUFFER_NAME, VERTEX_STAGING_BUFFER_NAME,
        VERTEX_STORAGE_BUFFER_NAME,
    },
    DeviceContext,
};

/// One buffer-to-buffer copy, from offset 0 to offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub source: &'static str,
    pub destination: &'static str,
    pub size: u64,
}

/// An ordered list of copies recorded into one encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyPlan {
    steps: Vec<BufferCopy>,
}

impl CopyPlan {
    /// Copies the counter block to its staging buffer.
    pub fn counters() -> Self {
        Self {
            steps: vec![BufferCopy {
                source: COUNTER_BUFFER_NAME,
                destination: COUNTER_STAGING_BUFFER_NAME,
                size: COUNTER_SIZE,
            }],
        }
    }

    /// Copies the used prefix of the vertex and index outputs to staging.
    /// Empty outputs get no step.
    pub fn for_chunk(vertex_count: u32, index_count: u32) -> Self {
        let mut steps = Vec::with_capacity(2);
        if vertex_count > 0 {
            steps.push(BufferCopy {
                source: VERTEX_STORAGE_BUFFER_NAME,
                destination: VERTEX_STAGING_BUFFER_NAME,
                size: vertex_count as u64 * Vertex::SIZE,
            });
        }
        if index_count > 0 {
            steps.push(BufferCopy {
                source: INDEX_STORAGE_BUFFER_NAME,
                destination: INDEX_STAGING_BUFFER_NAME,
                size: index_count as u64 * std::mem::size_of::<u32>() as u64,
            });
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[BufferCopy] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks every step against the buffer sizes reported by `capacity`.
    ///
    /// # Errors
    /// - `AliasedCopy` if a step reads and writes the same buffer
    /// - `CopyOutOfBounds` if a step is larger than its source or destination
    /// - `Buffer(Unknown)` if `capacity` does not know a buffer
    pub fn validate(&self, capacity: impl Fn(&str) -> Option<u64>) -> Result<(), ChunkError> {
        for step in &self.steps {
            if step.source == step.destination {
                return Err(ChunkError::AliasedCopy(step.source));
            }
            let source = capacity(step.source).ok_or(BufferError::Unknown(step.source))?;
            let destination =
                capacity(step.destination).ok_or(BufferError::Unknown(step.destination))?;
            if step.size > source || step.size > destination {
                return Err(ChunkError::CopyOutOfBounds {
                    from: step.source,
                    to: step.destination,
                    size: step.size,
                });
            }
        }
        Ok(())
    }

    /// Validates the plan against `buffers` and records it into `encoder`.
    pub fn record(&self, encoder: &mut CommandEncoder, buffers: &BufferState) -> Result<(), ChunkError> {
        self.validate(|name| buffers.get_buffer_size(name))?;
        for step in &self.steps {
            encoder.copy_buffer_to_buffer(
                buffers.get_buffer(step.source)?,
                0,
                buffers.get_buffer(step.destination)?,
                0,
                step.size,
            );
        }
        Ok(())
    }
}

type MapReceiver = mpsc::Receiver<Result<(), BufferAsyncError>>;

/// A staging buffer with a read mapping requested on its first `size` bytes.
///
/// Dropping the guard unmaps the buffer unless the mapping failed, so no
/// staging buffer is still mapped, or waiting to be, once a readback returns.
struct StagingMap<'a> {
    buffer: &'a Buffer,
    name: &'static str,
    size: u64,
    receiver: MapReceiver,
    mapped: bool,
}

impl<'a> StagingMap<'a> {
    fn request(buffer: &'a Buffer, name: &'static str, size: u64) -> Self {
        let (sender, receiver) = mpsc::channel();
        buffer
            .slice(..size)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        Self {
            buffer,
            name,
            size,
            receiver,
            mapped: true,
        }
    }

    /// Copies the mapped prefix out. Call once the submission writing the
    /// buffer has been waited on.
    fn take<T: bytemuck::Pod>(mut self) -> Result<Vec<T>, ChunkError> {
        match self.receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                self.mapped = false;
                return Err(ChunkError::Map {
                    buffer: self.name,
                    source,
                });
            }
            Err(_) => return Err(ChunkError::MapAbandoned { buffer: self.name }),
        }

        let view = self.buffer.slice(..self.size).get_mapped_range();
        let data = bytemuck::cast_slice::<u8, T>(&view).to_vec();
        drop(view);
        Ok(data)
    }
}

impl Drop for StagingMap<'_> {
    fn drop(&mut self) {
        if self.mapped {
            self.buffer.unmap();
        }
    }
}

/// Blocks until one submission has completed, and no longer.
pub fn wait_for(context: &DeviceContext, submission: SubmissionIndex) -> Result<(), ChunkError> {
    context
        .device
        .poll(wgpu::PollType::WaitForSubmissionIndex(submission))?;
    Ok(())
}

/// Reads the output of the dispatch `submission` for `coord`.
///
/// Every staging buffer is unmapped again before this returns, on success and
/// on every error.
///
/// # Errors
/// - `Poll`, `Map`, `MapAbandoned` if waiting or mapping fails
/// - `CapacityExceeded`, `PartialTriangle` for counts the buffers cannot hold
/// - `IndexOutOfRange` if an index names a vertex the chunk did not produce
pub fn read_chunk(
    context: &DeviceContext,
    storage: &ChunkStorage,
    coord: ChunkCoord,
    submission: SubmissionIndex,
) -> Result<ChunkMesh, ChunkError> {
    let buffers = storage.buffers();

    let counter_map = StagingMap::request(
        buffers.get_buffer(COUNTER_STAGING_BUFFER_NAME)?,
        COUNTER_STAGING_BUFFER_NAME,
        COUNTER_SIZE,
    );
    wait_for(context, submission)?;
    let counts: Vec<u32> = counter_map.take()?;
    let &[vertex_count, index_count] = counts.as_slice() else {
        return Err(ChunkError::MapAbandoned {
            buffer: COUNTER_STAGING_BUFFER_NAME,
        });
    };

    check_counts(coord, vertex_count, index_count)?;

    let plan = CopyPlan::for_chunk(vertex_count, index_count);
    if plan.is_empty() {
        return Ok(ChunkMesh::empty(coord));
    }

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Chunk Readback Encoder"),
        });
    plan.record(&mut encoder, buffers)?;
    let copy_submission = context.queue.submit([encoder.finish()]);

    let pending: Vec<StagingMap<'_>> = plan
        .steps()
        .iter()
        .map(|step| -> Result<_, BufferError> {
            let staging = buffers.get_buffer(step.destination)?;
            Ok(StagingMap::request(staging, step.destination, step.size))
        })
        .collect::<Result<_, BufferError>>()?;

    wait_for(context, copy_submission)?;

    let mut mesh = ChunkMesh::empty(coord);
    for map in pending {
        match map.name {
            VERTEX_STAGING_BUFFER_NAME => mesh.vertices = map.take()?,
            _ => mesh.indices = map.take()?,
        }
    }

    mesh.validate()?;
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        compute::storage::{INDEX_STORAGE_SIZE, VERTEX_STORAGE_SIZE},
        rendering::meshing::{MAX_INDICES_PER_CHUNK, MAX_VERTICES_PER_CHUNK},
        voxels::lookup_table::TriangleTable,
    };

    fn chunk_capacity(name: &str) -> Option<u64> {
        match name {
            VERTEX_STORAGE_BUFFER_NAME | VERTEX_STAGING_BUFFER_NAME => Some(VERTEX_STORAGE_SIZE),
            INDEX_STORAGE_BUFFER_NAME | INDEX_STAGING_BUFFER_NAME => Some(INDEX_STORAGE_SIZE),
            COUNTER_BUFFER_NAME | COUNTER_STAGING_BUFFER_NAME => Some(COUNTER_SIZE),
            _ => None,
        }
    }

    #[test]
    fn chunk_plans_never_alias_and_fit_at_capacity() {
        let plans = [
            CopyPlan::counters(),
            CopyPlan::for_chunk(1, 3),
            CopyPlan::for_chunk(MAX_VERTICES_PER_CHUNK as u32, MAX_INDICES_PER_CHUNK as u32),
        ];
        for plan in &plans {
            assert!(plan
                .steps()
                .iter()
                .all(|step| step.source != step.destination));
            plan.validate(chunk_capacity).unwrap();
        }
    }

    #[test]
    fn empty_outputs_copy_nothing() {
        assert!(CopyPlan::for_chunk(0, 0).is_empty());
        assert_eq!(CopyPlan::for_chunk(4, 0).steps().len(), 1);
        assert_eq!(
            CopyPlan::for_chunk(0, 6).steps()[0].size,
            6 * std::mem::size_of::<u32>() as u64
        );
    }

    #[test]
    fn dropped_staging_maps_leave_buffers_copyable() {
        let context = match pollster::block_on(DeviceContext::headless()) {
            Ok(context) => context,
            Err(error) => {
                eprintln!("skipping GPU test: {error}");
                return;
            }
        };
        let storage = ChunkStorage::new(context.clone(), &TriangleTable::marching_cubes());
        let staging = storage.buffers().get_buffer(INDEX_STAGING_BUFFER_NAME).unwrap();

        // Mapped but never read, as when the other staging buffer fails first.
        let idle = context.queue.submit(std::iter::empty());
        let unread = StagingMap::request(staging, INDEX_STAGING_BUFFER_NAME, 12);
        wait_for(&context, idle).unwrap();
        drop(unread);

        // Still pending, as when waiting on the copy fails.
        drop(StagingMap::request(staging, INDEX_STAGING_BUFFER_NAME, 12));

        context.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        CopyPlan::for_chunk(0, 3)
            .record(&mut encoder, storage.buffers())
            .unwrap();
        let copy = context.queue.submit([encoder.finish()]);
        wait_for(&context, copy).unwrap();
        assert!(pollster::block_on(context.device.pop_error_scope()).is_none());
    }

    #[test]
    fn aliased_and_oversized_steps_are_rejected() {
        let aliased = CopyPlan {
            steps: vec![BufferCopy {
                source: VERTEX_STORAGE_BUFFER_NAME,
                destination: VERTEX_STORAGE_BUFFER_NAME,
                size: 24,
            }],
        };
        assert!(matches!(
            aliased.validate(chunk_capacity),
            Err(ChunkError::AliasedCopy(VERTEX_STORAGE_BUFFER_NAME))
        ));

        let oversized = CopyPlan::for_chunk(MAX_VERTICES_PER_CHUNK as u32 + 1, 0);
        assert!(matches!(
            oversized.validate(chunk_capacity),
            Err(ChunkError::CopyOutOfBounds { .. })
        ));

        let unknown = CopyPlan {
            steps: vec![BufferCopy {
                source: "missing",
                destination: INDEX_STAGING_BUFFER_NAME,
                size: 4,
            }],
        };
        assert!(matches!(
            unknown.validate(chunk_capacity),
            Err(ChunkError::Buffer(BufferError::Unknown("missing")))
        ));
    }
}
