//! # Compute Stage
//!
//! Turns one chunk's density samples into a `ChunkMesh`.
//!
//! ## Components
//! - `DeviceContext`: the device and queue, cloned into every GPU-side part
//! - `ChunkStorage`: the worst-case sized buffers shared by all chunks
//! - `ComputeDispatcher`: the mesh pipelines and the per-chunk submission
//! - `readback`: the copy plan and the mapped reads of a finished chunk
//! - `ChunkMesher`: the seam the streaming loop meshes through, with a GPU
//!   and a host implementation
//!
//! Chunks are processed strictly one after another. A chunk's inputs are only
//! written once the previous chunk's submissions have been waited on, so the
//! shared buffers never need more than one copy.

mod cpu_mesher;
mod dispatch;
mod readback;
mod storage;

pub use cpu_mesher::CpuChunkMesher;
pub use dispatch::ComputeDispatcher;
pub use readback::read_chunk;
pub use storage::ChunkStorage;

use crate::engine_state::{
    error::{ChunkError, StartupError},
    rendering::meshing::ChunkMesh,
    voxels::{
        chunk::{ChunkCoord, SAMPLES_PER_CHUNK},
        lookup_table::TriangleTable,
    },
};

/// The device and queue every GPU-side component is built from.
///
/// Both handles are reference counted, so cloning is cheap and clones may be
/// moved to worker threads.
#[derive(Clone, Debug)]
pub struct DeviceContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl DeviceContext {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Limits the mesh stages need on top of the defaults.
    pub fn required_limits() -> wgpu::Limits {
        let mut limits = wgpu::Limits::default();
        // Six storage bindings in the mesh shader.
        limits.max_storage_buffers_per_shader_stage =
            limits.max_storage_buffers_per_shader_stage.max(6);
        limits
    }

    /// Opens a device on an adapter with the limits the engine needs.
    pub async fn from_adapter(adapter: &wgpu::Adapter) -> Result<Self, StartupError> {
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Voxel Terrain Device"),
                required_features: wgpu::Features::empty(),
                required_limits: Self::required_limits(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self::new(device, queue))
    }

    /// Opens a device without a window, for tools and tests.
    pub async fn headless() -> Result<Self, StartupError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        log::info!("Headless adapter: {:?}", adapter.get_info().name);
        Self::from_adapter(&adapter).await
    }
}

/// Meshes one chunk at a time.
///
/// Implementations must produce the same vertices and indices, in the same
/// order, for the same samples, every time they are called.
pub trait ChunkMesher: Send + Sync {
    /// Meshes the chunk at `coord` from its `SAMPLES_PER_CHUNK` densities.
    fn mesh_chunk(&mut self, coord: ChunkCoord, samples: &[f32]) -> Result<ChunkMesh, ChunkError>;

    /// Short name for logs.
    fn backend(&self) -> &'static str;
}

fn check_sample_count(coord: ChunkCoord, samples: &[f32]) -> Result<(), ChunkError> {
    if samples.len() != SAMPLES_PER_CHUNK {
        return Err(ChunkError::SampleCount {
            coord,
            expected: SAMPLES_PER_CHUNK,
            actual: samples.len(),
        });
    }
    Ok(())
}

/// Meshes chunks with the compute shader.
pub struct GpuChunkMesher {
    context: DeviceContext,
    storage: ChunkStorage,
    dispatcher: ComputeDispatcher,
}

impl GpuChunkMesher {
    /// Allocates chunk storage and builds the mesh pipelines.
    ///
    /// # Errors
    /// `Validation` if the shader or pipelines are rejected by the device.
    pub fn new(
        context: DeviceContext,
        shader_source: &str,
        table: &TriangleTable,
    ) -> Result<Self, StartupError> {
        let storage = ChunkStorage::new(context.clone(), table);
        let dispatcher = ComputeDispatcher::new(context.clone(), shader_source, &storage)?;
        Ok(Self {
            context,
            storage,
            dispatcher,
        })
    }
}

impl ChunkMesher for GpuChunkMesher {
    fn mesh_chunk(&mut self, coord: ChunkCoord, samples: &[f32]) -> Result<ChunkMesh, ChunkError> {
        check_sample_count(coord, samples)?;
        let submission = self.dispatcher.dispatch(&mut self.storage, coord, samples)?;
        read_chunk(&self.context, &self.storage, coord, submission)
    }

    fn backend(&self) -> &'static str {
        "gpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        rendering::meshing::MAX_VERTICES_PER_CHUNK,
        voxels::{
            chunk::CHUNK_SAMPLES,
            density::{sample_chunk, ConstantField, SphereField},
        },
    };

    /// Opens a device, or skips the test on machines without one.
    fn gpu_mesher() -> Option<(GpuChunkMesher, CpuChunkMesher)> {
        let context = match pollster::block_on(DeviceContext::headless()) {
            Ok(context) => context,
            Err(error) => {
                eprintln!("skipping GPU test: {error}");
                return None;
            }
        };
        let table = TriangleTable::marching_cubes();
        let shader = include_str!("../../../assets/shaders/build_mesh.wgsl");
        let gpu = GpuChunkMesher::new(context, shader, &table).unwrap();
        Some((gpu, CpuChunkMesher::new(table)))
    }

    #[test]
    fn gpu_matches_the_host_mesher() {
        let Some((mut gpu, mut cpu)) = gpu_mesher() else {
            return;
        };
        let coord = ChunkCoord::from_grid(0, 0, 0);
        let field = SphereField {
            center: [14.0, 17.0, 15.5],
            radius: 10.25,
        };
        let samples = sample_chunk(&field, coord);

        let first = gpu.mesh_chunk(coord, &samples).unwrap();
        let second = gpu.mesh_chunk(coord, &samples).unwrap();
        let reference = cpu.mesh_chunk(coord, &samples).unwrap();

        assert_eq!(
            bytemuck::cast_slice::<_, u8>(&first.vertices),
            bytemuck::cast_slice::<_, u8>(&second.vertices)
        );
        assert_eq!(first.indices, second.indices);

        assert_eq!(first.vertices.len(), reference.vertices.len());
        assert_eq!(first.indices, reference.indices);
        for (gpu_vertex, cpu_vertex) in first.vertices.iter().zip(&reference.vertices) {
            for axis in 0..3 {
                assert!((gpu_vertex.position[axis] - cpu_vertex.position[axis]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn gpu_uniform_chunk_is_empty() {
        let Some((mut gpu, _)) = gpu_mesher() else {
            return;
        };
        let coord = ChunkCoord::from_grid(2, -1, 0);
        let mesh = gpu
            .mesh_chunk(coord, &sample_chunk(&ConstantField(1.0), coord))
            .unwrap();
        assert!(mesh.vertices.is_empty());
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn gpu_checkerboard_fills_vertex_capacity() {
        let Some((mut gpu, mut cpu)) = gpu_mesher() else {
            return;
        };
        let coord = ChunkCoord::from_grid(0, 0, 0);
        let samples: Vec<f32> = (0..SAMPLES_PER_CHUNK)
            .map(|index| {
                let x = index % CHUNK_SAMPLES;
                let y = (index / CHUNK_SAMPLES) % CHUNK_SAMPLES;
                let z = index / (CHUNK_SAMPLES * CHUNK_SAMPLES);
                if (x + y + z) % 2 == 0 { 1.0 } else { -1.0 }
            })
            .collect();

        let mesh = gpu.mesh_chunk(coord, &samples).unwrap();
        let reference = cpu.mesh_chunk(coord, &samples).unwrap();
        assert_eq!(mesh.vertices.len(), MAX_VERTICES_PER_CHUNK);
        assert_eq!(mesh.indices, reference.indices);
    }

    #[test]
    fn short_sample_grids_are_rejected_before_dispatch() {
        let coord = ChunkCoord::from_grid(0, 0, 0);
        assert!(matches!(
            check_sample_count(coord, &[1.0; 27]),
            Err(ChunkError::SampleCount { expected: SAMPLES_PER_CHUNK, actual: 27, .. })
        ));
        assert!(check_sample_count(coord, &vec![0.0; SAMPLES_PER_CHUNK]).is_ok());
    }
}
