//! Compute pipelines and per-chunk dispatch.

use wgpu::{BindGroup, ComputePipeline, SubmissionIndex};

use crate::engine_state::{
    error::{ChunkError, StartupError},
    voxels::chunk::{ChunkCoord, CHUNK_SAMPLES, CHUNK_SIZE},
};

use super::{
    readback::CopyPlan,
    storage::{
        ChunkStorage, CHUNK_UNIFORM_BUFFER_NAME, COUNTER_BUFFER_NAME, DENSITY_BUFFER_NAME,
        INDEX_STORAGE_BUFFER_NAME, SCRATCH_BUFFER_NAME, TRIANGLE_TABLE_BUFFER_NAME,
        VERTEX_STORAGE_BUFFER_NAME,
    },
    DeviceContext,
};

/// Threads per workgroup of the row stages.
const ROW_WORKGROUP_SIZE: u32 = 64;
/// Threads per workgroup axis of the cell stage.
const CELL_WORKGROUP_SIZE: u32 = 4;

const CORNER_ROWS: u32 = (CHUNK_SAMPLES * CHUNK_SAMPLES) as u32;
const CELL_ROWS: u32 = (CHUNK_SIZE * CHUNK_SIZE) as u32;

/// One compute stage: its entry point and workgroup count.
struct Stage {
    entry_point: &'static str,
    workgroups: [u32; 3],
}

/// Stages in dispatch order.
const STAGES: [Stage; 5] = [
    Stage {
        entry_point: "classify_cells",
        workgroups: [
            CHUNK_SIZE as u32 / CELL_WORKGROUP_SIZE,
            CHUNK_SIZE as u32 / CELL_WORKGROUP_SIZE,
            CHUNK_SIZE as u32 / CELL_WORKGROUP_SIZE,
        ],
    },
    Stage {
        entry_point: "count_rows",
        workgroups: [CORNER_ROWS.div_ceil(ROW_WORKGROUP_SIZE), 1, 1],
    },
    Stage {
        entry_point: "scan_rows",
        workgroups: [1, 1, 1],
    },
    Stage {
        entry_point: "emit_vertices",
        workgroups: [CORNER_ROWS.div_ceil(ROW_WORKGROUP_SIZE), 1, 1],
    },
    Stage {
        entry_point: "emit_triangles",
        workgroups: [CELL_ROWS.div_ceil(ROW_WORKGROUP_SIZE), 1, 1],
    },
];

/// Bindings of the mesh shader, in binding order.
const BINDINGS: [(&str, wgpu::BufferBindingType); 7] = [
    (CHUNK_UNIFORM_BUFFER_NAME, wgpu::BufferBindingType::Uniform),
    (
        VERTEX_STORAGE_BUFFER_NAME,
        wgpu::BufferBindingType::Storage { read_only: false },
    ),
    (
        INDEX_STORAGE_BUFFER_NAME,
        wgpu::BufferBindingType::Storage { read_only: false },
    ),
    (
        TRIANGLE_TABLE_BUFFER_NAME,
        wgpu::BufferBindingType::Storage { read_only: true },
    ),
    (
        DENSITY_BUFFER_NAME,
        wgpu::BufferBindingType::Storage { read_only: true },
    ),
    (
        COUNTER_BUFFER_NAME,
        wgpu::BufferBindingType::Storage { read_only: false },
    ),
    (
        SCRATCH_BUFFER_NAME,
        wgpu::BufferBindingType::Storage { read_only: false },
    ),
];

/// Records and submits the mesh stages for one chunk at a time.
pub struct ComputeDispatcher {
    context: DeviceContext,
    pipelines: Vec<(ComputePipeline, [u32; 3])>,
    bind_group: BindGroup,
}

impl ComputeDispatcher {
    /// Compiles the mesh shader and binds it to `storage`.
    ///
    /// # Errors
    /// `Validation` if the device rejects the shader, the layout or a pipeline.
    pub fn new(
        context: DeviceContext,
        shader_source: &str,
        storage: &ChunkStorage,
    ) -> Result<Self, StartupError> {
        let device = &context.device;
        let buffers = storage.buffers();

        let group_entries = BINDINGS
            .iter()
            .enumerate()
            .map(|(binding, (name, _))| -> Result<wgpu::BindGroupEntry<'_>, StartupError> {
                Ok(wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffers.get_entire_binding(*name)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Build Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = BINDINGS
            .iter()
            .enumerate()
            .map(|(binding, (_, ty))| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: *ty,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Build Mesh Bind Group Layout"),
            entries: &layout_entries,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Build Mesh Bind Group"),
            layout: &bind_group_layout,
            entries: &group_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Build Mesh Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = STAGES
            .iter()
            .map(|stage| {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(stage.entry_point),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(stage.entry_point),
                    compilation_options: Default::default(),
                    cache: None,
                });
                (pipeline, stage.workgroups)
            })
            .collect();

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(StartupError::Validation {
                stage: "compute pipeline",
                message: error.to_string(),
            });
        }

        log::info!("Built {} mesh compute stages", STAGES.len());

        Ok(Self {
            context,
            pipelines,
            bind_group,
        })
    }

    /// Uploads a chunk's inputs and submits its mesh stages together with the
    /// counter readback copy.
    ///
    /// The returned index identifies that submission; callers wait on it
    /// before reading back or writing the next chunk's inputs.
    pub fn dispatch(
        &self,
        storage: &mut ChunkStorage,
        coord: ChunkCoord,
        samples: &[f32],
    ) -> Result<SubmissionIndex, ChunkError> {
        storage.write_inputs(coord.to_uniform(), samples)?;

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Build Mesh Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Build Mesh Pass"),
                timestamp_writes: None,
            });
            pass.set_bind_group(0, &self.bind_group, &[]);
            for (pipeline, [x, y, z]) in &self.pipelines {
                pass.set_pipeline(pipeline);
                pass.dispatch_workgroups(*x, *y, *z);
            }
        }
        CopyPlan::counters().record(&mut encoder, storage.buffers())?;

        Ok(self.context.queue.submit([encoder.finish()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_cover_every_cell_and_row() {
        let [x, y, z] = STAGES[0].workgroups;
        assert_eq!(
            (x * y * z) * CELL_WORKGROUP_SIZE.pow(3),
            (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as u32
        );
        assert!(STAGES[1].workgroups[0] * ROW_WORKGROUP_SIZE >= CORNER_ROWS);
        assert!(STAGES[3].workgroups[0] * ROW_WORKGROUP_SIZE >= CORNER_ROWS);
        assert!(STAGES[4].workgroups[0] * ROW_WORKGROUP_SIZE >= CELL_ROWS);
    }

    #[test]
    fn shader_declares_every_stage_and_binding() {
        let source = include_str!("../../../assets/shaders/build_mesh.wgsl");
        for stage in &STAGES {
            assert!(source.contains(&format!("fn {}(", stage.entry_point)));
        }
        for binding in 0..BINDINGS.len() {
            assert!(source.contains(&format!("@binding({binding})")));
        }
    }
}
