//! Manages WebGPU bind groups and their layouts.
//!
//! Bind groups and layouts are registered under static names so that
//! renderers can look up the ones they were built against.

use std::collections::HashMap;

use wgpu::{BindGroup, BindGroupLayout, Device};

use crate::engine_state::{
    buffer_state::BufferState, camera_state::CAMERA_BUFFER_NAME, error::BufferError,
};

/// Camera uniform bind group, group 0 of the terrain pipeline
pub const CAMERA_BIND_GROUP: &str = "camera_bind_group";
pub const CAMERA_BIND_GROUP_LAYOUT: &str = "camera_bind_group_layout";

/// Named bind groups and layouts of the render side.
pub struct BindGroupState {
    bind_groups: HashMap<&'static str, wgpu::BindGroup>,
    bind_group_layouts: HashMap<&'static str, wgpu::BindGroupLayout>,
}

impl BindGroupState {
    /// Creates the render bind groups.
    ///
    /// # Errors
    /// `Unknown` if a buffer they bind has not been created yet.
    pub fn new(device: &Device, buffer_state: &BufferState) -> Result<Self, BufferError> {
        let mut bind_groups = HashMap::new();
        let mut bind_group_layouts = HashMap::new();

        let (camera_bind_group, camera_bind_group_layout) =
            Self::generate_camera_bindgroups(device, buffer_state)?;

        bind_groups.insert(CAMERA_BIND_GROUP, camera_bind_group);
        bind_group_layouts.insert(CAMERA_BIND_GROUP_LAYOUT, camera_bind_group_layout);

        Ok(Self {
            bind_groups,
            bind_group_layouts,
        })
    }

    pub fn get_bind_group(&self, name: &str) -> Option<&wgpu::BindGroup> {
        self.bind_groups.get(name)
    }

    pub fn get_bind_group_layout(&self, name: &str) -> Option<&wgpu::BindGroupLayout> {
        self.bind_group_layouts.get(name)
    }

    /// Creates the bind group for the camera uniform, visible to the vertex
    /// and fragment stages.
    fn generate_camera_bindgroups(
        device: &Device,
        buffer_state: &BufferState,
    ) -> Result<(BindGroup, BindGroupLayout), BufferError> {
        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some(CAMERA_BIND_GROUP_LAYOUT),
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer_state.get_entire_binding(CAMERA_BUFFER_NAME)?,
            }],
            label: Some(CAMERA_BIND_GROUP),
        });

        Ok((camera_bind_group, camera_bind_group_layout))
    }
}
