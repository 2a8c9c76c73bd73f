//! # Camera State Management
//!
//! Owns the free-fly camera, feeds its uniform buffer and reports which chunk
//! the camera is in so the streaming loop knows when to run.
//!
//! ## Core Components
//! - `Camera`: position and orientation
//! - `CameraController`: player input for the current frame
//! - `Projection`: the perspective matrix
//! - `CameraUniform`: GPU copy of the camera for the terrain shader

use camera::{Camera, CameraController, CameraUniform, Projection};
use cgmath::Point3;

use super::{
    buffer_state::BufferState, config::CameraSettings, error::BufferError,
    voxels::chunk::ChunkCoord, PlayerAction,
};

pub mod camera;

/// Name of the GPU buffer used for camera uniform data
pub const CAMERA_BUFFER_NAME: &str = "camera_buffer";

/// The camera, its controller and the uniform mirrored into `CAMERA_BUFFER_NAME`.
pub struct CameraState {
    pub camera: Camera,
    pub camera_uniform: CameraUniform,
    pub camera_controller: CameraController,
}

impl CameraState {
    /// Places the camera at the configured start and creates its uniform
    /// buffer in `buffer_state`.
    pub fn new(
        buffer_state: &mut BufferState,
        projection: &Projection,
        settings: &CameraSettings,
    ) -> Self {
        let camera = Camera::new(
            Point3::from(settings.start_position),
            cgmath::Deg(0.0),
            cgmath::Deg(-20.0),
        );
        let camera_controller = CameraController::new(settings.speed, settings.sensitivity);

        let mut camera_uniform = CameraUniform::new();
        camera_uniform.update_view_proj_and_pos(&camera, projection);

        buffer_state.create_buffer_init(
            CAMERA_BUFFER_NAME,
            wgpu::util::BufferInitDescriptor {
                label: Some(CAMERA_BUFFER_NAME),
                contents: bytemuck::cast_slice(&[camera_uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            },
        );

        CameraState {
            camera,
            camera_uniform,
            camera_controller,
        }
    }

    /// Records this frame's player actions.
    pub fn intake_actions(&mut self, actions: &PlayerAction) {
        self.camera_controller.intake_actions(actions);
    }

    /// The chunk the camera is currently in.
    pub fn chunk(&self) -> ChunkCoord {
        ChunkCoord::containing(self.camera.position)
    }

    /// Rewrites the uniform buffer, for example after the projection changed.
    pub fn write_uniform(
        &mut self,
        projection: &Projection,
        buffer_state: &mut BufferState,
    ) -> Result<(), BufferError> {
        self.camera_uniform
            .update_view_proj_and_pos(&self.camera, projection);
        buffer_state.write_buffer(
            CAMERA_BUFFER_NAME,
            0,
            bytemuck::cast_slice(&[self.camera_uniform]),
        )
    }

    /// Applies pending input and refreshes the uniform buffer.
    ///
    /// # Returns
    /// - `Some(CameraUpdates)` if the camera moved or turned
    /// - `None` if there was no input
    pub fn update(
        &mut self,
        dt: web_time::Duration,
        projection: &Projection,
        buffer_state: &mut BufferState,
    ) -> Result<Option<CameraUpdates>, BufferError> {
        if !self.camera_controller.has_updates() {
            return Ok(None);
        }

        self.camera
            .get_controller_updates_and_reset_controller(&mut self.camera_controller, dt);
        self.write_uniform(projection, buffer_state)?;

        Ok(Some(CameraUpdates {
            chunk: self.chunk(),
        }))
    }
}

/// Where the camera ended up after an update.
pub struct CameraUpdates {
    /// The chunk containing the camera
    pub chunk: ChunkCoord,
}
