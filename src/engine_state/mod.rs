//! # Engine State Module
//!
//! The engine proper: everything between the window and the GPU.
//!
//! ## Key Components
//!
//! * `EngineState` - The main state container for the engine
//! * `buffer_state` - Named GPU buffer registry
//! * `camera_state` - Free-fly camera and its uniform
//! * `compute` - Chunk meshing on the GPU, with a host fallback
//! * `config` - Tunables loaded at startup
//! * `rendering` - Surface, terrain pipeline and draw buffers
//! * `streaming` - Keeps the terrain mesh in step with the camera
//! * `task_management` - Worker threads for streaming passes
//! * `voxels` - Chunk addressing, density fields and the lookup table
//!
//! ## Frame Loop
//!
//! Each frame the camera applies the player's input. When it crosses into a
//! new chunk the current streaming pass is superseded and a new one is
//! published. Finished passes are handled on the main thread, which uploads
//! the new terrain mesh before the frame is drawn.

use camera_state::{camera, CameraState, CameraUpdates};
use compute::{ChunkMesher, CpuChunkMesher, DeviceContext, GpuChunkMesher};
use config::{EngineConfig, MesherBackend};
use error::StartupError;
use rendering::RenderManager;
use streaming::{
    tasks::StreamingTask, CancelSource, CancelToken, StreamState, StreamingLoop,
};
use task_management::TaskManager;
use voxels::{chunk::ChunkCoord, density::PerlinTerrain, lookup_table::TriangleTable};
use wgpu::{Surface, SurfaceConfiguration};
use winit::keyboard::KeyCode;

use crate::{application_state::input_state::ProcessedInputState, core::MtResource};

mod buffer_state;
mod camera_state;
pub mod compute;
pub mod config;
pub mod error;
mod rendering;
mod streaming;
mod task_management;
mod voxels;

/// Streaming passes run one at a time, so one worker is enough.
const STREAMING_WORKERS: usize = 1;

/// The main state container for the engine.
///
/// # Examples
///
/// ```ignore
/// let mut engine_state = EngineState::new(surface, surface_config, context, &config, shaders)?;
///
/// // Main loop
/// loop {
///     engine_state.process_input(delta_time);
///     engine_state.process_tasks();
///     engine_state.render();
/// }
/// ```
pub struct EngineState {
    /// Camera state managing position, orientation and movement
    pub camera_state: CameraState,
    /// Current player actions derived from input
    pub player_actions: PlayerAction,
    /// Surface, draw buffers and the terrain pipeline
    pub render_manager: RenderManager,
    task_manager: TaskManager<RenderManager>,
    streaming: MtResource<StreamingLoop>,
    stream_state: MtResource<StreamState>,
    cancel: CancelSource,
    /// Chunk the camera was in when the last pass was published
    current_chunk: ChunkCoord,
}

/// Shader sources the engine is built from.
pub struct ShaderSources {
    /// Terrain render shader
    pub render: String,
    /// Mesh compute shader, only needed by the GPU mesher
    pub compute: Option<String>,
}

impl EngineState {
    /// Creates the engine and publishes the first streaming pass.
    ///
    /// # Errors
    /// Any `StartupError` from building the mesher, the streaming loop or the
    /// render pipeline.
    pub fn new(
        surface: Surface<'static>,
        surface_config: SurfaceConfiguration,
        context: DeviceContext,
        config: &EngineConfig,
        shaders: ShaderSources,
    ) -> Result<Self, StartupError> {
        let mut buffer_state = buffer_state::BufferState::new(context.clone());

        let camera_projection = camera::Projection::new(
            surface_config.width,
            surface_config.height,
            cgmath::Deg(60.0),
            0.1,
            2000.0,
        );
        let camera_state = CameraState::new(&mut buffer_state, &camera_projection, &config.camera);

        let render_manager = RenderManager::new(
            surface,
            surface_config,
            context.clone(),
            buffer_state,
            &shaders.render,
            camera_projection,
        )?;

        let mesher = build_mesher(config, context, shaders.compute.as_deref())?;
        let field = Box::new(PerlinTerrain::new(config.terrain.clone()));
        let streaming_loop = StreamingLoop::new(config, mesher, field)?;
        let stream_state = streaming_loop.state();

        let mut engine_state = Self {
            current_chunk: camera_state.chunk(),
            camera_state,
            player_actions: PlayerAction::default(),
            render_manager,
            task_manager: TaskManager::new(STREAMING_WORKERS),
            streaming: MtResource::new(streaming_loop),
            stream_state,
            cancel: CancelSource::new(),
        };

        let token = engine_state.cancel.token();
        engine_state.publish_streaming_pass(token);
        Ok(engine_state)
    }

    /// Resizes the rendering surface when the window size changes.
    pub fn resize_surface(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        self.render_manager.resize_surface(size);
        if let Err(error) = self.camera_state.write_uniform(
            &self.render_manager.camera_projection,
            &mut self.render_manager.buffer_state,
        ) {
            log::error!("Camera uniform not updated after resize: {error}");
        }
    }

    /// Renders the current frame.
    pub fn render(&mut self) {
        self.render_manager.render();
    }

    /// Handles finished streaming passes and starts queued ones.
    ///
    /// Call once per frame, before rendering, so a finished mesh is presented
    /// in the same frame.
    pub fn process_tasks(&mut self) {
        self.task_manager
            .process_completed_tasks(&mut self.render_manager);
        self.task_manager.process_queued_tasks();
    }

    /// Applies this frame's input to the camera and streams when the camera
    /// enters a new chunk.
    ///
    /// # Arguments
    /// * `wait_duration` - The time elapsed since the last frame
    pub fn process_input(&mut self, wait_duration: web_time::Duration) {
        self.camera_state.intake_actions(&self.player_actions);

        match self.camera_state.update(
            wait_duration,
            &self.render_manager.camera_projection,
            &mut self.render_manager.buffer_state,
        ) {
            Ok(Some(CameraUpdates { chunk })) if chunk != self.current_chunk => {
                log::debug!("Camera entered chunk {chunk}");
                self.current_chunk = chunk;
                let token = self.cancel.supersede();
                self.publish_streaming_pass(token);
            }
            Ok(_) => {}
            Err(error) => log::error!("Camera uniform not updated: {error}"),
        }

        if self.player_actions.rebuild_terrain {
            log::info!("Rebuilding every visible chunk");
            // Superseding first keeps the wait for the loop to one chunk.
            let token = self.cancel.supersede();
            self.streaming.get_mut().request_rebuild();
            self.publish_streaming_pass(token);
        }
    }

    /// Queues a streaming pass for the camera's current position.
    fn publish_streaming_pass(&mut self, token: CancelToken) {
        let viewpoint = self.camera_state.camera.position;
        let task = StreamingTask::new(self.streaming.clone(), viewpoint, token);
        if !self.task_manager.publish_task(Box::new(task)) {
            log::debug!(
                "Streaming pass queued, {} pending",
                self.task_manager.pending_tasks()
            );
        }
    }

    /// Sets the input commands for the engine state.
    ///
    /// # Arguments
    /// * `input` - The processed input state to use for setting commands
    pub fn set_input_commands(&mut self, input: ProcessedInputState) {
        self.player_actions = translate_processed_input(&input);

        if self.player_actions.get_buffer_data {
            let buffers = &self.render_manager.buffer_state;
            log::info!(
                "Render buffers: {} bytes allocated, {} bytes used",
                buffers.get_total_allocated_memory(),
                buffers.get_total_used_memory()
            );
            log::info!(
                "Streaming: {:?}, generation {}, {} terrain indices presented",
                *self.stream_state.get(),
                self.cancel.generation(),
                self.render_manager.presented_index_count()
            );
        }
    }
}

/// Builds the mesher selected in the configuration.
fn build_mesher(
    config: &EngineConfig,
    context: DeviceContext,
    compute_shader: Option<&str>,
) -> Result<Box<dyn ChunkMesher>, StartupError> {
    let table = TriangleTable::marching_cubes();
    match (config.mesher, compute_shader) {
        (MesherBackend::Gpu, Some(shader)) => {
            Ok(Box::new(GpuChunkMesher::new(context, shader, &table)?))
        }
        (MesherBackend::Gpu, None) => Err(StartupError::Validation {
            stage: "mesh compute",
            message: "no compute shader was loaded".to_string(),
        }),
        (MesherBackend::Cpu, _) => Ok(Box::new(CpuChunkMesher::new(table))),
    }
}

/// Translates the processed input state into player actions.
fn translate_processed_input(input: &ProcessedInputState) -> PlayerAction {
    let mut player_action = PlayerAction {
        move_forward: input.get_key_state(KeyCode::KeyW).is_active(),
        move_backward: input.get_key_state(KeyCode::KeyS).is_active(),
        move_left: input.get_key_state(KeyCode::KeyA).is_active(),
        move_right: input.get_key_state(KeyCode::KeyD).is_active(),
        move_up: input.get_key_state(KeyCode::Space).is_active(),
        move_down: input.get_key_state(KeyCode::ShiftLeft).is_active(),
        ..PlayerAction::default()
    };

    // Mouse look only while the left button is down
    if input.get_mouse_button_state(winit::event::MouseButton::Left).is_active() {
        player_action.rotate_view = input.get_mouse_delta();
    }

    // One-shot actions trigger on press, not hold
    player_action.rebuild_terrain = input.get_key_state(KeyCode::KeyR).is_just_pressed();
    player_action.get_buffer_data = input.get_key_state(KeyCode::KeyB).is_just_pressed();

    player_action
}

/// Player actions derived from one frame of input.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlayerAction {
    /// Movement actions - true if key is pressed or held
    move_forward: bool,
    move_backward: bool,
    move_left: bool,
    move_right: bool,
    move_up: bool,
    move_down: bool,

    /// View rotation - Some if the left mouse button is down
    rotate_view: Option<(f64, f64)>,

    /// Mesh every visible chunk again
    rebuild_terrain: bool,
    /// Log buffer and streaming statistics
    get_buffer_data: bool,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use winit::event::MouseButton;

    use super::*;
    use crate::application_state::input_state::RawInputState;

    fn input(
        keys: &[(KeyCode, RawInputState)],
        left_button: RawInputState,
        mouse_delta: Option<(f64, f64)>,
    ) -> ProcessedInputState {
        ProcessedInputState {
            keyboard_states: keys.iter().copied().collect(),
            mouse_button_states: HashMap::from([(MouseButton::Left, left_button)]),
            mouse_delta,
        }
    }

    #[test]
    fn held_keys_move_and_pressed_keys_trigger_once() {
        let actions = translate_processed_input(&input(
            &[
                (KeyCode::KeyW, RawInputState::Held),
                (KeyCode::Space, RawInputState::Pressed),
                (KeyCode::KeyR, RawInputState::Pressed),
                (KeyCode::KeyB, RawInputState::Held),
            ],
            RawInputState::NotPressed,
            None,
        ));

        assert!(actions.move_forward);
        assert!(actions.move_up);
        assert!(!actions.move_backward);
        assert!(actions.rebuild_terrain);
        assert!(!actions.get_buffer_data);
    }

    #[test]
    fn mouse_look_needs_the_left_button() {
        let released = translate_processed_input(&input(
            &[],
            RawInputState::Released,
            Some((4.0, 2.0)),
        ));
        assert_eq!(released.rotate_view, None);

        let dragging = translate_processed_input(&input(&[], RawInputState::Held, Some((4.0, 2.0))));
        assert_eq!(dragging.rotate_view, Some((4.0, 2.0)));
    }

    #[test]
    fn gpu_backend_requires_a_compute_shader() {
        let Ok(context) = pollster::block_on(DeviceContext::headless()) else {
            eprintln!("skipping GPU test: no adapter");
            return;
        };
        let config = EngineConfig::default();
        assert!(matches!(
            build_mesher(&config, context.clone(), None),
            Err(StartupError::Validation { .. })
        ));

        let cpu = EngineConfig {
            mesher: MesherBackend::Cpu,
            ..EngineConfig::default()
        };
        let mesher = build_mesher(&cpu, context, None).unwrap();
        assert_eq!(mesher.backend(), "cpu");
    }
}
