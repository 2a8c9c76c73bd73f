//! # Application State Management
//!
//! This module handles the application's state management, including:
//! - Window and graphics initialization
//! - Input handling
//! - Application lifecycle events
//!
//! A failure during setup is kept in `ApplicationState::error` and the event
//! loop exits, so `run()` can report it.

pub mod graphics_resources_builder;
pub mod input_manager;
pub mod input_state;

use std::sync::Arc;

use anyhow::Context;
use graphics_resources_builder::{GraphicsEvent, MaybeGraphics};
use input_manager::InputManager;

use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::engine_state::{config::EngineConfig, EngineState};

/// The application's lifecycle state.
///
/// Implements `ApplicationHandler` to drive the engine from window and device
/// events.
pub struct ApplicationState {
    /// The current graphics state
    pub graphics: MaybeGraphics,

    /// The running application, once graphics are ready
    pub state: Option<InitializedApplicationState>,

    /// Configuration the engine is built from
    pub config: EngineConfig,

    /// Set when setup failed and the event loop was asked to exit
    pub error: Option<anyhow::Error>,
}

/// The fully initialized and running application.
pub struct InitializedApplicationState {
    /// The core engine state and logic
    pub engine_state: EngineState,

    /// Handle to the application window
    pub window: Arc<Window>,

    /// Manages input state and event processing
    pub input_manager: InputManager,

    /// Timestamp of the last frame for delta time calculations
    pub last_wait_time: web_time::Instant,
}

/// Whether `event` asks the application to close.
fn is_exit_request(event: &WindowEvent) -> bool {
    matches!(
        event,
        WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                    ..
                },
                ..
            }
    )
}

impl ApplicationState {
    pub fn new(graphics: MaybeGraphics, config: EngineConfig) -> Self {
        Self {
            graphics,
            state: None,
            config,
            error: None,
        }
    }

    /// Builds the engine from the ready graphics resources.
    fn initialize_application_state(&mut self) -> anyhow::Result<()> {
        let MaybeGraphics::Graphics(gfx) = std::mem::replace(&mut self.graphics, MaybeGraphics::Moved)
        else {
            return Ok(());
        };

        let engine_state = EngineState::new(
            gfx.surface,
            gfx.surface_config,
            gfx.context,
            &self.config,
            gfx.shaders,
        )
        .context("failed to start the engine")?;

        log::info!("Engine started");
        self.state = Some(InitializedApplicationState {
            engine_state,
            window: gfx.window,
            input_manager: InputManager::new(),
            last_wait_time: web_time::Instant::now(),
        });
        Ok(())
    }

    /// Records a setup failure and stops the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler<GraphicsEvent> for ApplicationState {
    /// Handles window-related events such as resize, focus changes, and input events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if is_exit_request(&event) {
            event_loop.exit();
            return;
        }

        let Some(state) = &mut self.state else {
            return;
        };

        state.input_manager.intake_input(&event);

        match event {
            WindowEvent::Resized(size) => {
                state.engine_state.resize_surface(size);
            }
            WindowEvent::Focused(false) => {
                state.input_manager.reset_inputs();
            }
            WindowEvent::RedrawRequested => {
                state.engine_state.render();
            }
            _ => (),
        }
    }

    /// Handles raw mouse motion for mouse look.
    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            if let DeviceEvent::MouseMotion { delta } = event {
                state.input_manager.intake_mouse_motion(delta);
            }
        }
    }

    /// Starts graphics setup on the first resume.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let MaybeGraphics::Builder(builder) = &mut self.graphics {
            builder.build_and_send(event_loop);
        }
    }

    /// Receives the result of graphics setup.
    fn user_event(&mut self, event_loop: &ActiveEventLoop, graphics: GraphicsEvent) {
        let result = graphics.and_then(|graphics| {
            self.graphics = MaybeGraphics::Graphics(graphics);
            self.initialize_application_state()
        });

        if let Err(error) = result {
            self.fail(event_loop, error);
        }
    }

    /// Advances one frame: input, camera, streaming results, then a redraw.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            let now = web_time::Instant::now();
            let wait_dt = now - state.last_wait_time;

            if let Some(processed_input) = state.input_manager.get_and_reset_processed_input() {
                state.engine_state.set_input_commands(processed_input);
            }

            state.engine_state.process_input(wait_dt);
            state.last_wait_time = now;

            state.engine_state.process_tasks();
            state.window.request_redraw();
        }
    }
}
