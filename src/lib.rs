//! # Voxel Terrain
//!
//! Streams a procedural isosurface terrain around a free-fly camera. The
//! volume is split into cubic chunks; every chunk near the camera is meshed
//! with Marching Cubes in a compute shader, read back, and the chunk meshes
//! are concatenated into one terrain mesh that is drawn each frame.
//!
//! ## Key Modules
//!
//! * `application_state` - Window, input and the winit event loop
//! * `core` - Shared-state primitives used across threads
//! * `engine_state` - Meshing, streaming, rendering and configuration
//!
//! ## Usage
//!
//! ```no_run
//! fn main() -> anyhow::Result<()> {
//!     voxel_terrain::run()
//! }
//! ```
//!
//! Settings are read from `voxel_terrain.json`, or from the file named by
//! `VOXEL_TERRAIN_CONFIG`. `RUST_LOG` controls logging.

use anyhow::Context;
use application_state::{
    graphics_resources_builder::{GraphicsBuilder, MaybeGraphics},
    ApplicationState,
};
use log::info;
use winit::event_loop::EventLoop;

mod application_state;
mod core;
mod engine_state;

/// Runs the application until the window closes.
///
/// # Errors
/// Configuration, device or pipeline setup failures, and event loop errors.
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    let config =
        engine_state::config::EngineConfig::load().context("failed to load configuration")?;

    let event_loop = EventLoop::with_user_event()
        .build()
        .context("failed to create the event loop")?;

    let mut state = ApplicationState::new(
        MaybeGraphics::Builder(GraphicsBuilder::new(event_loop.create_proxy(), config.clone())),
        config,
    );

    event_loop
        .run_app(&mut state)
        .context("event loop terminated abnormally")?;

    match state.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
