//! # Streaming Tasks
//!
//! Tasks that move streaming passes off the render thread.

pub mod streaming_task;

pub use streaming_task::{StreamingTask, TerrainSink};
