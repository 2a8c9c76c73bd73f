//! # Engine Errors
//!
//! Errors are split by how far they are allowed to propagate:
//!
//! * `StartupError`: device, pipeline, shader or configuration setup failed.
//!   These are fatal and surface from `run()`.
//! * `ChunkError`: a single chunk could not be meshed. The streaming loop logs
//!   it, skips the chunk and keeps presenting the previous mesh.
//! * `BufferError`: misuse of the named buffer registry. Converted into one of
//!   the above depending on where it happens.

use std::path::PathBuf;

use super::voxels::chunk::ChunkCoord;

/// Failures while bringing up the engine.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// No adapter matched the requested options
    #[error("no compatible GPU adapter found")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    /// The adapter refused to open a device with the requested limits
    #[error("failed to open GPU device")]
    Device(#[from] wgpu::RequestDeviceError),

    /// A shader file could not be read
    #[error("failed to read shader '{path}'")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device reported a validation or allocation error during setup
    #[error("GPU rejected {stage} setup: {message}")]
    Validation { stage: &'static str, message: String },

    /// The configuration file exists but could not be read
    #[error("failed to read configuration '{path}'")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for `EngineConfig`
    #[error("invalid configuration '{path}'")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is out of range
    #[error("invalid configuration value: {0}")]
    ConfigValue(String),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Failures while meshing one chunk.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// The density grid handed to the mesher has the wrong size
    #[error("density samples for chunk {coord} have {actual} values, expected {expected}")]
    SampleCount {
        coord: ChunkCoord,
        expected: usize,
        actual: usize,
    },

    /// Waiting on the chunk's submission failed
    #[error("waiting for chunk submission failed")]
    Poll(#[from] wgpu::PollError),

    /// A staging buffer could not be mapped for reading
    #[error("mapping staging buffer '{buffer}' failed")]
    Map {
        buffer: &'static str,
        #[source]
        source: wgpu::BufferAsyncError,
    },

    /// The map callback was dropped without reporting a result
    #[error("map callback for staging buffer '{buffer}' never completed")]
    MapAbandoned { buffer: &'static str },

    /// A copy step reads and writes the same buffer
    #[error("copy step reads and writes '{0}'")]
    AliasedCopy(&'static str),

    /// A copy step does not fit its source or destination
    #[error("copy of {size} bytes from '{from}' to '{to}' exceeds buffer capacity")]
    CopyOutOfBounds {
        from: &'static str,
        to: &'static str,
        size: u64,
    },

    /// The compute stage reported more output than the buffers hold
    #[error(
        "chunk {coord} reported {vertices} vertices and {indices} indices, capacity is {max_vertices} and {max_indices}"
    )]
    CapacityExceeded {
        coord: ChunkCoord,
        vertices: u32,
        indices: u32,
        max_vertices: u32,
        max_indices: u32,
    },

    /// The index count does not describe whole triangles
    #[error("chunk {coord} has {indices} indices, not a multiple of 3")]
    PartialTriangle { coord: ChunkCoord, indices: u32 },

    /// An index points past the chunk's own vertices
    #[error("chunk {coord} index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        coord: ChunkCoord,
        index: u32,
        vertex_count: u32,
    },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Misuse of the named buffer registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// No buffer is registered under this name
    #[error("no buffer named '{0}'")]
    Unknown(&'static str),

    /// A write would run past the end of the buffer
    #[error("write of {len} bytes at offset {offset} overflows '{buffer}' ({capacity} bytes)")]
    WriteOutOfBounds {
        buffer: &'static str,
        offset: u64,
        len: u64,
        capacity: u64,
    },
}
