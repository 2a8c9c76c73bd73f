//! # Buffer State Module
//!
//! A registry for the GPU buffers used by the engine. Buffers are referenced by
//! name (static string), created once, written through the queue and bound by
//! name when building bind groups or copy steps.
//!
//! ## Key Features
//!
//! * Centralized buffer management with named references
//! * Buffer usage analytics and memory tracking
//! * Bounds-checked writes that report errors instead of panicking
//!
//! The compute stage keeps its own `BufferState` for chunk storage so that its
//! names never collide with the render-side buffers.

use std::collections::HashMap;

use wgpu::{util::DeviceExt, Buffer};

use super::{compute::DeviceContext, error::BufferError};

/// Analytics data for a GPU buffer
///
/// Tracks memory allocation, usage, and write operations for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAnalytics {
    /// Total memory allocated for the buffer in bytes
    pub allocated_memory: u64,
    /// Highest byte written so far
    pub used_memory: u64,
    /// Number of times the buffer has been written to
    pub times_written: u64,
}

impl BufferAnalytics {
    fn allocated(size: u64) -> Self {
        Self {
            allocated_memory: size,
            used_memory: 0,
            times_written: 0,
        }
    }

    fn initialized(size: u64) -> Self {
        Self {
            allocated_memory: size,
            used_memory: size,
            times_written: 1,
        }
    }

    /// Checks a write of `len` bytes at `offset` and records it.
    fn record_write(
        &mut self,
        buffer: &'static str,
        offset: u64,
        len: u64,
    ) -> Result<(), BufferError> {
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= self.allocated_memory => {
                self.used_memory = self.used_memory.max(end);
                self.times_written += 1;
                Ok(())
            }
            _ => Err(BufferError::WriteOutOfBounds {
                buffer,
                offset,
                len,
                capacity: self.allocated_memory,
            }),
        }
    }
}

/// Central manager for GPU buffers
///
/// # Examples
///
/// ```ignore
/// let mut buffer_state = BufferState::new(context.clone());
///
/// buffer_state.create_buffer_init(
///     "vertex_buffer",
///     wgpu::util::BufferInitDescriptor {
///         label: Some("Vertex Buffer"),
///         contents: bytemuck::cast_slice(&vertices),
///         usage: wgpu::BufferUsages::VERTEX,
///     },
/// );
///
/// let vertex_buffer = buffer_state.get_buffer("vertex_buffer")?;
/// ```
pub struct BufferState {
    /// Device and queue the buffers live on
    context: DeviceContext,
    /// Map of buffer names to buffer objects
    buffers: HashMap<&'static str, Buffer>,
    /// Analytics data for each buffer
    buffer_analytics: HashMap<&'static str, BufferAnalytics>,
}

impl BufferState {
    /// Creates an empty buffer registry on the given device.
    pub fn new(context: DeviceContext) -> Self {
        Self {
            context,
            buffers: HashMap::new(),
            buffer_analytics: HashMap::new(),
        }
    }

    /// The device context buffers are created on.
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Creates an empty buffer with the specified descriptor, replacing any
    /// buffer previously registered under the same name.
    ///
    /// # Arguments
    ///
    /// * `buffer_name` - Unique name for the buffer
    /// * `buffer_descriptor` - Buffer configuration descriptor
    pub fn create_buffer(
        &mut self,
        buffer_name: &'static str,
        buffer_descriptor: wgpu::BufferDescriptor,
    ) {
        let buffer = self.context.device.create_buffer(&buffer_descriptor);

        self.buffers.insert(buffer_name, buffer);
        self.buffer_analytics
            .insert(buffer_name, BufferAnalytics::allocated(buffer_descriptor.size));
    }

    /// Creates a buffer and initializes it with data, replacing any buffer
    /// previously registered under the same name.
    ///
    /// # Arguments
    ///
    /// * `buffer_name` - Unique name for the buffer
    /// * `init_descriptor` - Buffer initialization descriptor with data
    pub fn create_buffer_init(
        &mut self,
        buffer_name: &'static str,
        init_descriptor: wgpu::util::BufferInitDescriptor,
    ) {
        let size = init_descriptor.contents.len() as u64;
        let buffer = self.context.device.create_buffer_init(&init_descriptor);

        self.buffers.insert(buffer_name, buffer);
        self.buffer_analytics
            .insert(buffer_name, BufferAnalytics::initialized(size));
    }

    /// Writes raw byte data to a buffer through the queue.
    ///
    /// # Arguments
    ///
    /// * `buffer_name` - Name of the buffer to write to
    /// * `offset` - Byte offset in the buffer to start writing
    /// * `data` - Raw byte data to write
    ///
    /// # Errors
    ///
    /// - `Unknown` if no buffer has this name
    /// - `WriteOutOfBounds` if the write would run past the end of the buffer
    pub fn write_buffer(
        &mut self,
        buffer_name: &'static str,
        offset: wgpu::BufferAddress,
        data: &[u8],
    ) -> Result<(), BufferError> {
        let buffer = self
            .buffers
            .get(buffer_name)
            .ok_or(BufferError::Unknown(buffer_name))?;
        let analytics = self
            .buffer_analytics
            .get_mut(buffer_name)
            .ok_or(BufferError::Unknown(buffer_name))?;

        analytics.record_write(buffer_name, offset, data.len() as u64)?;
        self.context.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    /// Gets a reference to a buffer by name
    ///
    /// # Errors
    ///
    /// `Unknown` if no buffer has this name
    pub fn get_buffer(&self, buffer_name: &'static str) -> Result<&Buffer, BufferError> {
        self.buffers
            .get(buffer_name)
            .ok_or(BufferError::Unknown(buffer_name))
    }

    /// Allocated size of a buffer in bytes, if it exists.
    pub fn get_buffer_size(&self, buffer_name: &str) -> Option<u64> {
        self.buffer_analytics
            .get(buffer_name)
            .map(|analytics| analytics.allocated_memory)
    }

    /// Gets a binding resource for the entire buffer
    ///
    /// # Errors
    ///
    /// `Unknown` if no buffer has this name
    pub fn get_entire_binding(
        &self,
        buffer_name: &'static str,
    ) -> Result<wgpu::BindingResource<'_>, BufferError> {
        Ok(self.get_buffer(buffer_name)?.as_entire_binding())
    }

    /// Gets the total allocated memory across all buffers in bytes
    pub fn get_total_allocated_memory(&self) -> u64 {
        self.buffer_analytics
            .values()
            .map(|analytics| analytics.allocated_memory)
            .sum()
    }

    /// Gets the total used memory across all buffers in bytes
    pub fn get_total_used_memory(&self) -> u64 {
        self.buffer_analytics
            .values()
            .map(|analytics| analytics.used_memory)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_bounds_checked() {
        let mut analytics = BufferAnalytics::allocated(64);
        assert!(analytics.record_write("uniform", 0, 16).is_ok());
        assert!(analytics.record_write("uniform", 48, 16).is_ok());
        assert_eq!(analytics.used_memory, 64);
        assert_eq!(analytics.times_written, 2);

        assert_eq!(
            analytics.record_write("uniform", 60, 8),
            Err(BufferError::WriteOutOfBounds {
                buffer: "uniform",
                offset: 60,
                len: 8,
                capacity: 64,
            })
        );
        assert!(analytics.record_write("uniform", u64::MAX, 2).is_err());
        assert_eq!(analytics.times_written, 2);
    }

    #[test]
    fn initialized_buffers_count_as_used() {
        let analytics = BufferAnalytics::initialized(128);
        assert_eq!(analytics.used_memory, 128);
        assert_eq!(analytics.times_written, 1);
    }
}
