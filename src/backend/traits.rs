//! Core backend abstraction traits
//!
//! The render graph only talks to the GPU through these traits. Each
//! backend (dummy, wgpu) provides a device that hands out command queues,
//! and queues that hand out command buffers.

use crate::backend::types::*;
use std::sync::Arc;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
    #[error("Command buffer submission failed: {0}")]
    SubmissionFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A GPU device: creates resources and command queues.
pub trait RenderDevice: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Create a command queue that command buffers are submitted to
    fn create_command_queue(&self) -> Arc<dyn CommandQueue>;

    /// Create a texture
    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a buffer
    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create a sampler
    fn create_sampler(&self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;
}

/// A submission queue.
pub trait CommandQueue: Send + Sync {
    /// Start recording a new command buffer
    fn make_command_buffer(&self, label: Option<&str>) -> Box<dyn CommandBuffer>;
}

/// A command buffer being recorded. Nothing reaches the GPU until
/// [`CommandBuffer::commit`] is called.
pub trait CommandBuffer: Send {
    /// Label given at creation
    fn label(&self) -> Option<&str>;

    /// Insert a debug marker into the command stream
    fn insert_debug_marker(&mut self, label: &str);

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Copy bytes between two buffers
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    );

    /// Finish recording and submit to the queue the buffer was made from
    fn commit(self: Box<Self>) -> BackendResult<()>;
}
