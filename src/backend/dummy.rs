//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. Resources are plain ids and every
//! committed command buffer is recorded as a [`Submission`] so tests can
//! check what the render graph encoded and in which order.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A command recorded by a [`DummyCommandBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    DebugMarker(String),
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    CopyBufferToBuffer {
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    },
}

/// A committed command buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub label: Option<String>,
    pub commands: Vec<RecordedCommand>,
}

impl Submission {
    /// Debug markers in recording order.
    pub fn markers(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::DebugMarker(marker) => Some(marker.as_str()),
                _ => None,
            })
            .collect()
    }
}

type SubmissionLog = Arc<Mutex<Vec<Submission>>>;

/// Dummy render device.
#[derive(Debug, Default)]
pub struct DummyRenderDevice {
    next_id: AtomicU64,
    queues_created: AtomicUsize,
    submissions: SubmissionLog,
}

impl DummyRenderDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// All command buffers committed so far, in submission order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// Number of committed command buffers.
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Forget recorded submissions.
    pub fn clear_submissions(&self) {
        self.submissions.lock().clear();
    }

    /// Number of command queues handed out.
    pub fn queue_count(&self) -> usize {
        self.queues_created.load(Ordering::Relaxed)
    }
}

impl RenderDevice for DummyRenderDevice {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn create_command_queue(&self) -> Arc<dyn CommandQueue> {
        self.queues_created.fetch_add(1, Ordering::Relaxed);
        Arc::new(DummyCommandQueue {
            submissions: self.submissions.clone(),
        })
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let handle = TextureHandle(self.allocate_id());
        log::trace!(
            "DummyRenderDevice: creating texture {:?} ({}x{}) -> {}",
            desc.label,
            desc.width,
            desc.height,
            handle
        );
        Ok(handle)
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        let handle = BufferHandle(self.allocate_id());
        log::trace!(
            "DummyRenderDevice: creating buffer {:?} (size: {}) -> {}",
            desc.label,
            desc.size,
            handle
        );
        Ok(handle)
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let handle = SamplerHandle(self.allocate_id());
        log::trace!("DummyRenderDevice: creating sampler {:?} -> {}", desc.label, handle);
        Ok(handle)
    }
}

/// Queue of a [`DummyRenderDevice`].
#[derive(Debug)]
pub struct DummyCommandQueue {
    submissions: SubmissionLog,
}

impl CommandQueue for DummyCommandQueue {
    fn make_command_buffer(&self, label: Option<&str>) -> Box<dyn CommandBuffer> {
        Box::new(DummyCommandBuffer {
            label: label.map(str::to_string),
            commands: Vec::new(),
            pass_open: false,
            submissions: self.submissions.clone(),
        })
    }
}

/// Command buffer of a [`DummyCommandQueue`].
#[derive(Debug)]
pub struct DummyCommandBuffer {
    label: Option<String>,
    commands: Vec<RecordedCommand>,
    pass_open: bool,
    submissions: SubmissionLog,
}

impl CommandBuffer for DummyCommandBuffer {
    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn insert_debug_marker(&mut self, label: &str) {
        self.commands
            .push(RecordedCommand::DebugMarker(label.to_string()));
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.pass_open = true;
        self.commands
            .push(RecordedCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        self.pass_open = false;
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn commit(self: Box<Self>) -> BackendResult<()> {
        if self.pass_open {
            return Err(BackendError::SubmissionFailed(format!(
                "render pass still open in {:?}",
                self.label
            )));
        }
        log::trace!(
            "DummyCommandBuffer: committing {:?} ({} commands)",
            self.label,
            self.commands.len()
        );
        self.submissions.lock().push(Submission {
            label: self.label,
            commands: self.commands,
        });
        Ok(())
    }
}
