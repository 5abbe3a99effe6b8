//! wgpu backend implementation
//!
//! Resources live in a registry shared between the device and every
//! command buffer it hands out. Render passes are buffered and replayed
//! into the encoder on `end_render_pass`, so a pass never borrows the
//! encoder across trait calls.

use crate::backend::traits::*;
use crate::backend::types::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct WgpuTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

#[derive(Default)]
struct ResourceRegistry {
    textures: RwLock<HashMap<u64, WgpuTexture>>,
    buffers: RwLock<HashMap<u64, wgpu::Buffer>>,
    samplers: RwLock<HashMap<u64, wgpu::Sampler>>,
    next_id: AtomicU64,
}

impl ResourceRegistry {
    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Render device backed by a wgpu device and queue.
pub struct WgpuRenderDevice {
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    resources: Arc<ResourceRegistry>,
    name: String,
}

impl WgpuRenderDevice {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        let pairs = [
            (BufferUsage::MAP_READ, wgpu::BufferUsages::MAP_READ),
            (BufferUsage::MAP_WRITE, wgpu::BufferUsages::MAP_WRITE),
            (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
            (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
            (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
            (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
            (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
            (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
        ];
        for (ours, theirs) in pairs {
            if usage.contains(ours) {
                result |= theirs;
            }
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        let pairs = [
            (TextureUsage::COPY_SRC, wgpu::TextureUsages::COPY_SRC),
            (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
            (TextureUsage::TEXTURE_BINDING, wgpu::TextureUsages::TEXTURE_BINDING),
            (TextureUsage::STORAGE_BINDING, wgpu::TextureUsages::STORAGE_BINDING),
            (TextureUsage::RENDER_ATTACHMENT, wgpu::TextureUsages::RENDER_ATTACHMENT),
        ];
        for (ours, theirs) in pairs {
            if usage.contains(ours) {
                result |= theirs;
            }
        }
        result
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }

    fn convert_load_op(op: LoadOp) -> wgpu::LoadOp<wgpu::Color> {
        match op {
            LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            LoadOp::Load => wgpu::LoadOp::Load,
        }
    }

    fn convert_store_op(op: StoreOp) -> wgpu::StoreOp {
        match op {
            StoreOp::Store => wgpu::StoreOp::Store,
            StoreOp::Discard => wgpu::StoreOp::Discard,
        }
    }

    /// Create a device without a surface.
    pub async fn new_headless_async() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No adapter found".into()))?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {} ({:?} backend)", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Render Graph Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            resources: Arc::new(ResourceRegistry::default()),
            name: format!("wgpu ({})", info.name),
        })
    }

    /// Blocking version of [`WgpuRenderDevice::new_headless_async`].
    pub fn new_headless() -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async())
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl RenderDevice for WgpuRenderDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_command_queue(&self) -> Arc<dyn CommandQueue> {
        Arc::new(WgpuCommandQueue {
            device: self.device.clone(),
            queue: self.queue.clone(),
            resources: self.resources.clone(),
        })
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.resources.allocate_id();
        self.resources
            .textures
            .write()
            .insert(id, WgpuTexture { texture, view });

        Ok(TextureHandle(id))
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });

        let id = self.resources.allocate_id();
        self.resources.buffers.write().insert(id, buffer);

        Ok(BufferHandle(id))
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let address_mode = Self::convert_address_mode(desc.address_mode);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: Self::convert_filter_mode(desc.mag_filter),
            min_filter: Self::convert_filter_mode(desc.min_filter),
            ..Default::default()
        });

        let id = self.resources.allocate_id();
        self.resources.samplers.write().insert(id, sampler);

        Ok(SamplerHandle(id))
    }
}

/// Queue of a [`WgpuRenderDevice`].
pub struct WgpuCommandQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    resources: Arc<ResourceRegistry>,
}

impl CommandQueue for WgpuCommandQueue {
    fn make_command_buffer(&self, label: Option<&str>) -> Box<dyn CommandBuffer> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        Box::new(WgpuCommandBuffer {
            label: label.map(str::to_string),
            encoder,
            queue: self.queue.clone(),
            resources: self.resources.clone(),
            pending_render_pass: None,
            error: None,
        })
    }
}

/// Command buffer wrapping a `wgpu::CommandEncoder`.
pub struct WgpuCommandBuffer {
    label: Option<String>,
    encoder: wgpu::CommandEncoder,
    queue: Arc<wgpu::Queue>,
    resources: Arc<ResourceRegistry>,
    pending_render_pass: Option<RenderPassDescriptor>,
    // First recording failure, reported on commit
    error: Option<BackendError>,
}

impl WgpuCommandBuffer {
    fn record_error(&mut self, error: BackendError) {
        log::error!("WgpuCommandBuffer {:?}: {}", self.label, error);
        self.error.get_or_insert(error);
    }
}

impl CommandBuffer for WgpuCommandBuffer {
    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn insert_debug_marker(&mut self, label: &str) {
        self.encoder.insert_debug_marker(label);
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.pending_render_pass = Some(desc.clone());
    }

    fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };

        let resources = self.resources.clone();
        let textures = resources.textures.read();
        let mut missing = None;
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pending
            .color_attachments
            .iter()
            .map(|att| {
                let Some(texture) = textures.get(&att.texture.0) else {
                    missing = Some(att.texture);
                    return None;
                };
                Some(wgpu::RenderPassColorAttachment {
                    view: &texture.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: WgpuRenderDevice::convert_load_op(att.load_op),
                        store: WgpuRenderDevice::convert_store_op(att.store_op),
                    },
                })
            })
            .collect();

        if let Some(texture) = missing {
            drop(color_attachments);
            drop(textures);
            self.record_error(BackendError::UnknownResource(texture.to_string()));
            return;
        }

        // Nothing else is recorded into the pass; dropping it ends it.
        let _pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: pending.label.as_deref(),
            color_attachments: &color_attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    ) {
        let resources = self.resources.clone();
        let buffers = resources.buffers.read();
        let (Some(src), Some(dst)) = (buffers.get(&source.0), buffers.get(&destination.0)) else {
            drop(buffers);
            self.record_error(BackendError::UnknownResource(format!(
                "{} -> {}",
                source, destination
            )));
            return;
        };
        self.encoder
            .copy_buffer_to_buffer(src, source_offset, dst, destination_offset, size);
    }

    fn commit(self: Box<Self>) -> BackendResult<()> {
        let this = *self;
        if let Some(error) = this.error {
            return Err(error);
        }
        if this.pending_render_pass.is_some() {
            return Err(BackendError::SubmissionFailed(format!(
                "render pass still open in {:?}",
                this.label
            )));
        }
        this.queue.submit(std::iter::once(this.encoder.finish()));
        Ok(())
    }
}
