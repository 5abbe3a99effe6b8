//! Backend abstraction layer
//!
//! Provides the device/queue/command-buffer traits the render graph
//! encodes through, plus a recording dummy backend and an optional wgpu one.

pub mod dummy;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use dummy::*;
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuRenderDevice;
