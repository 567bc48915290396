//! Frame orchestration and drawing.
//!
//! This crate owns the per-frame protocol the rest of the engine runs on:
//! acquire a presentable image, record the frame's command stream, submit,
//! present, and rebuild the presentation surface when it goes stale. It also
//! carries the GPU-side mesh upload path, the per-frame uniform data, and
//! the per-object draw pass.

pub mod depth_buffer;
pub mod frame;
pub mod mesh;
pub mod renderer;
pub mod system;
pub mod ubo;

pub use depth_buffer::DepthBuffer;
pub use frame::FrameManager;
pub use mesh::GpuMesh;
pub use renderer::Renderer;
pub use system::MeshRenderSystem;
pub use ubo::GlobalUbo;

pub use orrery_rhi::sync::MAX_FRAMES_IN_FLIGHT;
