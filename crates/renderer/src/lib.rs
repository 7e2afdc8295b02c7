//! Frame-lifecycle engine.
//!
//! This crate orchestrates the two-subpass rendering process:
//! - Render graph (render pass plus geometry and composition pipelines)
//! - Descriptor layouts, pools and write plans
//! - Texture table and mesh models
//! - Per-image resource records rebuilt with the swap chain
//! - Frame-in-flight synchronization and command recording

pub mod descriptors;
mod error;
pub mod frame_sync;
pub mod mesh;
pub mod pipelines;
pub mod recorder;
pub mod render_graph;
mod renderer;
pub mod targets;
pub mod texture_table;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use renderer::{AcquireOutcome, Renderer, classify_acquire, present_needs_rebuild};
pub use renderer_rhi::sync::MAX_FRAMES_IN_FLIGHT;
pub use texture_table::MAX_OBJECTS;
