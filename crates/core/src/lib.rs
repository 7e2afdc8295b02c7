//! Core utilities for the Vulkan renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame clock for animation
//! - Startup configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{CliArgs, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameClock, MAX_FRAME_STEP};
