//! Asset loading.
//!
//! This crate turns files on disk into CPU-side data for the renderer:
//! - OBJ models with their material texture names
//! - Images decoded to RGBA8

mod error;

pub mod model;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use model::{MeshData, ModelData};
pub use texture::ImageData;
