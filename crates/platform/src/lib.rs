//! Window and surface handling for the renderer.

mod window;

pub use window::{Surface, Window};
