//! Scene-side math for the renderer.
//!
//! This crate provides the [`Camera`] that produces the view and
//! projection matrices uploaded every frame.

pub mod camera;

pub use camera::Camera;
