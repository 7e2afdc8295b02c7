//! Startup configuration.
//!
//! The configuration is assembled once from the command line and never
//! persisted. Every field has a default, so running without arguments
//! opens the standard 500x500 "Vulkan" window.
//!
//! # Example
//!
//! ```
//! use renderer_core::RendererConfig;
//!
//! let config = RendererConfig::from_args(["renderer", "--width", "800", "--height", "600"])
//!     .expect("valid arguments");
//! assert_eq!(config.window.width, 800);
//! assert_eq!(config.window.title, "Vulkan");
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};

/// Window creation parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 500,
            height: 500,
            resizable: false,
        }
    }
}

/// Everything the renderer needs to start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    pub window: WindowConfig,
    /// Request the Khronos validation layer.
    pub enable_validation: bool,
    /// Directory holding the compiled SPIR-V blobs.
    pub shader_dir: PathBuf,
    /// Directory texture file names are resolved against.
    pub texture_dir: PathBuf,
    /// File name of the texture at index 0.
    pub fallback_texture: String,
    /// Model loaded at startup.
    pub model_path: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            enable_validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("Shaders"),
            texture_dir: PathBuf::from("textures"),
            fallback_texture: "RGB_1.1001.png".to_string(),
            model_path: PathBuf::from("geo/Alfred_Retypology.obj"),
        }
    }
}

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(about = "Two-pass Vulkan renderer", long_about = None)]
pub struct CliArgs {
    /// Window title.
    #[arg(long, default_value = "Vulkan")]
    pub title: String,

    /// Window width in pixels.
    #[arg(long, default_value_t = 500)]
    pub width: u32,

    /// Window height in pixels.
    #[arg(long, default_value_t = 500)]
    pub height: u32,

    /// Model file loaded at startup.
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Allow the window to be resized.
    #[arg(long)]
    pub resizable: bool,

    /// Do not request validation layers, even in debug builds.
    #[arg(long)]
    pub no_validation: bool,
}

impl TryFrom<CliArgs> for RendererConfig {
    type Error = Error;

    fn try_from(args: CliArgs) -> Result<Self> {
        if args.width == 0 || args.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                args.width, args.height
            )));
        }

        let defaults = RendererConfig::default();
        Ok(Self {
            window: WindowConfig {
                title: args.title,
                width: args.width,
                height: args.height,
                resizable: args.resizable,
            },
            enable_validation: defaults.enable_validation && !args.no_validation,
            model_path: args.model.unwrap_or(defaults.model_path),
            ..defaults
        })
    }
}

impl RendererConfig {
    /// Parses a full argument list, program name first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown flags, unparsable numbers or a
    /// zero window size.
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = CliArgs::try_parse_from(args).map_err(|e| Error::Config(e.to_string()))?;
        Self::try_from(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_startup_window() {
        let config = RendererConfig::from_args(["renderer"]).unwrap();
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.window.title, "Vulkan");
        assert_eq!((config.window.width, config.window.height), (500, 500));
        assert!(!config.window.resizable);
        assert_eq!(config.shader_dir, PathBuf::from("Shaders"));
        assert_eq!(config.fallback_texture, "RGB_1.1001.png");
    }

    #[test]
    fn test_overrides() {
        let config = RendererConfig::from_args([
            "renderer",
            "--title",
            "Demo",
            "--width",
            "1280",
            "--height",
            "720",
            "--model",
            "scene.obj",
            "--resizable",
            "--no-validation",
        ])
        .unwrap();

        assert_eq!(config.window.title, "Demo");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.window.resizable);
        assert!(!config.enable_validation);
        assert_eq!(config.model_path, PathBuf::from("scene.obj"));
    }

    #[test]
    fn test_unknown_flag_is_config_error() {
        let err = RendererConfig::from_args(["renderer", "--fullscreen"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = RendererConfig::from_args(["renderer", "--width", "wide"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let err = RendererConfig::from_args(["renderer", "--height", "0"]).unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }
}
