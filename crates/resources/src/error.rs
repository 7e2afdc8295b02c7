//! Error types for asset loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for asset loading operations.
///
/// Every variant carries the offending path so the message alone
/// identifies which file broke startup.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The model importer rejected the file.
    #[error("Failed to load model '{path}': {message}")]
    ModelLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Importer message.
        message: String,
    },

    /// The model file contains no meshes.
    #[error("Model '{0}' contains no meshes")]
    NoMeshes(PathBuf),

    /// The image decoder rejected the file.
    #[error("Failed to decode texture '{path}': {source}")]
    TextureDecode {
        /// Path to the image file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: image::ImageError,
    },

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
