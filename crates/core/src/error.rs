//! Startup and window-system errors.

use thiserror::Error;

/// Failures outside the GPU layer: bad command-line configuration, window
/// creation, and the Vulkan calls the platform crate makes directly.
#[derive(Error, Debug)]
pub enum Error {
    /// Surface creation or surface extension queries.
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    #[error("Window error: {0}")]
    Window(String),

    /// Rejected command-line arguments or settings.
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = Error::Config("width must be non-zero".to_string());
        assert_eq!(err.to_string(), "Config error: width must be non-zero");
        assert!(Error::Window("closed".into()).to_string().starts_with("Window"));
    }
}
