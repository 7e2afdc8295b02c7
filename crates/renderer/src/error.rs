//! Renderer error types.

use renderer_resources::ResourceError;
use renderer_rhi::RhiError;
use thiserror::Error;

use crate::frame_sync::SlotState;

/// Error type for the frame-lifecycle engine.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Vulkan-level failure.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Asset loading failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Window system or configuration failure.
    #[error(transparent)]
    Core(#[from] renderer_core::Error),

    /// No mesh model was created with this id.
    #[error("No mesh model with id {0}")]
    InvalidModel(usize),

    /// A frame slot was started while its previous frame is still running.
    #[error("Frame slot {slot} is still in use ({state:?})")]
    SlotInUse {
        /// Frame-in-flight slot index.
        slot: usize,
        /// State the slot was found in.
        state: SlotState,
    },

    /// A frame slot was driven out of order.
    #[error("Frame slot {slot} cannot go from {from:?} to {to:?}")]
    InvalidSlotTransition {
        /// Frame-in-flight slot index.
        slot: usize,
        /// Current state.
        from: SlotState,
        /// Requested state.
        to: SlotState,
    },
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
