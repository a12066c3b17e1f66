//! Vulkan backend error types
//!
//! Every failure in the frame core surfaces as a [`VulkanError`] at the point of
//! detection. Construction failures name the object that could not be created so
//! start-up diagnostics point straight at the culprit.

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A backend object could not be created
    #[error("Failed to create {object}: {result:?}")]
    CreationFailed {
        /// Human readable name of the object kind (e.g. "framebuffer")
        object: &'static str,
        /// Result code returned by the backend
        result: vk::Result,
    },

    /// A pipeline key was bound before it was resolved
    #[error("Pipeline 0x{key:016x} not found")]
    PipelineNotResolved {
        /// Raw key of the requested graphics state
        key: u64,
    },

    /// Descriptor pool has no capacity left in this frame cycle
    #[error("Descriptor pool exhausted ({capacity} sets per cycle)")]
    DescriptorPoolExhausted {
        /// Number of sets the pool can hold between resets
        capacity: u32,
    },

    /// A binding was added after the layout was compiled
    #[error("Descriptor set layout is frozen after compilation")]
    LayoutFrozen,

    /// A raw graphics state flag does not belong to its enumeration
    #[error("Invalid GraphicsState: {field} = {value:#04x}")]
    InvalidGraphicsState {
        /// Name of the offending field
        field: &'static str,
        /// Raw flag value that failed to decode
        value: u8,
    },

    /// A descriptor set was used after its pool was reset
    #[error("Descriptor set used after its pool was reset")]
    StaleDescriptorSet,

    /// A descriptor update or bind did not match the layout
    #[error("Invalid descriptor binding {binding}: {reason}")]
    InvalidBinding {
        /// Binding index (or dynamic offset index) that was rejected
        binding: u32,
        /// Why it was rejected
        reason: String,
    },

    /// Viewport images were used before `create_images`
    #[error("Viewport images have not been created")]
    ViewportNotReady,

    /// `acquire` was called twice without a `release` in between
    #[error("Viewport image {index} is already acquired")]
    ViewportAlreadyAcquired {
        /// Index of the image that is still held
        index: u32,
    },

    /// `release` was called without a matching `acquire`
    #[error("Viewport has no acquired image to release")]
    ViewportNotAcquired,

    /// A bounded wait expired
    #[error("Timed out waiting for {what}")]
    Timeout {
        /// What was being waited on
        what: &'static str,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

impl VulkanError {
    /// Build a `map_err` adapter that tags a backend result with the object name
    pub fn creation(object: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::CreationFailed { object, result }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
