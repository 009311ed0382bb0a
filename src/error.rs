//! Error types for configuring and activating the hologram pass.
//!
//! Only configuration and resource failures are surfaced as errors. Problems
//! scoped to a single draw (a tint material that fails to compile, a missing
//! hologram material) are logged and the draw is skipped so that one broken
//! layer cannot hide the whole effect. Lifecycle misuse panics.

use thiserror::Error;

/// Invalid values in a [`HologramConfig`](crate::HologramConfig).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Scanline remap bounds must satisfy `0 <= min <= max <= 1`.
    #[error("Scanline remap bounds [{min}, {max}] must satisfy 0 <= min <= max <= 1")]
    ScanlineRemap { min: f32, max: f32 },

    /// A float parameter was NaN or infinite.
    #[error("Parameter '{0}' must be finite")]
    NonFinite(&'static str),

    /// A material declared no fragment entry points.
    #[error("Material '{0}' has no shader passes")]
    NoShaderPasses(String),
}

/// Failures while allocating the off-screen target set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// The viewport has a zero dimension or zero slices.
    #[error("Viewport {width}x{height} with {slices} slice(s) is empty")]
    EmptyViewport { width: u32, height: u32, slices: u32 },

    /// The requested extent exceeds what the device supports.
    #[error("Render target '{label}' ({width}x{height}x{slices}) exceeds device limits")]
    ExceedsLimits {
        label: &'static str,
        width: u32,
        height: u32,
        slices: u32,
    },

    /// wgpu reported an error while creating a render target.
    #[error("Failed to allocate render target '{label}': {message}")]
    Allocation { label: &'static str, message: String },

    /// The lines texture could not be loaded.
    #[error("Failed to load lines texture '{path}': {message}")]
    Texture { path: String, message: String },
}

/// Any error that prevents the hologram pass from activating.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HologramError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Result type for hologram pass activation.
pub type Result<T> = std::result::Result<T, HologramError>;
