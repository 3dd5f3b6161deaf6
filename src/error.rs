//! Error taxonomy shared by every operator.
//!
//! Shape and parameter errors are raised at call entry, before any buffer is
//! allocated or any kernel is launched. They point at a bug in the calling layer
//! and are never retried. Device unavailability is normally absorbed by the
//! fallback path and only surfaces under [`FallbackPolicy::Strict`].
//!
//! [`FallbackPolicy::Strict`]: crate::ops::dispatch::FallbackPolicy::Strict

/// Convenience alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// All errors an operator call can return.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A computed intermediate or output dimension is non-positive, a factor is
    /// zero, or a tensor/kernel is malformed.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// A tensor's shape disagrees with the shape implied by the forward formula.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Shape the operator derived.
        expected: Vec<usize>,
        /// Shape the caller supplied.
        got: Vec<usize>,
    },

    /// The accelerated path was required but cannot run this call.
    #[error("accelerated path unavailable: {0}")]
    UnsupportedDevice(String),

    /// An activation parameter is non-positive or not finite.
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },
}

impl Error {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }
}
