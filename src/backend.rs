//! Backend selection module.
//!
//! This module defines the devices a tensor can be tagged with and the
//! process-wide default that new tensors pick up.
//!
//! # Supported Backends
//!
//! - `Cpu`: portable fallback path built on `rayon` (default).
//! - `Wgpu`: accelerated path using `wgpu` compute shaders (with the `wgpu` feature).
//!
//! The default is stored globally using an `AtomicU8`, enabling fast
//! switching between CPU and GPU tagging at runtime. Operators never read it
//! directly; they look at the tag of the tensor they were handed.

use core::convert::TryFrom;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Backend {
    /// Portable CPU fallback (default).
    #[default]
    Cpu = 0,
    /// GPU-accelerated backend using `wgpu`.
    Wgpu,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Wgpu => f.write_str("wgpu"),
        }
    }
}

/// Internal global state for the default backend.
///
/// Relaxed-enough ordering: the default only changes between workloads.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the backend that newly constructed tensors are tagged with.
///
/// # Example
///
/// ```
/// use styleops::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Wgpu);
/// assert_eq!(get_backend(), Backend::Wgpu);
/// set_backend(Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the backend newly constructed tensors are tagged with.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
