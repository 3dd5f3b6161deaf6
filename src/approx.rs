//! Utilities to approximate equality of floating point values.
//!
//! The fallback path is the source of truth; the accelerated path and the
//! finite-difference gradient checks are compared against it with these helpers.

/// The max relative error accepted between execution paths.
pub const F32_PATH_TOLERANCE: f32 = 1e-4;

/// The expected relative error of a well-conditioned f32 computation.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected relative error on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// The approximated equality enumerated.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon.
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Checks the relative distance based off epsilon.
pub trait RelativeEq<Rhs: ?Sized> {
    /// Enumerates the equality of `self`.
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

/// `|a - b| / max(1, |a|, |b|)`: relative for large values, absolute near zero.
pub fn relative_error(a: f32, b: f32) -> f32 {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() / scale
}

impl RelativeEq<Self> for f32 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        let dif = relative_error(*self, *rhs);

        if dif < F32_MIN_ERROR {
            ApproxEquality::Precise
        } else if dif < F32_AVG_ERROR {
            ApproxEquality::Partial
        } else if dif < F32_PATH_TOLERANCE {
            ApproxEquality::Relative
        } else {
            ApproxEquality::Scarce
        }
    }
}

impl<T: RelativeEq<U>, U> RelativeEq<[U]> for [T] {
    /// The worst rating over all pairs; `Scarce` on a length mismatch.
    fn approx_eq(&self, rhs: &[U]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        let mut eq = ApproxEquality::Precise;
        for (t_val, u_val) in self.iter().zip(rhs.iter()) {
            eq = eq.max(t_val.approx_eq(u_val));
            if eq == ApproxEquality::Scarce {
                break;
            }
        }
        eq
    }
}

/// True when every pair is within [`F32_PATH_TOLERANCE`].
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) <= ApproxEquality::Relative
}

/// Largest [`relative_error`] over paired elements.
///
/// # Panics
/// Panics if the slices differ in length.
pub fn max_relative_error(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "length mismatch");
    a.iter()
        .zip(b)
        .map(|(&x, &y)| relative_error(x, y))
        .fold(0.0, f32::max)
}
