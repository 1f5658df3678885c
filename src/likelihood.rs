//! The external likelihood contract.
//!
//! The sampler never looks inside the likelihood; it only needs a value of
//! `-2 ln L` at a full parameter vector (lower is better). Implementations
//! must be deterministic so that a resumed run re-derives the same chain
//! state from the same points.

/// A user-supplied likelihood function.
///
/// Returns `-2 ln L` evaluated at `params`. The engine calls this once per
/// block proposal plus once at a fresh start.
pub trait LikelihoodFunction {
    /// Evaluates `-2 ln L` at the given full parameter vector.
    fn calculate(&self, params: &[f64]) -> f64;
}

/// Any plain closure over a parameter slice works as a likelihood.
///
/// ```rust
/// use blocked_mh::likelihood::LikelihoodFunction;
///
/// let chi2 = |p: &[f64]| p[0] * p[0];
/// assert_eq!(chi2.calculate(&[3.0]), 9.0);
/// ```
impl<F> LikelihoodFunction for F
where
    F: Fn(&[f64]) -> f64,
{
    fn calculate(&self, params: &[f64]) -> f64 {
        self(params)
    }
}
