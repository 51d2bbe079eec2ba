//! Gaussian kernel construction.
//!
//! A [`Kernel`] is the `(2r+1) x (2r+1)` matrix of weights sampled from
//! the isotropic bivariate normal density at integer offsets. The
//! weights are not normalized; the convolution engine divides by the sum
//! of the weights it actually used.

use std::f64::consts::PI;

use crate::types::PipelineError;

/// Square matrix of Gaussian weights, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    radius: u32,
    weights: Vec<f64>,
}

impl Kernel {
    /// Build the kernel for `radius` and standard deviation `sigma`.
    ///
    /// The weight at offset `(i, j)` is
    /// `1 / (2π σ²) · exp(-(i² + j²) / (2σ²))`. A radius of zero yields
    /// a single-weight kernel, which makes the convolution an identity
    /// transform.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] if `sigma` is not a
    /// finite, strictly positive number.
    pub fn gaussian(radius: u32, sigma: f64) -> Result<Self, PipelineError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(PipelineError::InvalidParameter(format!(
                "sigma must be finite and positive, got {sigma}"
            )));
        }

        let r = i64::from(radius);
        let side = 2 * radius as usize + 1;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let scale = 1.0 / (PI * two_sigma_sq);

        let mut weights = Vec::with_capacity(side * side);
        for j in -r..=r {
            for i in -r..=r {
                #[allow(clippy::cast_precision_loss)]
                let dist_sq = (i * i + j * j) as f64;
                weights.push(scale * (-dist_sq / two_sigma_sq).exp());
            }
        }

        Ok(Self { radius, weights })
    }

    /// Kernel radius `r`; the matrix is `(2r+1)` on a side.
    #[must_use]
    pub const fn radius(&self) -> u32 {
        self.radius
    }

    /// Number of rows (and columns).
    #[cfg(test)]
    pub(crate) const fn side(&self) -> usize {
        2 * self.radius as usize + 1
    }

    /// Weight at offset `(dx, dy)` from the centre, both in `[-r, r]`.
    ///
    /// Returns `None` for offsets outside the kernel.
    #[cfg(test)]
    pub(crate) fn weight(&self, dx: i64, dy: i64) -> Option<f64> {
        let r = i64::from(self.radius);
        if dx.abs() > r || dy.abs() > r {
            return None;
        }
        let col = usize::try_from(dx + r).ok()?;
        let row = usize::try_from(dy + r).ok()?;
        self.weights.get(row * self.side() + col).copied()
    }

    /// Row-major weights, `(2r+1)²` entries.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Total mass of the kernel.
    ///
    /// This is the per-pixel denominator whenever the whole
    /// neighbourhood is in bounds.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn side_matches_radius() {
        for radius in 0..6 {
            let kernel = Kernel::gaussian(radius, 1.5).unwrap();
            let side = 2 * radius as usize + 1;
            assert_eq!(kernel.side(), side);
            assert_eq!(kernel.weights().len(), side * side);
        }
    }

    #[test]
    fn weights_are_strictly_positive() {
        let kernel = Kernel::gaussian(5, 0.8).unwrap();
        for &w in kernel.weights() {
            assert!(w > 0.0, "expected positive weight, got {w}");
        }
    }

    #[test]
    fn weights_are_symmetric() {
        for (radius, sigma) in [(1, 0.5), (3, 1.0), (4, 2.5), (6, 10.0)] {
            let kernel = Kernel::gaussian(radius, sigma).unwrap();
            let r = i64::from(radius);
            for j in -r..=r {
                for i in -r..=r {
                    let w = kernel.weight(i, j).unwrap();
                    // Point symmetry and transpose symmetry.
                    assert_eq!(w.to_bits(), kernel.weight(-i, -j).unwrap().to_bits());
                    assert_eq!(w.to_bits(), kernel.weight(j, i).unwrap().to_bits());
                }
            }
        }
    }

    #[test]
    fn centre_weight_matches_density() {
        let sigma = 2.0;
        let kernel = Kernel::gaussian(2, sigma).unwrap();
        let expected = 1.0 / (2.0 * PI * sigma * sigma);
        assert!((kernel.weight(0, 0).unwrap() - expected).abs() < 1e-15);
    }

    #[test]
    fn weights_decrease_away_from_centre() {
        let kernel = Kernel::gaussian(3, 1.0).unwrap();
        let centre = kernel.weight(0, 0).unwrap();
        let edge = kernel.weight(1, 0).unwrap();
        let corner = kernel.weight(3, 3).unwrap();
        assert!(centre > edge && edge > corner);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let a = Kernel::gaussian(4, 1.7).unwrap();
        let b = Kernel::gaussian(4, 1.7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn weight_outside_kernel_is_none() {
        let kernel = Kernel::gaussian(2, 1.0).unwrap();
        assert!(kernel.weight(3, 0).is_none());
        assert!(kernel.weight(0, -3).is_none());
    }

    #[test]
    fn zero_radius_is_single_weight() {
        let kernel = Kernel::gaussian(0, 1.0).unwrap();
        assert_eq!(kernel.weights().len(), 1);
        assert!((kernel.sum() - kernel.weight(0, 0).unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_positive_sigma() {
        for sigma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Kernel::gaussian(3, sigma);
            assert!(
                matches!(result, Err(PipelineError::InvalidParameter(_))),
                "sigma {sigma} should be rejected",
            );
        }
    }
}
