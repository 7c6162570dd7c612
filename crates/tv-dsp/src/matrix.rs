//! Mixing matrices
//!
//! Square matrices are random orthogonal (energy preserving, so the feedback
//! loop neither grows nor loses energy on its own). Rectangular matrices are the
//! top-left block of an orthogonal matrix of size `max(rows, cols)`, used to
//! couple host channels to FDN lines and back.

use log::debug;
use nalgebra::DMatrix;
use rand::Rng;
use tv_core::{Sample, TvError, TvResult};

/// Dense row-major mixing matrix
#[derive(Debug, Clone, PartialEq)]
pub struct MixingMatrix {
    rows: usize,
    cols: usize,
    weights: Vec<Sample>,
}

/// Random orthogonal matrix of size `n` (Q of a QR factorisation, `diag(R) ≥ 0`)
fn random_orthogonal<R: Rng>(n: usize, rng: &mut R) -> DMatrix<f64> {
    let random = DMatrix::<f64>::from_fn(n, n, |_, _| rng.random_range(-1.0..1.0));
    let qr = random.qr();
    let r = qr.r();
    let mut q = qr.q();

    // Householder QR leaves the sign of each column free; pin it down
    for j in 0..n {
        if r[(j, j)] < 0.0 {
            q.column_mut(j).neg_mut();
        }
    }
    q
}

impl MixingMatrix {
    /// Square orthogonal matrix of order `n`
    pub fn orthogonal<R: Rng>(n: usize, rng: &mut R) -> TvResult<Self> {
        Self::coupling(n, n, rng)
    }

    /// `rows × cols` projection of an orthogonal matrix of size `max(rows, cols)`
    pub fn coupling<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> TvResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TvError::InvalidParam(format!(
                "mixing matrix dimensions must be non-zero, got {rows}x{cols}"
            )));
        }

        let size = rows.max(cols);
        let q = random_orthogonal(size, rng);

        let mut weights = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                weights.push(q[(row, col)] as Sample);
            }
        }

        debug!("Generated {rows}x{cols} mixing matrix from order-{size} orthogonal basis");
        Ok(Self { rows, cols, weights })
    }

    /// Identity-shaped matrix (ones on the diagonal)
    pub fn identity(rows: usize, cols: usize) -> Self {
        let mut weights = vec![0.0; rows * cols];
        for i in 0..rows.min(cols) {
            weights[i * cols + i] = 1.0;
        }
        Self { rows, cols, weights }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn weight(&self, row: usize, col: usize) -> Sample {
        self.weights[row * self.cols + col]
    }

    /// Row-major weights
    #[inline]
    pub fn weights(&self) -> &[Sample] {
        &self.weights
    }

    /// Regenerate only if the dimensions differ from the current ones.
    ///
    /// Returns true when a new matrix was drawn.
    pub fn prepare_dimensions<R: Rng>(
        &mut self,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> TvResult<bool> {
        if rows == self.rows && cols == self.cols {
            return Ok(false);
        }
        *self = Self::coupling(rows, cols, rng)?;
        Ok(true)
    }

    /// `output = M · input`, dimensions checked in debug builds only
    #[inline]
    pub fn process_frame(&self, output: &mut [Sample], input: &[Sample]) {
        debug_assert_eq!(output.len(), self.rows);
        debug_assert_eq!(input.len(), self.cols);

        for (out, row) in output.iter_mut().zip(self.weights.chunks_exact(self.cols)) {
            *out = row.iter().zip(input).map(|(&w, &x)| w * x).sum();
        }
    }

    /// `output = M · input` with dimension validation
    pub fn process(&self, output: &mut [Sample], input: &[Sample]) -> TvResult<()> {
        if input.len() != self.cols {
            return Err(TvError::ChannelMismatch {
                expected: self.cols,
                got: input.len(),
            });
        }
        if output.len() != self.rows {
            return Err(TvError::ChannelMismatch {
                expected: self.rows,
                got: output.len(),
            });
        }
        self.process_frame(output, input);
        Ok(())
    }

    /// Largest deviation of `M·Mᵀ` from the identity, computed in f64
    pub fn orthogonality_error(&self) -> f64 {
        let mut worst = 0.0_f64;
        for i in 0..self.rows {
            for j in 0..self.rows {
                let dot: f64 = (0..self.cols)
                    .map(|k| self.weight(i, k) as f64 * self.weight(j, k) as f64)
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                worst = worst.max((dot - expected).abs());
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_square_matrices_are_orthogonal() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for n in [2, 4, 8, 16, 32, 64] {
            let m = MixingMatrix::orthogonal(n, &mut rng).unwrap();
            assert_eq!((m.rows(), m.cols()), (n, n));
            assert!(m.orthogonality_error() < 1e-5, "order {n}: {}", m.orthogonality_error());
        }
    }

    #[test]
    fn test_same_seed_same_matrix() {
        let a = MixingMatrix::orthogonal(8, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        let b = MixingMatrix::orthogonal(8, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        let c = MixingMatrix::orthogonal(8, &mut ChaCha8Rng::seed_from_u64(43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_preserves_energy() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let m = MixingMatrix::orthogonal(16, &mut rng).unwrap();
        let input: Vec<Sample> = (0..16).map(|i| (i as Sample * 0.37).sin()).collect();
        let mut output = vec![0.0; 16];
        m.process(&mut output, &input).unwrap();

        let energy_in: f32 = input.iter().map(|x| x * x).sum();
        let energy_out: f32 = output.iter().map(|x| x * x).sum();
        assert_relative_eq!(energy_in, energy_out, max_relative = 1e-5);
    }

    #[test]
    fn test_coupling_rows_are_orthonormal() {
        // Wide: rows of a truncated orthogonal matrix stay orthonormal
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let wide = MixingMatrix::coupling(2, 16, &mut rng).unwrap();
        assert_eq!((wide.rows(), wide.cols()), (2, 16));
        let row_norm: f64 = (0..16).map(|k| (wide.weight(0, k) as f64).powi(2)).sum();
        assert!(row_norm < 1.0 + 1e-5);

        // Tall: columns are orthonormal
        let tall = MixingMatrix::coupling(16, 2, &mut rng).unwrap();
        for a in 0..2 {
            for b in 0..2 {
                let dot: f64 = (0..16)
                    .map(|k| tall.weight(k, a) as f64 * tall.weight(k, b) as f64)
                    .sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_process_validates_dimensions() {
        let m = MixingMatrix::coupling(4, 2, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        let mut out = [0.0; 4];
        assert!(m.process(&mut out, &[1.0, 2.0, 3.0]).is_err());
        assert!(m.process(&mut out[..3], &[1.0, 2.0]).is_err());
        assert!(m.process(&mut out, &[1.0, 2.0]).is_ok());
        assert!(MixingMatrix::coupling(0, 2, &mut ChaCha8Rng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn test_prepare_dimensions_only_on_change() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut m = MixingMatrix::coupling(8, 2, &mut rng).unwrap();
        let before = m.clone();
        assert!(!m.prepare_dimensions(8, 2, &mut rng).unwrap());
        assert_eq!(m, before);
        assert!(m.prepare_dimensions(8, 6, &mut rng).unwrap());
        assert_eq!(m.cols(), 6);
    }

    #[test]
    fn test_identity() {
        let m = MixingMatrix::identity(3, 3);
        let mut out = [0.0; 3];
        m.process(&mut out, &[1.0, -2.0, 0.5]).unwrap();
        assert_eq!(out, [1.0, -2.0, 0.5]);
    }
}
