//! Strided GEMM kernel behind [`crate::Matrix`].
//!
//! Computes `C = alpha * A * B + beta * C` for `A: (m, k)`, `B: (k, n)`, `C: (m, n)` with
//! arbitrary row/column strides, so transposed operands never need to be materialized.
//!
//! - default: a plain triple loop
//! - feature `matrixmultiply`: delegates to `matrixmultiply::sgemm`

/// Row and column strides of one operand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Strides {
    pub row: usize,
    pub col: usize,
}

impl Strides {
    #[inline]
    pub(crate) fn row_major(cols: usize) -> Self {
        Self { row: cols, col: 1 }
    }

    /// Strides that read a row-major `(rows, cols)` buffer as its `(cols, rows)` transpose.
    #[inline]
    pub(crate) fn transposed(cols: usize) -> Self {
        Self { row: 1, col: cols }
    }
}

#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f32(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    sa: Strides,
    b: &[f32],
    sb: Strides,
    beta: f32,
    c: &mut [f32],
    sc: Strides,
) {
    debug_assert!(m > 0 && n > 0 && k > 0);
    debug_assert!(a.len() >= (m - 1) * sa.row + (k - 1) * sa.col + 1);
    debug_assert!(b.len() >= (k - 1) * sb.row + (n - 1) * sb.col + 1);
    debug_assert!(c.len() >= (m - 1) * sc.row + (n - 1) * sc.col + 1);

    #[cfg(feature = "matrixmultiply")]
    // SAFETY: the debug assertions above describe the bounds every caller in `matrix.rs`
    // upholds; `matrixmultiply` reads/writes exactly those strided elements.
    unsafe {
        matrixmultiply::sgemm(
            m,
            k,
            n,
            alpha,
            a.as_ptr(),
            sa.row as isize,
            sa.col as isize,
            b.as_ptr(),
            sb.row as isize,
            sb.col as isize,
            beta,
            c.as_mut_ptr(),
            sc.row as isize,
            sc.col as isize,
        );
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        let a0 = i * sa.row;
        for j in 0..n {
            let b0 = j * sb.col;
            let mut acc = 0.0_f32;
            for p in 0..k {
                acc = a[a0 + p * sa.col].mul_add(b[b0 + p * sb.row], acc);
            }
            let idx = i * sc.row + j * sc.col;
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}
