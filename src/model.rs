use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{PanelError, Result};

/// ordinary least squares fit with intercept - coefficients, two-sided
/// coefficient p-values, fitted values. immutable once produced.
///
/// rank-deficient designs (more parameters than samples, duplicated columns)
/// resolve to the minimum-norm least-squares solution; their coefficient
/// p-values are NaN because the individual coefficients are not identified.
#[derive(Debug, Clone)]
pub struct LinearFit {
    coefficients: Array1<f64>, // one per feature, intercept excluded
    intercept: f64,
    p_values: Array1<f64>, // aligned with coefficients; NaN when residual df = 0
    intercept_p_value: f64,
    fitted: Array1<f64>,
    residual_df: usize,
}

impl LinearFit {
    /// fit y ~ 1 + X on a samples-by-features design matrix
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self> {
        let n = x.nrows();
        let k = x.ncols();

        if k == 0 {
            return Err(PanelError::degenerate_model("zero features in design matrix"));
        }
        if n < 2 {
            return Err(PanelError::degenerate_model(format!(
                "need at least 2 samples to fit, got {}",
                n
            )));
        }
        if y.len() != n {
            return Err(PanelError::alignment(format!(
                "design matrix has {} samples but target has {}",
                n,
                y.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
            return Err(PanelError::degenerate_model("non-finite value in regression input"));
        }

        // design with a leading column of ones for the intercept
        let p = k + 1;
        let mut design = Array2::ones((n, p));
        design.slice_mut(ndarray::s![.., 1..]).assign(&x);

        let xtx = design.t().dot(&design);
        let xty = design.t().dot(&y);

        // full-rank designs go through the exact normal-equation solve;
        // rank-deficient ones (more parameters than samples, duplicated
        // columns) fall back to the minimum-norm least-squares solution
        let mut inverse_diagonal: Option<Array1<f64>> = None;
        let (beta, rank) = match solve_linear_system(&xtx, &xty) {
            Ok(beta) => (beta, p),
            Err(PanelError::DegenerateModel { .. }) => {
                let pseudo = pseudo_solve(&xtx, &xty);
                inverse_diagonal = pseudo.inverse_diagonal;
                (pseudo.beta, pseudo.rank)
            }
            Err(other) => return Err(other),
        };

        let fitted = design.dot(&beta);
        let rss: f64 = y
            .iter()
            .zip(fitted.iter())
            .map(|(yi, fi)| (yi - fi).powi(2))
            .sum();
        let residual_df = n.saturating_sub(rank);

        // standard errors from the diagonal of (X'X)^-1; significance is
        // only meaningful when every coefficient is identified
        let mut p_values = Array1::from_elem(p, f64::NAN);
        if rank == p && residual_df > 0 {
            let sigma2 = rss / residual_df as f64;
            let t_dist = StudentsT::new(0.0, 1.0, residual_df as f64)
                .map_err(|e| PanelError::degenerate_model(e.to_string()))?;

            for j in 0..p {
                let variance_scale = match &inverse_diagonal {
                    Some(diag) => diag[j],
                    None => {
                        let mut unit = Array1::zeros(p);
                        unit[j] = 1.0;
                        solve_linear_system(&xtx, &unit)?[j]
                    }
                };
                let se = (sigma2 * variance_scale).sqrt();

                let t_stat = beta[j] / se;
                p_values[j] = if t_stat.is_finite() {
                    2.0 * (1.0 - t_dist.cdf(t_stat.abs()))
                } else if se == 0.0 && beta[j] != 0.0 {
                    // exact fit, coefficient pinned by the data
                    0.0
                } else {
                    f64::NAN
                };
            }
        }

        Ok(Self {
            coefficients: beta.slice(ndarray::s![1..]).to_owned(),
            intercept: beta[0],
            p_values: p_values.slice(ndarray::s![1..]).to_owned(),
            intercept_p_value: p_values[0],
            fitted,
            residual_df,
        })
    }

    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// two-sided p-values of the non-intercept coefficients
    pub fn p_values(&self) -> ArrayView1<'_, f64> {
        self.p_values.view()
    }

    pub fn intercept_p_value(&self) -> f64 {
        self.intercept_p_value
    }

    /// in-sample predictions from the fit
    pub fn fitted(&self) -> ArrayView1<'_, f64> {
        self.fitted.view()
    }

    pub fn residual_df(&self) -> usize {
        self.residual_df
    }

    /// predict targets for a new samples-by-features matrix
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(PanelError::alignment(format!(
                "feature count mismatch: fit has {}, input has {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// print a coefficient table; `feature_names` must match the design
    /// columns the model was fit on
    pub fn print_summary(&self, feature_names: &[String]) {
        println!("{:<24} {:>12} {:>12}", "term", "coefficient", "p-value");
        println!("{:-<50}", "");
        println!(
            "{:<24} {:>12.6} {:>12.6}",
            "(intercept)",
            self.intercept,
            self.intercept_p_value
        );
        for (i, name) in feature_names.iter().enumerate().take(self.coefficients.len()) {
            println!(
                "{:<24} {:>12.6} {:>12.6}",
                name, self.coefficients[i], self.p_values[i]
            );
        }
    }
}

/// solve Ax = b by Gaussian elimination with partial pivoting; pivots below
/// a scale-relative threshold count as singular
fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(PanelError::alignment("linear system dimensions mismatch"));
    }

    let tolerance = 1e-10 * a.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let mut a_copy = a.clone();
    let mut b_copy = b.clone();

    // forward elimination
    for i in 0..n {
        let mut max_row = i;
        for k in i + 1..n {
            if a_copy[[k, i]].abs() > a_copy[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if a_copy[[max_row, i]].abs() < tolerance {
            return Err(PanelError::degenerate_model(
                "design matrix is singular (collinear or too few samples)",
            ));
        }

        if max_row != i {
            for j in 0..n {
                a_copy.swap([i, j], [max_row, j]);
            }
            b_copy.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    // back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

struct PseudoSolve {
    beta: Array1<f64>,
    rank: usize,
    inverse_diagonal: Option<Array1<f64>>,
}

/// minimum-norm least-squares solution of the normal equations through an
/// eigendecomposition of X'X, discarding near-zero eigenvalues. when the
/// matrix turns out to have full numerical rank, the diagonal of its inverse
/// comes along for the standard errors.
fn pseudo_solve(xtx: &Array2<f64>, xty: &Array1<f64>) -> PseudoSolve {
    let p = xty.len();
    let (eigenvalues, eigenvectors) = symmetric_eigen(xtx);
    let cutoff = eigenvalues.iter().fold(0.0_f64, |acc, &v| acc.max(v)) * 1e-10;

    let mut beta = Array1::zeros(p);
    let mut rank = 0;
    for (k, &lambda) in eigenvalues.iter().enumerate() {
        if lambda <= cutoff {
            continue;
        }
        rank += 1;
        let v = eigenvectors.column(k);
        beta.scaled_add(v.dot(xty) / lambda, &v);
    }

    let inverse_diagonal = if rank == p {
        let diag = Array1::from_iter((0..p).map(|j| {
            (0..p)
                .filter(|&k| eigenvalues[k] > cutoff)
                .map(|k| eigenvectors[[j, k]].powi(2) / eigenvalues[k])
                .sum::<f64>()
        }));
        Some(diag)
    } else {
        None
    };

    PseudoSolve { beta, rank, inverse_diagonal }
}

/// eigenvalues and eigenvectors of a symmetric matrix by cyclic Jacobi
/// rotations. sized for the small normal-equation matrices this crate builds.
fn symmetric_eigen(matrix: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::eye(n);
    let scale = a.iter().fold(1.0_f64, |acc, x| acc.max(x.abs()));

    for _ in 0..50 {
        let off: f64 = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .map(|(i, j)| a[[i, j]] * a[[i, j]])
            .sum();
        if off.sqrt() <= 1e-14 * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[[p, q]].abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * a[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = Array1::from_iter((0..n).map(|i| a[[i, i]]));
    (eigenvalues, v)
}
