use ndarray::ArrayView1;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{PanelError, Result};

/// coefficient of determination: 1 - SS_res / SS_tot
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    if y_true.len() < 2 {
        return Err(PanelError::degenerate_model("need at least 2 samples for r2"));
    }

    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    Ok(1.0 - ss_res / ss_tot)
}

/// Pearson correlation coefficient with a two-sided p-value from the exact
/// t transform on n-2 degrees of freedom
pub fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<(f64, f64)> {
    check_lengths(x, y)?;
    let n = x.len();
    if n < 2 {
        return Err(PanelError::degenerate_model("need at least 2 samples for correlation"));
    }

    let mean_x = x.mean().unwrap_or(0.0);
    let mean_y = y.mean().unwrap_or(0.0);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    Ok((r, correlation_p_value(r, n)?))
}

/// Spearman rank correlation: Pearson on average-tied ranks, same t-based
/// two-sided p-value
pub fn spearman(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<(f64, f64)> {
    check_lengths(x, y)?;
    let rank_x = average_ranks(x);
    let rank_y = average_ranks(y);
    pearson(ndarray::aview1(&rank_x), ndarray::aview1(&rank_y))
}

/// concordance correlation coefficient,
/// 2*cov / (var_true + var_pred + (mean_true - mean_pred)^2),
/// with significance from a t-statistic on n-1 degrees of freedom
pub fn concordance_correlation(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<(f64, f64)> {
    check_lengths(y_true, y_pred)?;
    let n = y_true.len();
    if n < 2 {
        return Err(PanelError::degenerate_model("need at least 2 samples for ccc"));
    }

    let mean_true = y_true.mean().unwrap_or(0.0);
    let mean_pred = y_pred.mean().unwrap_or(0.0);

    // population (not sample) moments, matching the closed-form definition
    let mut covariance = 0.0;
    let mut true_var = 0.0;
    let mut pred_var = 0.0;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let dt = t - mean_true;
        let dp = p - mean_pred;
        covariance += dt * dp;
        true_var += dt * dt;
        pred_var += dp * dp;
    }
    covariance /= n as f64;
    true_var /= n as f64;
    pred_var /= n as f64;

    let ccc = 2.0 * covariance / (true_var + pred_var + (mean_true - mean_pred).powi(2));

    let df = (n - 1) as f64;
    let one_minus = 1.0 - ccc * ccc;
    let p_value = if one_minus <= 0.0 {
        // |ccc| = 1: infinitely strong agreement signal
        0.0
    } else {
        let t_value = ccc * (df / one_minus).sqrt();
        let t_dist = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| PanelError::degenerate_model(e.to_string()))?;
        2.0 * (1.0 - t_dist.cdf(t_value.abs()))
    };

    Ok((ccc, p_value))
}

fn correlation_p_value(r: f64, n: usize) -> Result<f64> {
    if n < 3 {
        return Ok(f64::NAN);
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return Ok(0.0);
    }
    let t_stat = r * (df / denom).sqrt();
    let t_dist =
        StudentsT::new(0.0, 1.0, df).map_err(|e| PanelError::degenerate_model(e.to_string()))?;
    Ok(2.0 * (1.0 - t_dist.cdf(t_stat.abs())))
}

/// ranks starting at 1, ties receive the average of their positions
fn average_ranks(values: ArrayView1<f64>) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j hold tied values
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

fn check_lengths(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Result<()> {
    if a.len() != b.len() {
        return Err(PanelError::alignment(format!(
            "vector lengths differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// performance of a panel on one partition: r2 plus Spearman and CCC with
/// their p-values
#[derive(Debug, Clone)]
pub struct Performance {
    pub r2: f64,
    pub spearman_rho: f64,
    pub spearman_p: f64,
    pub ccc: f64,
    pub ccc_p: f64,
}

impl Performance {
    pub fn compute(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<Self> {
        let r2 = r2_score(y_true, y_pred)?;
        let (spearman_rho, spearman_p) = spearman(y_true, y_pred)?;
        let (ccc, ccc_p) = concordance_correlation(y_true, y_pred)?;

        Ok(Self { r2, spearman_rho, spearman_p, ccc, ccc_p })
    }

    pub fn print(&self, label: &str) {
        println!("{} performance", label);
        println!("  R2:           {:.6}", self.r2);
        println!("  Spearman rho: {:.6} (p = {:.4e})", self.spearman_rho, self.spearman_p);
        println!("  CCC:          {:.6} (p = {:.4e})", self.ccc, self.ccc_p);
    }
}
