use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::{
    data::CohortData,
    error::{PanelError, Result},
    metrics::{pearson, r2_score},
    model::LinearFit,
};

/// leave-one-out cross-validation: one fresh fit per held-out sample,
/// returning the out-of-fold predictions and their R2 against y
pub fn loo_r2(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(Array1<f64>, f64)> {
    let n = x.nrows();
    if n < 2 {
        return Err(PanelError::degenerate_model(format!(
            "leave-one-out needs at least 2 samples, got {}",
            n
        )));
    }
    if y.len() != n {
        return Err(PanelError::alignment(format!(
            "feature matrix has {} samples but target has {}",
            n,
            y.len()
        )));
    }

    let mut predictions = Array1::zeros(n);
    for held_out in 0..n {
        let keep: Vec<usize> = (0..n).filter(|&i| i != held_out).collect();
        let x_train = x.select(Axis(0), &keep);
        let y_train = y.select(Axis(0), &keep);

        let fit = LinearFit::fit(x_train.view(), y_train.view())?;
        let x_test = x.select(Axis(0), &[held_out]);
        predictions[held_out] = fit.predict(x_test.view())?[0];
    }

    let r2 = r2_score(y, predictions.view())?;
    Ok((predictions, r2))
}

/// greedy forward selection: each round adds the candidate that maximizes
/// LOO R2 of the grown panel (ties broken by first occurrence in remaining
/// candidate order), until every candidate has been ranked.
///
/// returns the full ranking and the per-round best scores; the score curve
/// is not monotone, which is what the knee-point truncation exploits.
pub fn forward_select(
    data: &CohortData,
    candidates: &[String],
) -> Result<(Vec<String>, Vec<f64>)> {
    let mut remaining: Vec<String> = candidates.to_vec();
    let mut selected: Vec<String> = Vec::with_capacity(candidates.len());
    let mut scores: Vec<f64> = Vec::with_capacity(candidates.len());

    for round in 0..candidates.len() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let mut trial = selected.clone();
            trial.push(candidate.clone());

            let design = data.design(&trial)?;
            let (_, r2) = loo_r2(design.view(), data.y())?;
            // strict comparison keeps the first of tied candidates
            if r2 > best_score {
                best_score = r2;
                best_idx = idx;
            }
        }

        let winner = remaining.remove(best_idx);
        log::debug!("forward selection round {}: added '{}' (LOO R2 = {:.4})", round + 1, winner, best_score);
        selected.push(winner);
        scores.push(best_score);
    }

    Ok((selected, scores))
}

/// truncate a forward-selection ranking at the first strict local maximum of
/// its score curve, considering `order` neighbors on each side with edge
/// positions clipped (so an endpoint can never qualify).
pub fn knee_truncate(selected: &[String], scores: &[f64], order: usize) -> Result<Vec<String>> {
    assert!(order >= 1, "knee order must be at least 1");
    if selected.len() != scores.len() {
        return Err(PanelError::alignment(format!(
            "selection has {} features but {} scores",
            selected.len(),
            scores.len()
        )));
    }

    let n = scores.len();
    for i in 0..n {
        let is_max = (1..=order).all(|shift| {
            let left = i.saturating_sub(shift);
            let right = (i + shift).min(n.saturating_sub(1));
            scores[i] > scores[left] && scores[i] > scores[right]
        });
        if is_max {
            return Ok(selected[..=i].to_vec());
        }
    }

    Err(PanelError::NoLocalMaximum { scanned: n, order })
}

/// backward elimination on coefficient significance: refit OLS with
/// intercept and drop the least significant feature while any non-intercept
/// p-value is >= alpha. pruning everything away is a valid outcome.
pub fn prune_by_significance(
    data: &CohortData,
    features: &[String],
    alpha: f64,
) -> Result<Vec<String>> {
    let mut current: Vec<String> = features.to_vec();

    for _ in 0..features.len() {
        if current.is_empty() {
            break;
        }

        let design = data.design(&current)?;
        let fit = LinearFit::fit(design.view(), data.y())?;

        let mut worst_idx = 0;
        let mut worst_p = f64::NEG_INFINITY;
        for (idx, &p) in fit.p_values().iter().enumerate() {
            if p > worst_p {
                worst_p = p;
                worst_idx = idx;
            }
        }

        if worst_p >= alpha {
            let dropped = current.remove(worst_idx);
            log::debug!("pruned '{}' (p = {:.4})", dropped, worst_p);
        } else {
            break;
        }
    }

    Ok(current)
}

/// cross-fluid transfer: keep the features whose CSF and plasma discovery
/// measurements correlate (Pearson p < alpha, strict) sample for sample,
/// then re-prune the kept set against the CSF regression basis.
pub fn select_cross_fluid(
    csf: &CohortData,
    plasma: &CohortData,
    significant_features: &[String],
    alpha: f64,
) -> Result<Vec<String>> {
    if csf.sample_names() != plasma.sample_names() {
        return Err(PanelError::alignment(
            "CSF and plasma discovery cohorts do not cover the same samples",
        ));
    }

    let mut correlated = Vec::new();
    for feature in significant_features {
        let csf_values = csf.feature_values(feature)?;
        let plasma_values = plasma.feature_values(feature)?;
        let (r, p) = pearson(csf_values, plasma_values)?;
        log::debug!("cross-fluid '{}': r = {:.3}, p = {:.4}", feature, r, p);
        if p < alpha {
            correlated.push(feature.clone());
        }
    }

    prune_by_significance(csf, &correlated, alpha)
}
