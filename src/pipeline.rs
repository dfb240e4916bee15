use std::collections::HashSet;

use ndarray::Array1;

use crate::{
    data::{CohortData, SampleTable},
    error::{PanelError, Result},
    metrics::Performance,
    model::LinearFit,
    selection::{forward_select, knee_truncate, prune_by_significance, select_cross_fluid},
};

/// row holding the severity score in corrected data tables
pub const TARGET_ROW: &str = "nARMSS";
const SEX_ROW: &str = "sex";
const AGE_ROW: &str = "age";
const TREATMENT_ROW: &str = "treatment_duration_index";

/// tuning knobs for a severity-model run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    knee_order: usize,
    alpha: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { knee_order: 5, alpha: 0.05 }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// neighborhood half-width for the knee-point search
    pub fn with_knee_order(mut self, order: usize) -> Self {
        assert!(order >= 1, "knee order must be at least 1");
        self.knee_order = order;
        self
    }

    /// significance threshold for pruning and cross-fluid retention
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha < 1.0, "alpha must be in (0,1)");
        self.alpha = alpha;
        self
    }

    pub fn knee_order(&self) -> usize {
        self.knee_order
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

/// a panel fit on the training cohort and evaluated on both partitions
#[derive(Debug, Clone)]
pub struct ScoredPanel {
    pub features: Vec<String>,
    pub fit: LinearFit,
    pub train_predictions: Array1<f64>,
    pub test_predictions: Array1<f64>,
    pub train: Performance,
    pub test: Performance,
}

/// fit the panel on `train` and score predictions against both cohorts
pub fn score_panel(train: &CohortData, test: &CohortData, features: &[String]) -> Result<ScoredPanel> {
    let train_design = train.design(features)?;
    let fit = LinearFit::fit(train_design.view(), train.y())?;

    let train_predictions = fit.predict(train_design.view())?;
    let test_design = test.design(features)?;
    let test_predictions = fit.predict(test_design.view())?;

    let train_perf = Performance::compute(train.y(), train_predictions.view())?;
    let test_perf = Performance::compute(test.y(), test_predictions.view())?;

    Ok(ScoredPanel {
        features: features.to_vec(),
        fit,
        train_predictions,
        test_predictions,
        train: train_perf,
        test: test_perf,
    })
}

/// CSF panel transferred to plasma: same features, scored against both
/// plasma cohorts
#[derive(Debug, Clone)]
pub struct PlasmaTransfer {
    pub discovery: ScoredPanel,
    pub replication: ScoredPanel,
}

/// everything one severity-model run produces
#[derive(Debug, Clone)]
pub struct SeverityReport {
    pub csf: ScoredPanel,
    pub treatment: Option<ScoredPanel>,
    pub plasma: Option<PlasmaTransfer>,
}

impl SeverityReport {
    pub fn print(&self) {
        println!("CSF model features: {:?}", self.csf.features);
        self.csf.fit.print_summary(&self.csf.features);
        self.csf.train.print("CSF discovery");
        self.csf.test.print("CSF replication");

        if let Some(treatment) = &self.treatment {
            println!();
            println!("Treatment effect on CSF model ({:?}):", treatment.features);
            treatment.train.print("CSF discovery + treatment");
            treatment.test.print("CSF replication + treatment");
        }

        if let Some(plasma) = &self.plasma {
            println!();
            println!("Plasma model features: {:?}", plasma.discovery.features);
            plasma.discovery.test.print("plasma discovery");
            plasma.replication.test.print("plasma replication");
        }
    }
}

/// the full severity-modeling run: forward selection with LOO scoring on the
/// CSF discovery cohort, knee-point truncation, significance pruning,
/// scoring on both cohorts, then the treatment-covariate variant and the
/// plasma transfer when those inputs are available.
pub fn run_severity_pipeline(
    csf: &SampleTable,
    plasma: Option<&SampleTable>,
    dep_proteins: &[String],
    config: &PipelineConfig,
) -> Result<SeverityReport> {
    let mut protein_set = dep_proteins.to_vec();
    protein_set.push(SEX_ROW.to_string());
    protein_set.push(AGE_ROW.to_string());
    // a repeated DEP identifier would put the same column into the design
    // twice; keep the first occurrence
    let mut seen = HashSet::new();
    protein_set.retain(|name| seen.insert(name.clone()));

    let split = csf.modeling_split(TARGET_ROW, &protein_set)?;
    log::info!(
        "CSF split: {} discovery / {} replication samples, {} candidate features",
        split.discovery.n_samples(),
        split.replication.n_samples(),
        protein_set.len()
    );

    let (ranked, scores) = forward_select(&split.discovery, &protein_set)?;
    let truncated = knee_truncate(&ranked, &scores, config.knee_order())?;
    log::info!("knee point keeps {} of {} ranked features", truncated.len(), ranked.len());

    let significant = prune_by_significance(&split.discovery, &truncated, config.alpha())?;
    if significant.is_empty() {
        return Err(PanelError::degenerate_model(
            "significance pruning removed every feature from the CSF panel",
        ));
    }
    log::info!("significant CSF panel: {:?}", significant);

    let csf_scored = score_panel(&split.discovery, &split.replication, &significant)?;

    let treatment = if csf.contains_feature(TREATMENT_ROW) {
        let mut with_treatment = protein_set.clone();
        with_treatment.push(TREATMENT_ROW.to_string());
        let treatment_split = csf.modeling_split(TARGET_ROW, &with_treatment)?;

        let mut features = significant.clone();
        features.push(TREATMENT_ROW.to_string());
        Some(score_panel(&treatment_split.discovery, &treatment_split.replication, &features)?)
    } else {
        None
    };

    let plasma_transfer = match plasma {
        Some(plasma_table) => {
            let plasma_split = plasma_table.modeling_split(TARGET_ROW, &protein_set)?;
            let plasma_features = select_cross_fluid(
                &split.discovery,
                &plasma_split.discovery,
                &significant,
                config.alpha(),
            )?;
            if plasma_features.is_empty() {
                return Err(PanelError::degenerate_model(
                    "no CSF feature transfers to plasma (cross-fluid correlation + pruning emptied the panel)",
                ));
            }
            log::info!("plasma panel: {:?}", plasma_features);

            // the plasma model keeps the CSF regression basis and is judged
            // on plasma measurements of both cohorts
            let discovery = score_panel(&split.discovery, &plasma_split.discovery, &plasma_features)?;
            let replication =
                score_panel(&split.discovery, &plasma_split.replication, &plasma_features)?;
            Some(PlasmaTransfer { discovery, replication })
        }
        None => None,
    };

    Ok(SeverityReport { csf: csf_scored, treatment, plasma: plasma_transfer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cohort;
    use ndarray::Array2;

    fn cohort(features: &[&str], rows: Vec<Vec<f64>>, y: Vec<f64>, cohort: Cohort) -> CohortData {
        let n = y.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let x = Array2::from_shape_vec((features.len(), n), flat).unwrap();
        let prefix = match cohort {
            Cohort::Discovery => "Dis",
            Cohort::Replication => "Rep",
        };
        let names = (0..n).map(|i| format!("{}_MS_{:02}", prefix, i)).collect();
        CohortData::new(
            cohort,
            features.iter().map(|s| s.to_string()).collect(),
            names,
            x,
            Array1::from(y),
        )
        .unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new().with_knee_order(2).with_alpha(0.01);
        assert_eq!(config.knee_order(), 2);
        assert_eq!(config.alpha(), 0.01);
    }

    #[test]
    #[should_panic(expected = "knee order")]
    fn test_config_rejects_zero_order() {
        let _ = PipelineConfig::new().with_knee_order(0);
    }

    #[test]
    fn test_score_panel_both_partitions() {
        let train = cohort(
            &["a"],
            vec![vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]],
            vec![2.1, 3.9, 6.1, 8.0, 9.9, 12.2],
            Cohort::Discovery,
        );
        let test = cohort(
            &["a"],
            vec![vec![1.5, 3.5, 5.5]],
            vec![3.1, 7.0, 10.8],
            Cohort::Replication,
        );

        let scored = score_panel(&train, &test, &["a".to_string()]).unwrap();
        assert_eq!(scored.train_predictions.len(), 6);
        assert_eq!(scored.test_predictions.len(), 3);
        assert!(scored.train.r2 > 0.95);
        assert!(scored.test.r2 > 0.9);
    }

    #[test]
    fn test_score_panel_missing_feature() {
        let train = cohort(
            &["a"],
            vec![vec![1.0, 2.0, 3.0]],
            vec![1.0, 2.0, 3.0],
            Cohort::Discovery,
        );
        let test = train.clone();
        assert!(score_panel(&train, &test, &["ghost".to_string()]).is_err());
    }
}
