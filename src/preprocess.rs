use std::collections::{HashMap, HashSet};

use ndarray::Array2;

use crate::data::{Cohort, Group, SampleId, SampleTable, Tissue};
use crate::error::{PanelError, Result};

/// one long-format NPX measurement
#[derive(Debug, Clone)]
pub struct NpxRecord {
    pub olink_id: String,
    pub sample_id: String,
    pub npx: f64,
}

/// per-assay annotation: gene symbol plus the limit-of-detection flag in
/// each measured fluid
#[derive(Debug, Clone)]
pub struct AssayAnnotation {
    pub olink_id: String,
    pub symbol: String,
    pub below_lod_csf: bool,
    pub below_lod_plasma: bool,
}

impl AssayAnnotation {
    fn below_lod(&self, tissue: Tissue) -> bool {
        match tissue {
            Tissue::Csf => self.below_lod_csf,
            Tissue::Plasma => self.below_lod_plasma,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Female,
    Male,
}

/// clinical annotation for one sample; missing scores stay missing (NaN)
/// and drop the sample from modeling later on
#[derive(Debug, Clone)]
pub struct ClinicalRecord {
    pub sample_id: String,
    pub sex: Sex,
    pub age: f64,
    pub neda_2years: Option<f64>,
    pub narmss: Option<f64>,
    pub treatment_duration: Option<f64>,
}

/// pivot long-format NPX records into a proteins-by-samples table. columns
/// follow `sample_order` (typically the clinical table order), keeping only
/// samples that actually carry measurements; assay rows keep first-seen
/// order.
pub fn pivot_long(records: &[NpxRecord], sample_order: &[String]) -> Result<SampleTable> {
    let mut features: Vec<String> = Vec::new();
    let mut feature_pos: HashMap<&str, usize> = HashMap::new();
    let mut measured: HashSet<&str> = HashSet::new();
    for record in records {
        if !feature_pos.contains_key(record.olink_id.as_str()) {
            feature_pos.insert(record.olink_id.as_str(), features.len());
            features.push(record.olink_id.clone());
        }
        measured.insert(record.sample_id.as_str());
    }

    let samples: Vec<SampleId> = sample_order
        .iter()
        .filter(|name| measured.contains(name.as_str()))
        .map(|name| SampleId::parse(name))
        .collect::<Result<_>>()?;
    let sample_pos: HashMap<&str, usize> = samples
        .iter()
        .enumerate()
        .map(|(j, id)| (id.name.as_str(), j))
        .collect();

    let mut values = Array2::from_elem((features.len(), samples.len()), f64::NAN);
    for record in records {
        let i = feature_pos[record.olink_id.as_str()];
        if let Some(&j) = sample_pos.get(record.sample_id.as_str()) {
            values[[i, j]] = record.npx;
        }
    }

    log::info!("pivoted {} NPX records into {} assays x {} samples", records.len(), features.len(), samples.len());
    SampleTable::new(features, samples, values)
}

/// drop assays flagged below the limit of detection in the table's fluid,
/// rename the survivors to gene symbols, and average rows that map to the
/// same symbol. every assay in the table must be annotated.
pub fn apply_lod_filter(
    table: &SampleTable,
    annotations: &[AssayAnnotation],
    tissue: Tissue,
) -> Result<SampleTable> {
    let by_id: HashMap<&str, &AssayAnnotation> = annotations
        .iter()
        .map(|a| (a.olink_id.as_str(), a))
        .collect();

    // symbol -> list of surviving assay row indices
    let mut symbols: Vec<String> = Vec::new();
    let mut rows_per_symbol: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, assay) in table.features().iter().enumerate() {
        let annotation = by_id
            .get(assay.as_str())
            .ok_or_else(|| PanelError::missing_feature(assay.clone()))?;
        if annotation.below_lod(tissue) {
            continue;
        }
        let entry = rows_per_symbol.entry(annotation.symbol.clone()).or_default();
        if entry.is_empty() {
            symbols.push(annotation.symbol.clone());
        }
        entry.push(i);
    }

    let n_samples = table.n_samples();
    let mut values = Array2::from_elem((symbols.len(), n_samples), f64::NAN);
    let source = table.values();
    for (out_i, symbol) in symbols.iter().enumerate() {
        for j in 0..n_samples {
            let finite: Vec<f64> = rows_per_symbol[symbol]
                .iter()
                .map(|&i| source[[i, j]])
                .filter(|v| v.is_finite())
                .collect();
            if !finite.is_empty() {
                values[[out_i, j]] = finite.iter().sum::<f64>() / finite.len() as f64;
            }
        }
    }

    log::info!(
        "LOD filter kept {} of {} assays ({} gene symbols)",
        rows_per_symbol.values().map(|v| v.len()).sum::<usize>(),
        table.n_features(),
        symbols.len()
    );
    SampleTable::new(symbols, table.samples().to_vec(), values)
}

/// per-assay healthy-control normalization: within each cohort, subtract the
/// control mean and divide by the control standard deviation (sample sd).
/// each cohort needs at least two healthy controls.
pub fn control_correct(table: &SampleTable) -> Result<SampleTable> {
    let hc_columns = |cohort: Cohort| -> Vec<usize> {
        table
            .samples()
            .iter()
            .enumerate()
            .filter(|(_, id)| id.cohort == cohort && id.group == Group::HealthyControl)
            .map(|(j, _)| j)
            .collect()
    };
    let dis_hc = hc_columns(Cohort::Discovery);
    let rep_hc = hc_columns(Cohort::Replication);
    if dis_hc.len() < 2 || rep_hc.len() < 2 {
        return Err(PanelError::degenerate_model(format!(
            "control correction needs at least 2 healthy controls per cohort (found {} discovery, {} replication)",
            dis_hc.len(),
            rep_hc.len()
        )));
    }

    let source = table.values();
    let mut values = Array2::from_elem((table.n_features(), table.n_samples()), f64::NAN);

    for i in 0..table.n_features() {
        let stats = |cols: &[usize]| -> (f64, f64) {
            let vals: Vec<f64> = cols.iter().map(|&j| source[[i, j]]).collect();
            let n = vals.len() as f64;
            let mean = vals.iter().sum::<f64>() / n;
            let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            (mean, var.sqrt())
        };
        let (dis_mean, dis_sd) = stats(&dis_hc);
        let (rep_mean, rep_sd) = stats(&rep_hc);

        for (j, id) in table.samples().iter().enumerate() {
            let (mean, sd) = match id.cohort {
                Cohort::Discovery => (dis_mean, dis_sd),
                Cohort::Replication => (rep_mean, rep_sd),
            };
            values[[i, j]] = (source[[i, j]] - mean) / sd;
        }
    }

    SampleTable::new(table.features().to_vec(), table.samples().to_vec(), values)
}

/// append clinical rows (sex encoded f=1/m=0, age, NEDA status, nARMSS,
/// treatment duration) and an ms_control indicator row to a protein table.
/// every sample column must have a clinical record.
pub fn append_clinical_rows(table: &SampleTable, records: &[ClinicalRecord]) -> Result<SampleTable> {
    let by_id: HashMap<&str, &ClinicalRecord> =
        records.iter().map(|r| (r.sample_id.as_str(), r)).collect();

    let n_samples = table.n_samples();
    let clinical_rows = [
        "sex",
        "age",
        "NEDA_EDA_2years",
        "nARMSS",
        "treatment_duration_index",
        "ms_control",
    ];

    let mut appended = Array2::from_elem((clinical_rows.len(), n_samples), f64::NAN);
    for (j, id) in table.samples().iter().enumerate() {
        let record = by_id.get(id.name.as_str()).ok_or_else(|| {
            PanelError::alignment(format!("sample '{}' has no clinical record", id.name))
        })?;

        appended[[0, j]] = match record.sex {
            Sex::Female => 1.0,
            Sex::Male => 0.0,
        };
        appended[[1, j]] = record.age;
        appended[[2, j]] = record.neda_2years.unwrap_or(f64::NAN);
        appended[[3, j]] = record.narmss.unwrap_or(f64::NAN);
        appended[[4, j]] = record.treatment_duration.unwrap_or(f64::NAN);
        appended[[5, j]] = match id.group {
            Group::Patient => 1.0,
            Group::HealthyControl => 0.0,
        };
    }

    let mut features = table.features().to_vec();
    features.extend(clinical_rows.iter().map(|s| s.to_string()));

    let mut values = Array2::from_elem((features.len(), n_samples), f64::NAN);
    values
        .slice_mut(ndarray::s![..table.n_features(), ..])
        .assign(&table.values());
    values
        .slice_mut(ndarray::s![table.n_features().., ..])
        .assign(&appended);

    SampleTable::new(features, table.samples().to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(olink_id: &str, sample_id: &str, npx: f64) -> NpxRecord {
        NpxRecord { olink_id: olink_id.to_string(), sample_id: sample_id.to_string(), npx }
    }

    #[test]
    fn test_pivot_long_to_wide() {
        let records = vec![
            record("OID1", "Dis_MS_01", 1.0),
            record("OID1", "Dis_MS_02", 2.0),
            record("OID2", "Dis_MS_01", 3.0),
        ];
        let order = vec!["Dis_MS_01".to_string(), "Dis_MS_02".to_string()];

        let table = pivot_long(&records, &order).unwrap();
        assert_eq!(table.n_features(), 2);
        assert_eq!(table.n_samples(), 2);
        assert_eq!(table.feature_row("OID1").unwrap().to_vec(), vec![1.0, 2.0]);
        assert_eq!(table.feature_row("OID2").unwrap()[0], 3.0);
        // OID2 was never measured for the second sample
        assert!(table.feature_row("OID2").unwrap()[1].is_nan());
    }

    #[test]
    fn test_pivot_restricts_to_known_samples() {
        let records = vec![
            record("OID1", "Dis_MS_01", 1.0),
            record("OID1", "Dis_MS_99", 9.0), // not in the clinical order
        ];
        let order = vec!["Dis_MS_01".to_string()];

        let table = pivot_long(&records, &order).unwrap();
        assert_eq!(table.n_samples(), 1);
    }

    #[test]
    fn test_lod_filter_and_symbol_grouping() {
        let records = vec![
            record("OID1", "Dis_MS_01", 2.0),
            record("OID2", "Dis_MS_01", 4.0),
            record("OID3", "Dis_MS_01", 9.0),
        ];
        let table = pivot_long(&records, &["Dis_MS_01".to_string()]).unwrap();

        let annotation = |id: &str, symbol: &str, csf: bool, plasma: bool| AssayAnnotation {
            olink_id: id.to_string(),
            symbol: symbol.to_string(),
            below_lod_csf: csf,
            below_lod_plasma: plasma,
        };
        let annotations = vec![
            annotation("OID1", "NEFL", false, false),
            annotation("OID2", "NEFL", false, true),
            annotation("OID3", "GFAP", true, false),
        ];

        let filtered = apply_lod_filter(&table, &annotations, Tissue::Csf).unwrap();
        assert_eq!(filtered.features(), &["NEFL".to_string()]);
        // duplicate symbol rows are averaged
        assert_relative_eq!(filtered.feature_row("NEFL").unwrap()[0], 3.0, epsilon = 1e-12);

        // the same annotations filter differently in plasma
        let plasma_filtered = apply_lod_filter(&table, &annotations, Tissue::Plasma).unwrap();
        assert_eq!(
            plasma_filtered.features(),
            &["NEFL".to_string(), "GFAP".to_string()]
        );
        assert_relative_eq!(plasma_filtered.feature_row("NEFL").unwrap()[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lod_filter_requires_annotation() {
        let records = vec![record("OID1", "Dis_MS_01", 2.0)];
        let table = pivot_long(&records, &["Dis_MS_01".to_string()]).unwrap();
        assert!(apply_lod_filter(&table, &[], Tissue::Csf).is_err());
    }

    #[test]
    fn test_control_correction_z_scores() {
        let features = vec!["NEFL".to_string()];
        let samples = vec![
            SampleId::parse("Dis_HC_01").unwrap(),
            SampleId::parse("Dis_HC_02").unwrap(),
            SampleId::parse("Dis_MS_01").unwrap(),
            SampleId::parse("Rep_HC_01").unwrap(),
            SampleId::parse("Rep_HC_02").unwrap(),
            SampleId::parse("Rep_MS_01").unwrap(),
        ];
        let values =
            Array2::from_shape_vec((1, 6), vec![1.0, 3.0, 4.0, 10.0, 14.0, 8.0]).unwrap();
        let table = SampleTable::new(features, samples, values).unwrap();

        let corrected = control_correct(&table).unwrap();
        let row = corrected.feature_row("NEFL").unwrap();

        // discovery HC mean 2, sd sqrt(2); replication HC mean 12, sd sqrt(8)
        let sqrt2 = 2.0_f64.sqrt();
        assert_relative_eq!(row[2], 2.0 / sqrt2, epsilon = 1e-12);
        assert_relative_eq!(row[0], -1.0 / sqrt2, epsilon = 1e-12);
        assert_relative_eq!(row[5], -4.0 / 8.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_control_correction_requires_controls() {
        let features = vec!["NEFL".to_string()];
        let samples = vec![
            SampleId::parse("Dis_MS_01").unwrap(),
            SampleId::parse("Rep_MS_01").unwrap(),
        ];
        let values = Array2::from_shape_vec((1, 2), vec![1.0, 2.0]).unwrap();
        let table = SampleTable::new(features, samples, values).unwrap();

        assert!(control_correct(&table).is_err());
    }

    #[test]
    fn test_clinical_merge() {
        let features = vec!["NEFL".to_string()];
        let samples = vec![
            SampleId::parse("Dis_MS_01").unwrap(),
            SampleId::parse("Dis_HC_01").unwrap(),
        ];
        let values = Array2::from_shape_vec((1, 2), vec![1.0, 2.0]).unwrap();
        let table = SampleTable::new(features, samples, values).unwrap();

        let records = vec![
            ClinicalRecord {
                sample_id: "Dis_MS_01".to_string(),
                sex: Sex::Female,
                age: 34.0,
                neda_2years: Some(1.0),
                narmss: Some(4.2),
                treatment_duration: Some(1.5),
            },
            ClinicalRecord {
                sample_id: "Dis_HC_01".to_string(),
                sex: Sex::Male,
                age: 40.0,
                neda_2years: None,
                narmss: None,
                treatment_duration: None,
            },
        ];

        let merged = append_clinical_rows(&table, &records).unwrap();
        assert_eq!(merged.n_features(), 7);
        assert_eq!(merged.feature_row("sex").unwrap().to_vec(), vec![1.0, 0.0]);
        assert_eq!(merged.feature_row("nARMSS").unwrap()[0], 4.2);
        assert!(merged.feature_row("nARMSS").unwrap()[1].is_nan());
        // patients are flagged, controls are not
        assert_eq!(merged.feature_row("ms_control").unwrap().to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_clinical_merge_requires_all_samples() {
        let features = vec!["NEFL".to_string()];
        let samples = vec![SampleId::parse("Dis_MS_01").unwrap()];
        let values = Array2::from_shape_vec((1, 1), vec![1.0]).unwrap();
        let table = SampleTable::new(features, samples, values).unwrap();

        assert!(append_clinical_rows(&table, &[]).is_err());
    }
}
