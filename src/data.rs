use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{PanelError, Result};

/// which cohort a sample was recruited into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cohort {
    Discovery,
    Replication,
}

/// patient vs healthy control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Patient,
    HealthyControl,
}

/// body fluid a table was measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tissue {
    Csf,
    Plasma,
}

/// a sample column with its cohort/group tags resolved at ingestion time,
/// so downstream code never has to match on name substrings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleId {
    pub name: String,
    pub cohort: Cohort,
    pub group: Group,
}

impl SampleId {
    /// resolve the naming convention ("Dis"/"Rep" cohort marker, "HC" for
    /// healthy controls) into explicit tags
    pub fn parse(name: &str) -> Result<Self> {
        let cohort = if name.contains("Dis") {
            Cohort::Discovery
        } else if name.contains("Rep") {
            Cohort::Replication
        } else {
            return Err(PanelError::invalid_table(format!(
                "sample '{}' carries no cohort marker (expected 'Dis' or 'Rep')",
                name
            )));
        };

        let group = if name.contains("HC") {
            Group::HealthyControl
        } else {
            Group::Patient
        };

        Ok(Self { name: name.to_string(), cohort, group })
    }
}

/// measurement table - features (proteins and clinical covariates) as rows,
/// samples as columns, NaN for missing values
#[derive(Debug, Clone)]
pub struct SampleTable {
    features: Vec<String>,
    feature_index: HashMap<String, usize>, // first occurrence wins
    samples: Vec<SampleId>,
    values: Array2<f64>, // features x samples
}

impl SampleTable {
    pub fn new(features: Vec<String>, samples: Vec<SampleId>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != features.len() {
            return Err(PanelError::invalid_table(format!(
                "value rows ({}) != feature count ({})",
                values.nrows(),
                features.len()
            )));
        }
        if values.ncols() != samples.len() {
            return Err(PanelError::invalid_table(format!(
                "value columns ({}) != sample count ({})",
                values.ncols(),
                samples.len()
            )));
        }

        let mut feature_index = HashMap::with_capacity(features.len());
        for (i, name) in features.iter().enumerate() {
            feature_index.entry(name.clone()).or_insert(i);
        }

        Ok(Self { features, feature_index, samples, values })
    }

    /// read a tab-delimited table: header row holds sample names (first cell
    /// is the unnamed feature column), every other row is one feature
    pub fn from_tsv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_tsv_reader(file)
    }

    pub fn from_tsv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let header = rdr
            .headers()
            .map_err(|e| PanelError::invalid_table(e.to_string()))?
            .clone();
        if header.is_empty() {
            return Err(PanelError::invalid_table("empty header row"));
        }

        let samples: Vec<SampleId> = header
            .iter()
            .skip(1)
            .map(SampleId::parse)
            .collect::<Result<_>>()?;

        let mut features = Vec::new();
        let mut flat = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| PanelError::invalid_table(e.to_string()))?;
            let mut fields = record.iter();
            let name = fields
                .next()
                .ok_or_else(|| PanelError::invalid_table("row without a feature name"))?;
            features.push(name.to_string());
            for field in fields {
                flat.push(parse_cell(field, name)?);
            }
        }

        let values = Array2::from_shape_vec((features.len(), samples.len()), flat)
            .map_err(|e| PanelError::invalid_table(e.to_string()))?;
        Self::new(features, samples, values)
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// measurements of one feature across all samples
    pub fn feature_row(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .feature_index
            .get(name)
            .copied()
            .ok_or_else(|| PanelError::missing_feature(name))?;
        Ok(self.values.row(idx))
    }

    pub fn contains_feature(&self, name: &str) -> bool {
        self.feature_index.contains_key(name)
    }

    /// split scored samples into discovery (training) and replication (test)
    /// cohorts, restricted to `protein_set` rows in the given order.
    ///
    /// samples without a finite value in the target row are dropped; the
    /// cohort tags make the partition of the remaining samples mutually
    /// exclusive and exhaustive by construction. column order of each matrix
    /// matches its target vector entry for entry.
    pub fn modeling_split(&self, target_row: &str, protein_set: &[String]) -> Result<ModelingSplit> {
        let target = self.feature_row(target_row)?.to_owned();

        let row_indices: Vec<usize> = protein_set
            .iter()
            .map(|name| {
                self.feature_index
                    .get(name)
                    .copied()
                    .ok_or_else(|| PanelError::missing_feature(name))
            })
            .collect::<Result<_>>()?;

        let discovery = self.cohort_data(Cohort::Discovery, protein_set, &row_indices, &target)?;
        let replication = self.cohort_data(Cohort::Replication, protein_set, &row_indices, &target)?;

        log::debug!(
            "modeling split on '{}': {} discovery / {} replication scored samples, {} features",
            target_row,
            discovery.n_samples(),
            replication.n_samples(),
            protein_set.len()
        );

        Ok(ModelingSplit { discovery, replication })
    }

    fn cohort_data(
        &self,
        cohort: Cohort,
        protein_set: &[String],
        row_indices: &[usize],
        target: &Array1<f64>,
    ) -> Result<CohortData> {
        let cols: Vec<usize> = (0..self.n_samples())
            .filter(|&j| self.samples[j].cohort == cohort && target[j].is_finite())
            .collect();

        let mut x = Array2::zeros((row_indices.len(), cols.len()));
        for (out_i, &row) in row_indices.iter().enumerate() {
            for (out_j, &col) in cols.iter().enumerate() {
                x[[out_i, out_j]] = self.values[[row, col]];
            }
        }

        let y = Array1::from_iter(cols.iter().map(|&j| target[j]));
        let names = cols.iter().map(|&j| self.samples[j].name.clone()).collect();

        CohortData::new(cohort, protein_set.to_vec(), names, x, y)
    }
}

fn parse_cell(field: &str, feature: &str) -> Result<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(|_| {
        PanelError::invalid_table(format!("non-numeric value '{}' in feature '{}'", field, feature))
    })
}

/// one cohort's modeling input: feature matrix plus aligned target vector
#[derive(Debug, Clone)]
pub struct CohortData {
    cohort: Cohort,
    features: Vec<String>,
    feature_index: HashMap<String, usize>,
    names: Vec<String>,
    x: Array2<f64>, // features x samples
    y: Array1<f64>,
}

impl CohortData {
    pub fn new(
        cohort: Cohort,
        features: Vec<String>,
        names: Vec<String>,
        x: Array2<f64>,
        y: Array1<f64>,
    ) -> Result<Self> {
        if x.nrows() != features.len() {
            return Err(PanelError::alignment(format!(
                "matrix rows ({}) != feature count ({})",
                x.nrows(),
                features.len()
            )));
        }
        if x.ncols() != y.len() || x.ncols() != names.len() {
            return Err(PanelError::alignment(format!(
                "matrix columns ({}) must match target length ({}) and sample names ({})",
                x.ncols(),
                y.len(),
                names.len()
            )));
        }

        let mut feature_index = HashMap::with_capacity(features.len());
        for (i, name) in features.iter().enumerate() {
            feature_index.entry(name.clone()).or_insert(i);
        }

        Ok(Self { cohort, features, feature_index, names, x, y })
    }

    pub fn cohort(&self) -> Cohort {
        self.cohort
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn sample_names(&self) -> &[String] {
        &self.names
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    /// measurements of one feature across this cohort's samples
    pub fn feature_values(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .feature_index
            .get(name)
            .copied()
            .ok_or_else(|| PanelError::missing_feature(name))?;
        Ok(self.x.row(idx))
    }

    /// regression design matrix (samples x selected features), columns in
    /// the order of `features`
    pub fn design(&self, features: &[String]) -> Result<Array2<f64>> {
        let mut design = Array2::zeros((self.n_samples(), features.len()));
        for (k, name) in features.iter().enumerate() {
            let row = self.feature_values(name)?;
            design.column_mut(k).assign(&row);
        }
        Ok(design)
    }
}

/// loader output: discovery cohort for training, replication for testing
#[derive(Debug, Clone)]
pub struct ModelingSplit {
    pub discovery: CohortData,
    pub replication: CohortData,
}
