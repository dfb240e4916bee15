//! # panelfit
//!
//! biomarker panel regression for severity scores - feature selection made easy
//!
//! ## what you get
//!
//! - leave-one-out cross-validated linear models
//! - greedy forward selection with knee-point truncation
//! - backward pruning on coefficient significance
//! - CSF-to-plasma panel transfer
//! - Fisher exact enrichment of discovered proteins against known biomarkers
//! - the preprocessing steps that turn raw NPX measurements into model input
//!
//! ## quick start
//!
//! ```rust
//! use panelfit::metrics::{concordance_correlation, r2_score};
//! use ndarray::Array1;
//!
//! # fn main() -> Result<(), panelfit::PanelError> {
//! let observed = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
//! let predicted = Array1::from(vec![1.1, 2.0, 2.9, 4.2]);
//!
//! let r2 = r2_score(observed.view(), predicted.view())?;
//! assert!(r2 > 0.9);
//!
//! // concordance penalizes bias, not just scatter
//! let (ccc, p) = concordance_correlation(observed.view(), predicted.view())?;
//! assert!(ccc > 0.9 && p < 0.05);
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod enrichment;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod selection;

pub use data::{Cohort, CohortData, Group, ModelingSplit, SampleId, SampleTable, Tissue};
pub use error::{PanelError, Result};
pub use metrics::Performance;
pub use model::LinearFit;
pub use pipeline::{run_severity_pipeline, PipelineConfig, SeverityReport};
