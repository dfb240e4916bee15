use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use panelfit::enrichment::fisher_test;
use panelfit::{run_severity_pipeline, PipelineConfig, SampleId, SampleTable};

const PROTEINS: [&str; 8] = [
    "NEFL", "CHI3L1", "GFAP", "MOG", "CD27", "TNFRSF1A", "CXCL13", "IL12B",
];

/// synthetic CSF and plasma tables for the same individuals: NEFL and CHI3L1
/// drive the severity score, the other proteins are noise, and only NEFL
/// keeps its CSF levels in plasma
fn generate_tables(
    n_discovery: usize,
    n_replication: usize,
    seed: u64,
) -> panelfit::Result<(SampleTable, SampleTable)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_samples = n_discovery + n_replication;

    let samples: Vec<SampleId> = (0..n_samples)
        .map(|i| {
            let name = if i < n_discovery {
                format!("Dis_MS_{:03}", i + 1)
            } else {
                format!("Rep_MS_{:03}", i - n_discovery + 1)
            };
            SampleId::parse(&name)
        })
        .collect::<panelfit::Result<_>>()?;

    let mut features: Vec<String> = vec!["nARMSS".to_string()];
    features.extend(PROTEINS.iter().map(|s| s.to_string()));
    features.push("sex".to_string());
    features.push("age".to_string());

    let mut csf = Array2::zeros((features.len(), n_samples));
    let mut plasma = Array2::zeros((features.len(), n_samples));

    for j in 0..n_samples {
        let nefl = rng.gen_range(0.5..8.0);
        let chi3l1 = rng.gen_range(-2.0..2.0);
        let sex = if rng.r#gen::<bool>() { 1.0 } else { 0.0 };
        let age = rng.gen_range(25.0..60.0);
        let narmss = 2.0 * nefl + 1.5 * chi3l1 + rng.gen_range(-0.3..0.3);

        csf[[0, j]] = narmss;
        plasma[[0, j]] = narmss;
        csf[[1, j]] = nefl;
        csf[[2, j]] = chi3l1;
        // noise proteins carry no severity signal in either fluid
        for (k, _) in PROTEINS.iter().enumerate().skip(2) {
            csf[[1 + k, j]] = rng.gen_range(-1.0..1.0);
            plasma[[1 + k, j]] = rng.gen_range(-1.0..1.0);
        }
        // NEFL leaks into blood, CHI3L1 does not
        plasma[[1, j]] = nefl + rng.gen_range(-0.15..0.15);
        plasma[[2, j]] = rng.gen_range(-2.0..2.0);

        let sex_row = features.len() - 2;
        csf[[sex_row, j]] = sex;
        plasma[[sex_row, j]] = sex;
        csf[[sex_row + 1, j]] = age;
        plasma[[sex_row + 1, j]] = age;
    }

    let csf_table = SampleTable::new(features.clone(), samples.clone(), csf)?;
    let plasma_table = SampleTable::new(features, samples, plasma)?;
    Ok((csf_table, plasma_table))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Severity Modeling - Synthetic End-to-End Example");
    println!("================================================\n");

    println!("Generating synthetic CSF and plasma tables...");
    let (csf, plasma) = generate_tables(40, 20, 42)?;
    println!("  - Features: {}", csf.n_features());
    println!("  - Samples:  {} ({} discovery, {} replication)", csf.n_samples(), 40, 20);
    println!();

    let dep_proteins: Vec<String> = PROTEINS.iter().map(|s| s.to_string()).collect();
    let config = PipelineConfig::new().with_knee_order(1).with_alpha(0.05);

    println!("Running the severity pipeline...");
    let report = run_severity_pipeline(&csf, Some(&plasma), &dep_proteins, &config)?;
    println!();
    report.print();
    println!();

    // overlap of the selected panel with a meningeal-inflammation gene set
    println!("Panel Enrichment");
    println!("================");
    let inflammation: Vec<String> = ["CHI3L1", "CXCL13", "IL12B", "CD27", "TNFRSF13B"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let background: Vec<String> = PROTEINS.iter().map(|s| s.to_string()).collect();
    let enrichment = fisher_test(&report.csf.features, &inflammation, &background)?;
    enrichment.print();

    println!("\nSeverity modeling example completed.");
    Ok(())
}
