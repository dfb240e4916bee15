use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use panelfit::enrichment::fisher_test;
use panelfit::pipeline::{run_severity_pipeline, PipelineConfig};
use panelfit::SampleTable;

#[derive(Parser, Debug)]
#[command(
    name = "panelfit",
    about = "biomarker panel modeling for MS severity scores",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// train the CSF severity model and validate it across cohorts and fluids
    Model {
        /// corrected CSF data table (features x samples, TSV)
        #[arg(long)]
        csf: PathBuf,
        /// corrected plasma data table; enables the plasma-transfer model
        #[arg(long)]
        plasma: Option<PathBuf>,
        /// differentially expressed proteins, one identifier per line
        #[arg(long)]
        dep: PathBuf,
        /// neighborhood half-width of the knee-point search
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        knee_order: u64,
        /// significance threshold for pruning and cross-fluid retention
        #[arg(long, default_value_t = 0.05, value_parser = parse_alpha)]
        alpha: f64,
    },
    /// test overlap of discovered proteins with known biomarkers
    Enrich {
        /// discovered gene set, one identifier per line
        #[arg(long)]
        genes: PathBuf,
        /// known biomarker set, one identifier per line
        #[arg(long)]
        markers: PathBuf,
        /// background universe, one identifier per line
        #[arg(long)]
        background: PathBuf,
    },
}

fn parse_alpha(value: &str) -> Result<f64, String> {
    let alpha: f64 = value.parse().map_err(|_| format!("`{value}` is not a number"))?;
    if alpha > 0.0 && alpha < 1.0 {
        Ok(alpha)
    } else {
        Err(String::from("alpha must be strictly between 0 and 1"))
    }
}

fn read_identifier_list(path: &Path) -> panelfit::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn run(cli: Cli) -> panelfit::Result<()> {
    match cli.command {
        Command::Model { csf, plasma, dep, knee_order, alpha } => {
            let csf_table = SampleTable::from_tsv_path(&csf)?;
            let plasma_table = match plasma {
                Some(path) => Some(SampleTable::from_tsv_path(&path)?),
                None => None,
            };
            let dep_proteins = read_identifier_list(&dep)?;
            log::info!("{} differentially expressed proteins", dep_proteins.len());

            let config =
                PipelineConfig::new().with_knee_order(knee_order as usize).with_alpha(alpha);
            let report =
                run_severity_pipeline(&csf_table, plasma_table.as_ref(), &dep_proteins, &config)?;
            report.print();
        }
        Command::Enrich { genes, markers, background } => {
            let gene_set = read_identifier_list(&genes)?;
            let marker_set = read_identifier_list(&markers)?;
            let background_set = read_identifier_list(&background)?;

            let result = fisher_test(&gene_set, &marker_set, &background_set)?;
            result.print();
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}
