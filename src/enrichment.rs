use std::collections::HashSet;

use statrs::function::factorial::ln_factorial;

use crate::error::{PanelError, Result};

/// overlap test output: the 2x2 table, its sample odds ratio and the
/// two-sided Fisher exact p-value
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub odds_ratio: f64,
    pub p_value: f64,
    pub table: [[u64; 2]; 2],
}

impl EnrichmentResult {
    pub fn print(&self) {
        println!("overlap table: {:?}", self.table);
        println!("OR = {:.4}, p = {:.4e}", self.odds_ratio, self.p_value);
    }
}

/// two-sided Fisher exact test on the overlap of two gene sets inside a
/// background universe. genes outside the background are ignored; sets are
/// treated as unique identifier collections.
pub fn fisher_test(
    geneset1: &[String],
    geneset2: &[String],
    background: &[String],
) -> Result<EnrichmentResult> {
    if background.is_empty() {
        return Err(PanelError::degenerate_model("empty background set"));
    }

    let universe: HashSet<&str> = background.iter().map(|s| s.as_str()).collect();
    let set1: HashSet<&str> = geneset1
        .iter()
        .map(|s| s.as_str())
        .filter(|g| universe.contains(g))
        .collect();
    let set2: HashSet<&str> = geneset2
        .iter()
        .map(|s| s.as_str())
        .filter(|g| universe.contains(g))
        .collect();

    let overlap = set1.intersection(&set2).count() as u64;
    let n1 = set1.len() as u64;
    let n2 = set2.len() as u64;
    let m = universe.len() as u64;

    let a = overlap;
    let b = n1 - overlap;
    let c = n2 - overlap;
    let d = m + overlap - n1 - n2;

    // sample odds ratio: infinite when the off-diagonal product vanishes
    // with a non-zero diagonal, undefined when both products are zero
    let diagonal = (a * d) as f64;
    let off_diagonal = (b * c) as f64;
    let odds_ratio = if off_diagonal > 0.0 {
        diagonal / off_diagonal
    } else if diagonal > 0.0 {
        f64::INFINITY
    } else {
        f64::NAN
    };
    let p_value = hypergeometric_two_sided(m, n1, n2, a);

    Ok(EnrichmentResult { odds_ratio, p_value, table: [[a, b], [c, d]] })
}

/// two-sided p: sum the probabilities of all tables at least as extreme
/// (pmf no larger than the observed one, with a small relative slack for
/// floating-point ties)
fn hypergeometric_two_sided(population: u64, successes: u64, draws: u64, observed: u64) -> f64 {
    let low = draws.saturating_sub(population - successes);
    let high = successes.min(draws);

    let ln_pmf = |k: u64| -> f64 {
        ln_choose(successes, k) + ln_choose(population - successes, draws - k)
            - ln_choose(population, draws)
    };

    let observed_pmf = ln_pmf(observed).exp();
    let cutoff = observed_pmf * (1.0 + 1e-7);

    let mut p = 0.0;
    for k in low..=high {
        let pmf = ln_pmf(k).exp();
        if pmf <= cutoff {
            p += pmf;
        }
    }
    p.min(1.0)
}

fn ln_choose(n: u64, k: u64) -> f64 {
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_complete_overlap_in_small_background() {
        let background = names(&["A", "B", "C", "D"]);
        let set1 = names(&["A", "B"]);
        let set2 = names(&["A", "B"]);

        let result = fisher_test(&set1, &set2, &background).unwrap();
        assert_eq!(result.table, [[2, 0], [0, 2]]);
        assert!(result.odds_ratio.is_infinite());
        // support pmfs are 1/6, 4/6, 1/6; two-sided p = 1/6 + 1/6
        assert_relative_eq!(result.p_value, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_disjoint_sets() {
        let background = names(&["A", "B", "C", "D"]);
        let set1 = names(&["A", "B"]);
        let set2 = names(&["C", "D"]);

        let result = fisher_test(&set1, &set2, &background).unwrap();
        assert_eq!(result.table, [[0, 2], [2, 0]]);
        assert_eq!(result.odds_ratio, 0.0);
        assert_relative_eq!(result.p_value, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_genes_outside_background_are_ignored() {
        let background = names(&["A", "B", "C", "D"]);
        let set1 = names(&["A", "B", "Z1"]);
        let set2 = names(&["A", "B", "Z2"]);

        let result = fisher_test(&set1, &set2, &background).unwrap();
        assert_eq!(result.table, [[2, 0], [0, 2]]);
    }

    #[test]
    fn test_matches_direct_contingency_computation() {
        // enrichment from set sizes and overlap alone must reproduce the
        // same table the test builds internally
        let background: Vec<String> = (0..50).map(|i| format!("G{}", i)).collect();
        let set1: Vec<String> = (0..12).map(|i| format!("G{}", i)).collect();
        let set2: Vec<String> = (6..20).map(|i| format!("G{}", i)).collect();

        let result = fisher_test(&set1, &set2, &background).unwrap();

        let overlap = 6u64; // G6..G11
        let expected = [
            [overlap, 12 - overlap],
            [14 - overlap, 50 - 12 - 14 + overlap],
        ];
        assert_eq!(result.table, expected);

        let direct_or = (expected[0][0] * expected[1][1]) as f64
            / (expected[0][1] * expected[1][0]) as f64;
        assert_relative_eq!(result.odds_ratio, direct_or, epsilon = 1e-12);

        let direct_p = super::hypergeometric_two_sided(50, 12, 14, overlap);
        assert_relative_eq!(result.p_value, direct_p, epsilon = 1e-12);
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
    }

    #[test]
    fn test_single_gene_universe_has_undefined_odds_ratio() {
        // overlap fills the whole table: both odds-ratio products are zero
        let background = names(&["A"]);
        let result = fisher_test(&background, &background, &background).unwrap();

        assert_eq!(result.table, [[1, 0], [0, 0]]);
        assert!(result.odds_ratio.is_nan());
        assert_relative_eq!(result.p_value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_probabilities_sum_to_one_over_support() {
        // sanity on the hypergeometric arithmetic
        let total: f64 = (0..=10u64)
            .map(|k| {
                (super::ln_choose(10, k) + super::ln_choose(20, 10 - k)
                    - super::ln_choose(30, 10))
                .exp()
            })
            .sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_empty_background_rejected() {
        assert!(fisher_test(&names(&["A"]), &names(&["A"]), &[]).is_err());
    }
}
