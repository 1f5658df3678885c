//! A small demo: scan a two-parameter Gaussian likelihood, then summarize
//! the posterior from the chain file.

use blocked_mh::chain_file::{chain_path, read_rows};
use blocked_mh::metropolis_hastings::MetropolisHastings;
use std::error::Error;

fn quantile(sorted: &[f64], q: f64) -> f64 {
    sorted[((sorted.len() - 1) as f64 * q) as usize]
}

fn main() -> Result<(), Box<dyn Error>> {
    const BURNIN: usize = 1_000;

    let root = std::env::temp_dir()
        .join("blocked_mh_demo")
        .to_str()
        .ok_or("temp dir is not valid UTF-8")?
        .to_string();

    // x ~ N(5, 2), y ~ N(-4, 3) through the -2lnL convention.
    let like = |p: &[f64]| ((p[0] - 5.0) / 2.0).powi(2) + ((p[1] + 4.0) / 3.0).powi(2);

    let mut mh = MetropolisHastings::new(2, like, &root)?.set_seed(42);
    mh.set_param(0, "x", -15.0, 25.0, None, Some(2.0), Some(0.05))?;
    mh.set_param(1, "y", -24.0, 16.0, None, Some(3.0), Some(0.05))?;

    let summary = mh.run_progress(50_000, false)?;
    println!(
        "Finished after {} iterations (converged: {})",
        summary.iterations, summary.converged
    );
    for (b, rate) in summary.acceptance_rates.iter().enumerate() {
        println!("Acceptance rate for parameter block {b}: {rate:.3}");
    }

    let rows = read_rows(&chain_path(&root))?;
    for (i, name) in ["x", "y"].iter().enumerate() {
        let mut values: Vec<f64> = rows[BURNIN..].iter().map(|r| r.params[i]).collect();
        values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
        println!(
            "{name}: median {:.3}, 68% interval [{:.3}, {:.3}]",
            quantile(&values, 0.5),
            quantile(&values, 0.16),
            quantile(&values, 0.84),
        );
    }
    println!("Chain written to {}", chain_path(&root).display());

    Ok(())
}
