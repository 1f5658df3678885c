/*!
# Blocked Metropolis-Hastings Sampler

The engine walks a single Markov chain through parameter space one block
at a time. One iteration is a full sweep over all configured blocks: for
each block a candidate sub-vector is proposed, the external likelihood and
the joint prior are evaluated on the full candidate vector, and the move
is accepted with the Metropolis probability

```text
p = min(1, (P_new / P_cur) * exp(-(L_new - L_cur) / 2) * q_correction)
```

where `L` is `-2 ln(likelihood)` and `q_correction` is the proposal
density ratio for asymmetric external proposals. After each sweep one row
goes to the chain file, the running statistics fold in the new state, and
(optionally) the full sampler state is checkpointed so an interrupted run
resumes from the last completed sweep.

The run stops when every parameter's autocorrelation-inflated standard
error of the mean is within its configured accuracy (checked from
iteration 100 on), or at the hard iteration cap, whichever comes first.

## Example Usage

```rust
use blocked_mh::metropolis_hastings::MetropolisHastings;

// -2 ln L for two independent Gaussians: x ~ N(5, 2), y ~ N(-4, 3).
let like = |p: &[f64]| ((p[0] - 5.0) / 2.0).powi(2) + ((p[1] + 4.0) / 3.0).powi(2);

let mut mh = MetropolisHastings::new(2, like, "/tmp/gauss_chain").unwrap().set_seed(42);
mh.set_param(0, "x", -15.0, 25.0, None, Some(2.0), None).unwrap();
mh.set_param(1, "y", -24.0, 16.0, None, Some(3.0), None).unwrap();
assert_eq!(mh.param_name(0), Some("x"));
```
*/

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::chain_file::{self, ChainWriter};
use crate::checkpoint::{CheckpointStore, SamplerState};
use crate::error::McmcError;
use crate::likelihood::LikelihoodFunction;
use crate::params::{ParameterSpec, Prior, PriorDensity, ProductPrior};
use crate::proposal::{block_bounds, BlockProposal, GaussianBlockProposal};
use crate::stats::ConvergenceMonitor;

/// The stop rule is never consulted before this many iterations.
const MIN_ITERATIONS: u64 = 100;

/// Chain-file flush/reopen and acceptance-report period, in iterations.
const REPORT_INTERVAL: u64 = 1000;

/// What a finished run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Total completed sweeps, including any from a resumed checkpoint.
    pub iterations: u64,
    /// True if the accuracy stop rule fired before the hard cap.
    pub converged: bool,
    /// Per-block acceptance rates over the sweeps of this run.
    pub acceptance_rates: Vec<f64>,
}

/// A blocked Metropolis-Hastings scanner over one chain.
///
/// Configure every parameter with [`set_param`](Self::set_param) or
/// [`set_param_gauss`](Self::set_param_gauss), optionally group
/// parameters into blocks, then call [`run`](Self::run). The chain lands
/// in `<file_root>.txt` with a `<file_root>.paramnames` sidecar, and
/// `<file_root>resume.dat` carries the crash-recovery state when enabled.
pub struct MetropolisHastings<L> {
    like: L,
    file_root: String,
    params: Vec<Option<ParameterSpec>>,
    blocks: Vec<usize>,
    external_prior: Option<Box<dyn PriorDensity + Send>>,
    external_proposal: Option<Box<dyn BlockProposal + Send>>,
    seed: u64,
    rng: SmallRng,
}

impl<L: LikelihoodFunction> MetropolisHastings<L> {
    /// Creates a sampler over `n_params` parameters.
    ///
    /// `like` evaluates `-2 ln L`; `file_root` is the prefix for all
    /// output files. The random seed comes from entropy; use
    /// [`set_seed`](Self::set_seed) for reproducible runs. By default
    /// every parameter forms its own block.
    pub fn new(n_params: usize, like: L, file_root: &str) -> Result<Self, McmcError> {
        if n_params == 0 {
            return Err(McmcError::Config("need at least one parameter".into()));
        }
        let seed = thread_rng().gen::<u64>();
        Ok(Self {
            like,
            file_root: file_root.to_string(),
            params: vec![None; n_params],
            blocks: (1..=n_params).collect(),
            external_prior: None,
            external_proposal: None,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Reseeds the engine-owned generator (and the built-in proposal,
    /// which derives its seed from this one).
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Gives parameter `i` a uniform prior on `[min, max]`.
    ///
    /// Defaults for the unset options: start = midpoint, proposal width =
    /// 1/100 of the range, accuracy = 1/10 of the width.
    pub fn set_param(
        &mut self,
        i: usize,
        name: &str,
        min: f64,
        max: f64,
        start: Option<f64>,
        width: Option<f64>,
        accuracy: Option<f64>,
    ) -> Result<(), McmcError> {
        self.set_spec(
            i,
            ParameterSpec::with_options(name, Prior::Uniform { min, max }, start, width, accuracy)?,
        )
    }

    /// Gives parameter `i` a Gaussian prior with the given mean and sigma.
    ///
    /// Defaults for the unset options: start = mean, proposal width =
    /// sigma/100, accuracy = 1/10 of the width.
    pub fn set_param_gauss(
        &mut self,
        i: usize,
        name: &str,
        mean: f64,
        sigma: f64,
        start: Option<f64>,
        width: Option<f64>,
        accuracy: Option<f64>,
    ) -> Result<(), McmcError> {
        self.set_spec(
            i,
            ParameterSpec::with_options(name, Prior::Gaussian { mean, sigma }, start, width, accuracy)?,
        )
    }

    fn set_spec(&mut self, i: usize, spec: ParameterSpec) -> Result<(), McmcError> {
        if i >= self.params.len() {
            return Err(McmcError::Config(format!(
                "parameter index {i} out of range (have {} parameters)",
                self.params.len()
            )));
        }
        self.params[i] = Some(spec);
        Ok(())
    }

    /// Groups parameters into proposal blocks.
    ///
    /// `blocks` lists the index following the end of each block, so it
    /// must be strictly increasing and end at the parameter count.
    /// Without this call every parameter forms its own block.
    pub fn specify_blocks(&mut self, blocks: &[usize]) -> Result<(), McmcError> {
        let n = self.params.len();
        let valid = !blocks.is_empty()
            && blocks[0] > 0
            && blocks.windows(2).all(|w| w[1] > w[0])
            && *blocks.last().unwrap() == n;
        if !valid {
            return Err(McmcError::Config(format!(
                "block partition {blocks:?} must be strictly increasing and end at {n}"
            )));
        }
        self.blocks = blocks.to_vec();
        Ok(())
    }

    /// Replaces the built-in product prior with an external one.
    ///
    /// Parameters still need `set_param`/`set_param_gauss` for their
    /// names, starting values, widths, and accuracies.
    pub fn use_external_prior(&mut self, prior: Box<dyn PriorDensity + Send>) {
        self.external_prior = Some(prior);
    }

    /// Replaces the built-in Gaussian proposal with an external one.
    pub fn use_external_proposal(&mut self, proposal: Box<dyn BlockProposal + Send>) {
        self.external_proposal = Some(proposal);
    }

    /// The name of parameter `i`, if it was configured.
    pub fn param_name(&self, i: usize) -> Option<&str> {
        self.params
            .get(i)
            .and_then(|p| p.as_ref())
            .map(|p| p.name.as_str())
    }

    /// Runs the scan until convergence or `max_chain_length` sweeps.
    ///
    /// With `write_resume` the full sampler state is checkpointed after
    /// every sweep, and a later `run` on the same `file_root` picks up
    /// exactly where the interrupted one stopped (the checkpointed chain
    /// length bound wins over the argument on resume). Disable it when
    /// the likelihood is cheap enough that checkpoint writes would
    /// dominate the run time.
    pub fn run(
        &mut self,
        max_chain_length: u64,
        write_resume: bool,
    ) -> Result<RunSummary, McmcError> {
        self.run_internal(max_chain_length, write_resume, None)
    }

    /// Same as [`run`](Self::run), with an `indicatif` progress bar.
    pub fn run_progress(
        &mut self,
        max_chain_length: u64,
        write_resume: bool,
    ) -> Result<RunSummary, McmcError> {
        let pb = ProgressBar::new(max_chain_length);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        let summary = self.run_internal(max_chain_length, write_resume, Some(&pb))?;
        pb.finish_with_message(if summary.converged {
            "converged"
        } else {
            "max length reached"
        });
        Ok(summary)
    }

    fn run_internal(
        &mut self,
        max_chain_length: u64,
        write_resume: bool,
        progress: Option<&ProgressBar>,
    ) -> Result<RunSummary, McmcError> {
        if max_chain_length == 0 {
            return Err(McmcError::Config("max chain length must be positive".into()));
        }

        let n = self.params.len();
        let specs = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.clone().ok_or_else(|| {
                    McmcError::Config(format!("parameter {i} was never configured"))
                })
            })
            .collect::<Result<Vec<ParameterSpec>, McmcError>>()?;
        let accuracies: Vec<f64> = specs.iter().map(|s| s.accuracy).collect();
        let widths: Vec<f64> = specs.iter().map(|s| s.width).collect();
        let blocks = self.blocks.clone();
        let n_blocks = blocks.len();

        let builtin_prior = ProductPrior::new(specs.clone());
        let prior: &dyn PriorDensity = match &self.external_prior {
            Some(p) => p.as_ref(),
            None => &builtin_prior,
        };

        let mut builtin_proposal;
        let proposal: &mut dyn BlockProposal = match self.external_proposal.as_mut() {
            Some(p) => p.as_mut(),
            None => {
                builtin_proposal =
                    GaussianBlockProposal::new(widths, blocks.clone(), self.seed.wrapping_add(1));
                &mut builtin_proposal
            }
        };

        let store = CheckpointStore::for_root(&self.file_root, n);

        let mut max_len = max_chain_length;
        let mut iteration: u64;
        let mut current: Vec<f64>;
        let mut previous: Vec<f64>;
        let mut current_like: f64;
        let mut current_prior: f64;
        let mut monitor: ConvergenceMonitor;
        let mut writer: ChainWriter;

        match store.load() {
            Some(state) => {
                log::info!(
                    "resuming from checkpoint, already have {} iterations",
                    state.iteration
                );
                max_len = state.max_chain_length;
                iteration = state.iteration;
                current_like = state.current_like;
                current_prior = state.current_prior;
                current = state.current;
                previous = state.previous;
                monitor = ConvergenceMonitor::from_sums(state.sum, state.sum_sq, state.cor_sum);
                writer = ChainWriter::append(&self.file_root)?;
            }
            None => {
                log::info!("no valid checkpoint found, starting from scratch");
                iteration = 0;
                current = specs.iter().map(|s| s.start).collect();
                current_like = self.like.calculate(&current);
                current_prior = prior.density(&current);
                if !(current_prior > 0.0) {
                    return Err(McmcError::Config(
                        "starting point has zero prior density".into(),
                    ));
                }
                if !current_like.is_finite() {
                    return Err(McmcError::Config(
                        "starting point has non-finite likelihood".into(),
                    ));
                }
                previous = current.clone();
                monitor = ConvergenceMonitor::new(n);
                chain_file::write_param_names(&self.file_root, &specs)?;
                writer = ChainWriter::create(&self.file_root)?;
            }
        }

        if let Some(pb) = progress {
            pb.set_length(max_len);
            pb.set_position(iteration.min(max_len));
        }

        let start_iteration = iteration;
        let mut accepted = vec![0u64; n_blocks];
        let mut saved = vec![0.0f64; n];

        let converged = loop {
            if iteration >= max_len {
                break false;
            }
            if iteration >= MIN_ITERATIONS && monitor.converged(iteration, &accuracies) {
                break true;
            }

            for b in 0..n_blocks {
                let (lo, hi) = block_bounds(&blocks, b);
                let mut candidate = vec![0.0f64; hi - lo];
                proposal.generate(&current, b, &mut candidate);

                saved.copy_from_slice(&current);
                let saved_like = current_like;
                current[lo..hi].copy_from_slice(&candidate);

                let new_like = self.like.calculate(&current);
                let new_prior = prior.density(&current);

                let correction = if proposal.is_symmetric(b) {
                    1.0
                } else {
                    proposal.density(&current, &saved[lo..hi], b)
                        / proposal.density(&saved, &candidate, b)
                };

                let p = acceptance_probability(
                    new_prior,
                    current_prior,
                    new_like,
                    saved_like,
                    correction,
                );
                let u: f64 = self.rng.gen();
                if u <= p {
                    current_prior = new_prior;
                    current_like = new_like;
                    accepted[b] += 1;
                } else {
                    current.copy_from_slice(&saved);
                    current_like = saved_like;
                }
            }

            writer.write_row(current_like, &current)?;
            iteration += 1;
            monitor.update(&current, &previous);
            previous.copy_from_slice(&current);

            if write_resume {
                let (sum, sum_sq, cor_sum) = monitor.sums();
                store.save(&SamplerState {
                    max_chain_length: max_len,
                    iteration,
                    current_like,
                    current_prior,
                    current: current.clone(),
                    previous: previous.clone(),
                    sum,
                    sum_sq,
                    cor_sum,
                });
            }

            if let Some(pb) = progress {
                pb.inc(1);
            }

            if iteration % REPORT_INTERVAL == 0 {
                writer.reopen()?;
                let sweeps = iteration - start_iteration;
                for (b, &count) in accepted.iter().enumerate() {
                    log::info!(
                        "block {b}: acceptance rate {:.3} after {iteration} iterations",
                        count as f64 / sweeps as f64
                    );
                }
            }
        };

        writer.finish()?;

        if converged {
            log::info!("chain converged to the requested accuracy after {iteration} iterations");
        } else {
            log::info!("maximum chain length ({max_len}) reached after {iteration} iterations");
        }

        let sweeps = iteration - start_iteration;
        let acceptance_rates = accepted
            .iter()
            .map(|&count| {
                if sweeps == 0 {
                    0.0
                } else {
                    count as f64 / sweeps as f64
                }
            })
            .collect();

        Ok(RunSummary {
            iterations: iteration,
            converged,
            acceptance_rates,
        })
    }
}

/// The clamped Metropolis acceptance probability.
///
/// `new_like` and `current_like` are `-2 ln L` values; `proposal_ratio`
/// is `q(new -> old) / q(old -> new)` for asymmetric proposals and 1
/// otherwise. The result is always in `[0, 1]`.
pub fn acceptance_probability(
    new_prior: f64,
    current_prior: f64,
    new_like: f64,
    current_like: f64,
    proposal_ratio: f64,
) -> f64 {
    let mut p =
        (new_prior / current_prior) * (-(new_like - current_like) / 2.0).exp() * proposal_ratio;
    if p > 1.0 {
        p = 1.0;
    }
    p
}

/// Runs several independent samplers in parallel, one rayon task each.
///
/// Each sampler must have its own `file_root`; nothing is shared between
/// them, so this is the in-process analogue of launching one chain per
/// worker process.
pub fn run_parallel<L>(
    samplers: &mut [MetropolisHastings<L>],
    max_chain_length: u64,
    write_resume: bool,
) -> Result<Vec<RunSummary>, McmcError>
where
    L: LikelihoodFunction + Send,
{
    samplers
        .par_iter_mut()
        .map(|sampler| sampler.run(max_chain_length, write_resume))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn root_in(dir: &std::path::Path, name: &str) -> String {
        dir.join(name).to_str().unwrap().to_string()
    }

    #[test]
    fn acceptance_probability_is_clamped_to_one() {
        // Sweep prior ratios and likelihood improvements that would push
        // the raw ratio far above 1.
        for &prior_ratio in &[0.5, 1.0, 4.0, 1e6] {
            for &delta_like in &[-50.0, -2.0, 0.0, 2.0, 50.0] {
                for &correction in &[0.1, 1.0, 10.0] {
                    let p =
                        acceptance_probability(prior_ratio, 1.0, delta_like, 0.0, correction);
                    assert!(p <= 1.0, "p = {p} escaped the clamp");
                    assert!(p >= 0.0);
                }
            }
        }
    }

    #[test]
    fn acceptance_probability_matches_the_formula_below_the_clamp() {
        // Worse likelihood by 2 units of -2lnL, flat priors: p = e^{-1}.
        let p = acceptance_probability(1.0, 1.0, 12.0, 10.0, 1.0);
        assert!((p - (-1.0f64).exp()).abs() < 1e-15);

        // Prior ratio scales linearly below the clamp.
        let p = acceptance_probability(0.25, 1.0, 10.0, 10.0, 1.0);
        assert!((p - 0.25).abs() < 1e-15);

        // Asymmetry correction multiplies in.
        let p = acceptance_probability(1.0, 1.0, 10.0, 10.0, 0.5);
        assert!((p - 0.5).abs() < 1e-15);
    }

    #[test]
    fn unconfigured_parameter_is_a_config_error() {
        let dir = tempdir().unwrap();
        let mut mh =
            MetropolisHastings::new(2, |_: &[f64]| 0.0, &root_in(dir.path(), "chain")).unwrap();
        mh.set_param(0, "x", 0.0, 1.0, None, None, None).unwrap();
        assert!(matches!(mh.run(1000, false), Err(McmcError::Config(_))));
    }

    #[test]
    fn out_of_range_index_is_a_config_error() {
        let dir = tempdir().unwrap();
        let mut mh =
            MetropolisHastings::new(1, |_: &[f64]| 0.0, &root_in(dir.path(), "chain")).unwrap();
        assert!(mh.set_param(1, "x", 0.0, 1.0, None, None, None).is_err());
    }

    #[test]
    fn invalid_block_partitions_are_rejected() {
        let dir = tempdir().unwrap();
        let mut mh =
            MetropolisHastings::new(3, |_: &[f64]| 0.0, &root_in(dir.path(), "chain")).unwrap();
        assert!(mh.specify_blocks(&[]).is_err());
        assert!(mh.specify_blocks(&[2]).is_err()); // does not cover all three
        assert!(mh.specify_blocks(&[2, 2, 3]).is_err()); // not strictly increasing
        assert!(mh.specify_blocks(&[0, 3]).is_err()); // empty first block
        assert!(mh.specify_blocks(&[2, 3]).is_ok());
        assert!(mh.specify_blocks(&[3]).is_ok());
    }

    #[test]
    fn zero_prior_starting_point_is_a_config_error() {
        let dir = tempdir().unwrap();
        let mut mh =
            MetropolisHastings::new(1, |_: &[f64]| 0.0, &root_in(dir.path(), "chain")).unwrap();
        // Start outside the uniform prior's support.
        mh.set_param(0, "x", 0.0, 1.0, Some(2.0), None, None).unwrap();
        assert!(matches!(mh.run(1000, false), Err(McmcError::Config(_))));
    }

    #[test]
    fn non_finite_starting_likelihood_is_a_config_error() {
        let dir = tempdir().unwrap();
        let mut mh = MetropolisHastings::new(
            1,
            |_: &[f64]| f64::INFINITY,
            &root_in(dir.path(), "chain"),
        )
        .unwrap();
        mh.set_param(0, "x", 0.0, 1.0, None, None, None).unwrap();
        assert!(matches!(mh.run(1000, false), Err(McmcError::Config(_))));
    }

    #[test]
    fn hard_cap_stops_the_run_and_counts_rows() {
        let dir = tempdir().unwrap();
        let root = root_in(dir.path(), "chain");
        let mut mh = MetropolisHastings::new(1, |_: &[f64]| 0.0, &root)
            .unwrap()
            .set_seed(3);
        // Accuracy far below anything reachable in 150 sweeps.
        mh.set_param(0, "x", 0.0, 1.0, None, Some(0.1), Some(1e-12))
            .unwrap();

        let summary = mh.run(150, false).unwrap();
        assert_eq!(summary.iterations, 150);
        assert!(!summary.converged);
        assert_eq!(summary.acceptance_rates.len(), 1);

        let rows = crate::chain_file::read_rows(&crate::chain_file::chain_path(&root)).unwrap();
        assert_eq!(rows.len(), 150);
        assert!(rows.iter().all(|r| r.params.len() == 1 && r.weight == 1));
    }

    #[test]
    fn stop_rule_fires_at_the_first_check_when_accuracy_is_loose() {
        let dir = tempdir().unwrap();
        let root = root_in(dir.path(), "chain");
        let mut mh = MetropolisHastings::new(1, |_: &[f64]| 0.0, &root)
            .unwrap()
            .set_seed(5);
        // Any chain satisfies an accuracy of 10^6 immediately.
        mh.set_param(0, "x", 0.0, 1.0, None, Some(0.1), Some(1e6))
            .unwrap();

        let summary = mh.run(100_000, false).unwrap();
        assert_eq!(summary.iterations, 100);
        assert!(summary.converged);
    }

    #[test]
    fn looser_accuracy_never_needs_more_iterations() {
        let run_with_accuracy = |accuracy: f64, name: &str| {
            let dir = tempdir().unwrap();
            let root = root_in(dir.path(), name);
            let mut mh = MetropolisHastings::new(1, |_: &[f64]| 0.0, &root)
                .unwrap()
                .set_seed(11);
            mh.set_param(0, "x", 0.0, 1.0, None, Some(0.2), Some(accuracy))
                .unwrap();
            mh.run(3000, false).unwrap().iterations
        };

        let tight = run_with_accuracy(0.02, "tight");
        let loose = run_with_accuracy(0.04, "loose");
        assert!(loose <= tight, "loose = {loose}, tight = {tight}");
    }

    #[test]
    fn blocked_and_singleton_partitions_both_sample_all_parameters() {
        let dir = tempdir().unwrap();
        let root = root_in(dir.path(), "blocked");
        let like = |p: &[f64]| p.iter().map(|x| x * x).sum::<f64>();
        let mut mh = MetropolisHastings::new(3, like, &root).unwrap().set_seed(17);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            mh.set_param(i, name, -5.0, 5.0, None, Some(0.5), Some(1e-12))
                .unwrap();
        }
        mh.specify_blocks(&[2, 3]).unwrap();

        let summary = mh.run(200, false).unwrap();
        assert_eq!(summary.acceptance_rates.len(), 2);
        assert!(summary.acceptance_rates.iter().all(|&r| r > 0.0));

        let rows = crate::chain_file::read_rows(&crate::chain_file::chain_path(&root)).unwrap();
        // Every parameter moved away from its starting value at least once.
        for i in 0..3 {
            assert!(rows.iter().any(|r| r.params[i] != rows[0].params[i]));
        }
    }

    #[test]
    fn run_parallel_produces_one_chain_per_sampler() {
        let dir = tempdir().unwrap();
        let mut samplers = Vec::new();
        for c in 0..3u64 {
            let root = root_in(dir.path(), &format!("chain_{c}"));
            let mut mh = MetropolisHastings::new(1, |_: &[f64]| 0.0, &root)
                .unwrap()
                .set_seed(100 + c);
            mh.set_param(0, "x", 0.0, 1.0, None, Some(0.1), Some(1e-12))
                .unwrap();
            samplers.push(mh);
        }

        let summaries = run_parallel(&mut samplers, 120, false).unwrap();
        assert_eq!(summaries.len(), 3);
        for (c, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.iterations, 120);
            let root = root_in(dir.path(), &format!("chain_{c}"));
            let rows =
                crate::chain_file::read_rows(&crate::chain_file::chain_path(&root)).unwrap();
            assert_eq!(rows.len(), 120);
        }
    }
}
