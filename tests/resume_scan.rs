//! Resume-path tests: the checkpointed bookkeeping must continue exactly
//! where an interrupted run stopped, and corrupt checkpoints must degrade
//! to a fresh start.

use blocked_mh::chain_file::{chain_path, read_rows};
use blocked_mh::checkpoint::CheckpointStore;
use blocked_mh::metropolis_hastings::MetropolisHastings;
use tempfile::tempdir;

fn root_in(dir: &std::path::Path, name: &str) -> String {
    dir.join(name).to_str().unwrap().to_string()
}

fn make_sampler(root: &str, seed: u64) -> MetropolisHastings<fn(&[f64]) -> f64> {
    fn flat(_: &[f64]) -> f64 {
        0.0
    }
    let mut mh = MetropolisHastings::new(1, flat as fn(&[f64]) -> f64, root)
        .unwrap()
        .set_seed(seed);
    // Accuracy no chain reaches, so only the hard cap stops the run.
    mh.set_param(0, "x", 0.0, 1.0, None, Some(0.1), Some(1e-12))
        .unwrap();
    mh
}

/// Recomputes the running sums from the chain file, starting from the
/// same "previous = starting point" convention the engine uses.
fn sums_from_rows(root: &str, start: f64) -> (f64, f64, f64) {
    let rows = read_rows(&chain_path(root)).unwrap();
    let (mut sum, mut sum_sq, mut cor_sum) = (0.0, 0.0, 0.0);
    let mut prev = start;
    for row in &rows {
        let x = row.params[0];
        sum += x;
        sum_sq += x * x;
        cor_sum += x * prev;
        prev = x;
    }
    (sum, sum_sq, cor_sum)
}

#[test]
fn resume_continues_the_bookkeeping_exactly() {
    let dir = tempdir().unwrap();
    let root = root_in(dir.path(), "chain");

    let summary = make_sampler(&root, 1).run(150, true).unwrap();
    assert_eq!(summary.iterations, 150);
    assert!(!summary.converged);

    let store = CheckpointStore::for_root(&root, 1);
    let mut state = store.load().expect("run should have left a checkpoint");
    assert_eq!(state.iteration, 150);
    assert_eq!(state.max_chain_length, 150);

    // The accumulators must equal what the chain file implies. The
    // starting point (midpoint 0.5) seeds the lag-1 product chain.
    let (sum, sum_sq, cor_sum) = sums_from_rows(&root, 0.5);
    assert_eq!(state.sum[0], sum);
    assert_eq!(state.sum_sq[0], sum_sq);
    assert_eq!(state.cor_sum[0], cor_sum);

    // Extend the finished chain by raising the stored bound.
    state.max_chain_length = 300;
    store.save(&state);

    // The paramnames sidecar belongs to the fresh start only.
    std::fs::remove_file(format!("{root}.paramnames")).unwrap();

    // The run argument is superseded by the checkpointed bound.
    let summary = make_sampler(&root, 2).run(999_999, true).unwrap();
    assert_eq!(summary.iterations, 300);
    assert!(!summary.converged);

    let rows = read_rows(&chain_path(&root)).unwrap();
    assert_eq!(rows.len(), 300);
    assert!(!std::path::Path::new(&format!("{root}.paramnames")).exists());

    // Bookkeeping is continuous across the resume boundary.
    let state = store.load().unwrap();
    assert_eq!(state.iteration, 300);
    let (sum, sum_sq, cor_sum) = sums_from_rows(&root, 0.5);
    assert_eq!(state.sum[0], sum);
    assert_eq!(state.sum_sq[0], sum_sq);
    assert_eq!(state.cor_sum[0], cor_sum);
}

#[test]
fn resumed_run_at_its_bound_adds_nothing() {
    let dir = tempdir().unwrap();
    let root = root_in(dir.path(), "chain");

    make_sampler(&root, 3).run(120, true).unwrap();
    let summary = make_sampler(&root, 4).run(120, true).unwrap();

    assert_eq!(summary.iterations, 120);
    assert_eq!(read_rows(&chain_path(&root)).unwrap().len(), 120);
    // No sweeps happened, so there are no rates to report.
    assert!(summary.acceptance_rates.iter().all(|&r| r == 0.0));
}

#[test]
fn corrupt_checkpoint_degrades_to_a_fresh_start() {
    let dir = tempdir().unwrap();
    let root = root_in(dir.path(), "chain");

    make_sampler(&root, 5).run(120, true).unwrap();

    // Truncate the resume file mid-record.
    let resume = format!("{root}resume.dat");
    let bytes = std::fs::read(&resume).unwrap();
    std::fs::write(&resume, &bytes[..bytes.len() / 2]).unwrap();

    let summary = make_sampler(&root, 6).run(130, true).unwrap();
    assert_eq!(summary.iterations, 130);

    // Fresh start truncated the chain file; only the new rows remain.
    assert_eq!(read_rows(&chain_path(&root)).unwrap().len(), 130);
}

#[test]
fn disabling_resume_information_leaves_no_checkpoint() {
    let dir = tempdir().unwrap();
    let root = root_in(dir.path(), "chain");

    make_sampler(&root, 8).run(110, false).unwrap();
    assert!(!std::path::Path::new(&format!("{root}resume.dat")).exists());
    assert!(CheckpointStore::for_root(&root, 1).load().is_none());
}
