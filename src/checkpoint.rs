/*!
# Checkpointing

The sampler's full mutable state fits in one fixed-layout binary record:

```text
max_chain_length  u64
iteration         u64
current -2 ln L   f64
current prior     f64
current[N]        f64 each
previous[N]       f64 each
sum[N]            f64 each
sum_sq[N]         f64 each
cor_sum[N]        f64 each
marker            u32 = 123456
```

All values are little-endian. A checkpoint is valid if and only if the
file exists, has exactly this length, and ends with the marker; anything
else is treated as "no checkpoint" so an interrupted write can never poison
a resume. Saving is best-effort: the record goes to a temporary file that
is atomically renamed over the real one, and failures are logged rather
than surfaced — a run must never die because its resume file could not be
written.
*/

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Trailing integrity marker; a record without it is not a checkpoint.
const MARKER: u32 = 123_456;

/// The checkpointed sampler state for one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerState {
    /// The hard iteration cap the run was started with.
    pub max_chain_length: u64,
    /// Completed sweeps so far.
    pub iteration: u64,
    /// `-2 ln L` at the current point.
    pub current_like: f64,
    /// Prior density at the current point.
    pub current_prior: f64,
    /// The current parameter vector.
    pub current: Vec<f64>,
    /// The vector one full sweep earlier.
    pub previous: Vec<f64>,
    /// Running `Σx` per parameter.
    pub sum: Vec<f64>,
    /// Running `Σx²` per parameter.
    pub sum_sq: Vec<f64>,
    /// Running `Σ(x · x_prev)` per parameter.
    pub cor_sum: Vec<f64>,
}

/// Reads and writes the resume file for one chain.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    n_params: usize,
}

impl CheckpointStore {
    /// A store for `n_params` parameters writing to `<root>resume.dat`.
    pub fn for_root(file_root: &str, n_params: usize) -> Self {
        Self {
            path: PathBuf::from(format!("{file_root}resume.dat")),
            n_params,
        }
    }

    /// The resume file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn expected_len(&self) -> u64 {
        // 4 scalars, 5 arrays of n_params doubles, u32 marker.
        4 * 8 + (5 * self.n_params * 8) as u64 + 4
    }

    /// Persists `state`, best-effort.
    ///
    /// Failures are logged and swallowed; checkpointing must never abort
    /// a run.
    pub fn save(&self, state: &SamplerState) {
        if let Err(err) = self.write_record(state) {
            log::warn!(
                "could not write checkpoint {}: {err}",
                self.path.display()
            );
        }
    }

    fn write_record(&self, state: &SamplerState) -> io::Result<()> {
        let tmp = self.path.with_extension("dat.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            out.write_all(&state.max_chain_length.to_le_bytes())?;
            out.write_all(&state.iteration.to_le_bytes())?;
            out.write_all(&state.current_like.to_le_bytes())?;
            out.write_all(&state.current_prior.to_le_bytes())?;
            for array in [
                &state.current,
                &state.previous,
                &state.sum,
                &state.sum_sq,
                &state.cor_sum,
            ] {
                for &v in array.iter() {
                    out.write_all(&v.to_le_bytes())?;
                }
            }
            out.write_all(&MARKER.to_le_bytes())?;
            out.flush()?;
        }
        fs::rename(&tmp, &self.path)
    }

    /// Loads the checkpoint, if a valid one exists.
    ///
    /// A missing file is a normal fresh start; a file with the wrong
    /// length or a mismatched trailing marker is reported as corrupt and
    /// likewise treated as absent.
    pub fn load(&self) -> Option<SamplerState> {
        let metadata = fs::metadata(&self.path).ok()?;
        if metadata.len() != self.expected_len() {
            log::warn!(
                "checkpoint {} is truncated or has the wrong size, starting fresh",
                self.path.display()
            );
            return None;
        }

        match self.read_record() {
            Ok(Some(state)) => Some(state),
            Ok(None) => {
                log::warn!(
                    "checkpoint {} has a bad integrity marker, starting fresh",
                    self.path.display()
                );
                None
            }
            Err(err) => {
                log::warn!(
                    "could not read checkpoint {}: {err}, starting fresh",
                    self.path.display()
                );
                None
            }
        }
    }

    fn read_record(&self) -> io::Result<Option<SamplerState>> {
        let mut input = BufReader::new(File::open(&self.path)?);

        let max_chain_length = read_u64(&mut input)?;
        let iteration = read_u64(&mut input)?;
        let current_like = read_f64(&mut input)?;
        let current_prior = read_f64(&mut input)?;
        let current = read_f64_array(&mut input, self.n_params)?;
        let previous = read_f64_array(&mut input, self.n_params)?;
        let sum = read_f64_array(&mut input, self.n_params)?;
        let sum_sq = read_f64_array(&mut input, self.n_params)?;
        let cor_sum = read_f64_array(&mut input, self.n_params)?;

        let mut marker = [0u8; 4];
        input.read_exact(&mut marker)?;
        if u32::from_le_bytes(marker) != MARKER {
            return Ok(None);
        }

        Ok(Some(SamplerState {
            max_chain_length,
            iteration,
            current_like,
            current_prior,
            current,
            previous,
            sum,
            sum_sq,
            cor_sum,
        }))
    }
}

fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64<R: Read>(input: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_f64_array<R: Read>(input: &mut R, len: usize) -> io::Result<Vec<f64>> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_f64(input)?);
    }
    Ok(out)
}
