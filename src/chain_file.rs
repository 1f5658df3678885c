/*!
# Chain File I/O

One text row per completed sweep:

```text
1   <-2 ln L>   <param_0>   ...   <param_{N-1}>
```

The leading repeat count is always 1 here; multiplicities come from later
deduplication downstream, never from the engine. Rows are strictly in
iteration order. A `.paramnames` sidecar lists one `<name>\t<name>` line
per parameter and is written once at the start of a fresh run.

The writer buffers rows and is periodically flushed and reopened by the
engine so that a crash loses at most the rows since the last boundary.
*/

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::McmcError;
use crate::params::ParameterSpec;

/// Appends sample rows to `<root>.txt`.
#[derive(Debug)]
pub struct ChainWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl ChainWriter {
    /// Opens the chain file fresh, truncating any previous contents.
    pub fn create(file_root: &str) -> Result<Self, McmcError> {
        let path = chain_path(file_root);
        let out = BufWriter::new(File::create(&path)?);
        Ok(Self { path, out })
    }

    /// Reopens an existing chain file in append mode (resume).
    pub fn append(file_root: &str) -> Result<Self, McmcError> {
        let path = chain_path(file_root);
        let out = BufWriter::new(OpenOptions::new().append(true).create(true).open(&path)?);
        Ok(Self { path, out })
    }

    /// Writes one row: repeat count 1, `-2 ln L`, then all parameters.
    pub fn write_row(&mut self, like: f64, params: &[f64]) -> Result<(), McmcError> {
        write!(self.out, "1   {like}")?;
        for p in params {
            write!(self.out, "   {p}")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Flushes and reopens the file in append mode (crash-safety boundary).
    pub fn reopen(&mut self) -> Result<(), McmcError> {
        self.out.flush()?;
        self.out = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        Ok(())
    }

    /// Flushes any buffered rows.
    pub fn finish(mut self) -> Result<(), McmcError> {
        self.out.flush()?;
        Ok(())
    }
}

/// The chain file path for a file root.
pub fn chain_path(file_root: &str) -> PathBuf {
    PathBuf::from(format!("{file_root}.txt"))
}

/// Writes the `<root>.paramnames` sidecar.
pub fn write_param_names(file_root: &str, specs: &[ParameterSpec]) -> Result<(), McmcError> {
    let mut out = BufWriter::new(File::create(format!("{file_root}.paramnames"))?);
    for spec in specs {
        writeln!(out, "{}\t{}", spec.name, spec.name)?;
    }
    out.flush()?;
    Ok(())
}

/// One parsed chain row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainRow {
    /// The repeat count (always 1 for rows this engine wrote).
    pub weight: u64,
    /// `-2 ln L` of the point.
    pub like: f64,
    /// The parameter values.
    pub params: Vec<f64>,
}

/// Reads all rows of a chain file back.
pub fn read_rows(path: &Path) -> Result<Vec<ChainRow>, McmcError> {
    let input = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (lineno, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let weight = parse_field(fields.next(), lineno, &line)?;
        let like = parse_field(fields.next(), lineno, &line)?;
        let params = fields
            .map(|f| {
                f.parse::<f64>().map_err(|_| {
                    McmcError::ChainFormat(format!("line {}: bad value {f:?}", lineno + 1))
                })
            })
            .collect::<Result<Vec<f64>, McmcError>>()?;
        rows.push(ChainRow {
            weight,
            like,
            params,
        });
    }
    Ok(rows)
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    lineno: usize,
    line: &str,
) -> Result<T, McmcError> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| McmcError::ChainFormat(format!("line {}: {line:?}", lineno + 1)))
}
