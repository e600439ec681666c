// =============================================================================
// CmdStan Backend
// =============================================================================
//
// Runs a compiled CmdStan executable of the ordinal model. The data record is
// written as JSON, each chain runs as its own process (in parallel), and the
// output CSV files are read back into `Draws`.
//
// CSV FORMAT
// ----------
// Lines starting with '#' are configuration and adaptation comments. The
// first non-comment line is the header; array elements appear as `beta.1`,
// `beta.2`, ... and are renamed to `beta[1]`, `beta[2]`. For variational
// output the first data row is the mean of the approximation, not a draw.
//
// =============================================================================

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use super::{Algorithm, PosteriorBackend, SamplingConfig, VariationalConfig, LOG_DENSITY};
use crate::draws::Draws;
use crate::error::{PolrError, Result};
use crate::standata::PolrData;

/// Backend driving a compiled CmdStan model.
#[derive(Debug, Clone)]
pub struct CmdStanBackend {
    executable: PathBuf,
    output_dir: PathBuf,
    file_stem: String,
}

impl CmdStanBackend {
    /// `executable` is the compiled model; data and output files go to
    /// `output_dir`, which is created if missing.
    pub fn new(executable: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            output_dir: output_dir.into(),
            file_stem: "polr".to_string(),
        }
    }

    /// Prefix for the files written to the output directory.
    pub fn with_file_stem(mut self, stem: &str) -> Self {
        self.file_stem = stem.to_string();
        self
    }

    pub fn data_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}-data.json", self.file_stem))
    }

    pub fn output_path(&self, chain: usize) -> PathBuf {
        self.output_dir.join(format!("{}-{}.csv", self.file_stem, chain))
    }

    /// Command-line arguments for one sampling chain (1-based `chain`).
    pub fn sample_args(&self, config: &SamplingConfig, chain: usize) -> Vec<String> {
        let mut args = vec![format!("id={}", chain)];
        if let Some(seed) = config.seed {
            args.push("random".to_string());
            args.push(format!("seed={}", seed));
        }
        args.extend([
            "data".to_string(),
            format!("file={}", self.data_path().display()),
            "output".to_string(),
            format!("file={}", self.output_path(chain).display()),
            format!("refresh={}", config.refresh),
            "method=sample".to_string(),
            format!("num_samples={}", config.draws_per_chain()),
            format!("num_warmup={}", config.warmup()),
            "algorithm=hmc".to_string(),
            "engine=nuts".to_string(),
            format!("max_depth={}", config.max_treedepth),
            "adapt".to_string(),
            format!("delta={}", config.adapt_delta),
        ]);
        args
    }

    /// Command-line arguments for a variational run.
    pub fn variational_args(&self, algorithm: Algorithm, config: &VariationalConfig) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(seed) = config.seed {
            args.push("random".to_string());
            args.push(format!("seed={}", seed));
        }
        args.extend([
            "data".to_string(),
            format!("file={}", self.data_path().display()),
            "output".to_string(),
            format!("file={}", self.output_path(1).display()),
            "method=variational".to_string(),
            format!("algorithm={}", algorithm.name()),
            format!("iter={}", config.iter),
            format!("tol_rel_obj={}", config.tol_rel_obj),
            format!("output_samples={}", config.output_samples),
        ]);
        if let Some(eta) = config.eta {
            args.push(format!("eta={}", eta));
            args.push("adapt".to_string());
            args.push("engaged=0".to_string());
        }
        args
    }

    fn prepare(&self, data: &PolrData) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        data.write_json(&self.data_path())?;
        debug!("wrote engine data to {}", self.data_path().display());
        Ok(())
    }

    fn run(&self, args: &[String]) -> Result<()> {
        debug!("running {} {}", self.executable.display(), args.join(" "));
        let output = Command::new(&self.executable).args(args).output().map_err(|e| {
            PolrError::Backend(format!(
                "failed to start '{}': {}",
                self.executable.display(),
                e
            ))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PolrError::Backend(format!(
                "'{}' exited with {}: {}",
                self.executable.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl PosteriorBackend for CmdStanBackend {
    fn name(&self) -> &str {
        "cmdstan"
    }

    fn sample(&self, data: &PolrData, pars: &[&str], config: &SamplingConfig) -> Result<Draws> {
        self.prepare(data)?;
        let chains: Vec<Draws> = (1..=config.chains)
            .into_par_iter()
            .map(|chain| {
                self.run(&self.sample_args(config, chain))?;
                let draws = parse_stan_csv(&self.output_path(chain), pars, false)?;
                info!("chain {} finished with {} draws", chain, draws.n_iterations());
                Ok(draws)
            })
            .collect::<Result<Vec<Draws>>>()?;
        Draws::stack_chains(chains)
    }

    fn variational(
        &self,
        data: &PolrData,
        pars: &[&str],
        algorithm: Algorithm,
        config: &VariationalConfig,
    ) -> Result<Draws> {
        self.prepare(data)?;
        self.run(&self.variational_args(algorithm, config))?;
        parse_stan_csv(&self.output_path(1), pars, true)
    }
}

/// Read one CmdStan output file, keeping the requested blocks and `lp__`.
pub fn parse_stan_csv(path: &Path, pars: &[&str], variational: bool) -> Result<Draws> {
    let file = File::open(path).map_err(|e| {
        PolrError::Backend(format!("cannot open engine output {}: {}", path.display(), e))
    })?;
    parse_stan_csv_reader(BufReader::new(file), pars, variational)
}

pub(crate) fn parse_stan_csv_reader<R: Read>(
    reader: R,
    pars: &[&str],
    variational: bool,
) -> Result<Draws> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(engine_element_name)
        .collect();

    let keep: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            let block = name.split('[').next().unwrap_or_default();
            block == LOG_DENSITY || pars.contains(&block)
        })
        .map(|(i, _)| i)
        .collect();
    let names: Vec<String> = keep.iter().map(|&i| header[i].clone()).collect();

    let mut rows: Vec<f64> = Vec::new();
    let mut n_rows = 0usize;
    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        if variational && line == 0 {
            // Mean of the approximation
            continue;
        }
        for &i in &keep {
            let field = record.get(i).ok_or_else(|| {
                PolrError::Backend(format!("row {} of engine output is truncated", line + 1))
            })?;
            let value: f64 = field.parse().map_err(|_| {
                PolrError::Backend(format!(
                    "cannot parse '{}' in column '{}' of engine output",
                    field, header[i]
                ))
            })?;
            rows.push(value);
        }
        n_rows += 1;
    }

    let chain = Array2::from_shape_vec((n_rows, names.len()), rows)
        .map_err(|e| PolrError::Backend(format!("malformed engine output: {}", e)))?;
    Draws::from_single_chain(chain, names)
}

/// `beta.2` → `beta[2]`, `a.1.3` → `a[1,3]`; scalars unchanged.
fn engine_element_name(column: &str) -> String {
    let mut parts = column.split('.');
    let base = parts.next().unwrap_or_default();
    let indices: Vec<&str> = parts.collect();
    if indices.is_empty() || indices.iter().any(|s| s.parse::<usize>().is_err()) {
        column.to_string()
    } else {
        format!("{}[{}]", base, indices.join(","))
    }
}
