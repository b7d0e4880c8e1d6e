//! Job execution.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, Write},
    path::Path,
    time::Instant,
};
use crate::{
    Error,
    err::{add_path, error},
    ext,
};
use super::job::{Invocation, Job, Step};

/// Executes jobs. Implementations must be usable from several worker threads at once.
pub trait Executor: Sync {
    /// Runs all job steps in order, stopping at the first failure.
    fn execute(&self, job: &Job) -> Result<(), Error>;
}

/// Executes jobs as OS processes.
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&self, job: &Job) -> Result<(), Error> {
        let timer = Instant::now();
        for step in job.steps.iter() {
            match step {
                Step::Exec(invocation) => run(invocation)?,
                Step::Copy { from, to } => {
                    fs::copy(from, to).map_err(add_path!(from, to))?;
                }
                Step::Concat { inputs, output } => concat(inputs, output)?,
                Step::DepthSummary { sample, depth, output } => {
                    let reader = BufReader::new(File::open(depth).map_err(add_path!(depth))?);
                    let (mean, sd) = depth_stats(reader).map_err(|e| match e {
                        Error::Io(e, _) => Error::Io(e, vec![depth.clone()]),
                        e => e,
                    })?;
                    fs::write(output, format!("{}\t{:.3}\t{:.3}\n", sample, mean, sd)).map_err(add_path!(output))?;
                }
                Step::Remove(path) => {
                    ext::sys::remove_any(path).map_err(add_path!(path))?;
                }
                Step::MoveInto { file, dir } => {
                    ext::sys::move_into(file, dir)?;
                }
                Step::PrefixFiles { dir, prefix } => prefix_files(dir, prefix)?,
            }
        }
        log::debug!("    [{}] Finished in {}", job.label(), ext::fmt::Duration(timer.elapsed()));
        Ok(())
    }
}

/// Runs the process and waits for it to finish. Non-zero exit status is converted into an error.
fn run(invocation: &Invocation) -> Result<(), Error> {
    log::debug!("    {}", invocation.display());
    let mut cmd = invocation.command()?;
    let status = cmd.status().map_err(|e| error!(Subprocess, "Cannot start {}: {}",
        ext::fmt::path(invocation.program()), e))?;
    if status.success() {
        Ok(())
    } else {
        Err(error!(Subprocess, "{} failed with {} (see {})",
            ext::fmt::path(invocation.program()), status, ext::fmt::path(invocation.log())))
    }
}

/// Concatenates all input files into the output file.
pub fn concat(inputs: &[impl AsRef<Path>], output: &Path) -> Result<(), Error> {
    let mut writer = ext::sys::create_file(output)?;
    for input in inputs {
        let input = input.as_ref();
        let mut reader = File::open(input).map_err(add_path!(input))?;
        io::copy(&mut reader, &mut writer).map_err(add_path!(input, output))?;
    }
    writer.flush().map_err(add_path!(output))
}

/// Adds `<prefix>_` to the names of all files in the directory that do not start with it yet.
/// Subdirectories are left unchanged.
pub fn prefix_files(dir: &Path, prefix: &str) -> Result<(), Error> {
    let prefix = format!("{}_", prefix);
    for entry in fs::read_dir(dir).map_err(add_path!(dir))? {
        let path = entry.map_err(add_path!(dir))?.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else { continue };
        if path.is_file() && !name.starts_with(&prefix) {
            let target = dir.join(format!("{}{}", prefix, name));
            fs::rename(&path, &target).map_err(add_path!(path, target))?;
        }
    }
    Ok(())
}

/// Calculates mean read depth and its standard deviation from `samtools depth -a` output
/// (three columns: contig, position, depth). Every line is one position of the assembly.
pub fn depth_stats(reader: impl BufRead) -> Result<(f64, f64), Error> {
    let mut n = 0_u64;
    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    for line in reader.lines() {
        let line = line.map_err(add_path!(!))?;
        if line.is_empty() {
            continue;
        }
        let depth: f64 = line.split('\t').nth(2)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| Error::ParsingError(format!("Cannot parse read depth from line {:?}", line)))?
            as f64;
        n += 1;
        sum += depth;
        sum_sq += depth * depth;
    }
    if n == 0 {
        return Err(Error::InvalidData("Read depth is not available for any position".to_owned()));
    }
    let n = n as f64;
    let mean = sum / n;
    let var = (sum_sq / n - mean * mean).max(0.0);
    Ok((mean, var.sqrt()))
}
