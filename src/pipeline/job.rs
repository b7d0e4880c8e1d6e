//! Typed description of the work, performed for one sample (or once per stage).

use std::{
    ffi::{OsStr, OsString},
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use crate::{
    Error,
    err::add_path,
    ext,
};
use super::stage::Stage;

/// One external process: explicit program, argument list, stdout redirection and log file.
/// Process stderr (and stdout, if not redirected) is appended to the log file.
#[derive(Clone, Debug)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    stdout: Option<PathBuf>,
    log: PathBuf,
}

impl Invocation {
    pub fn new(program: &Path, log: PathBuf) -> Self {
        Self {
            program: program.to_owned(),
            args: Vec::new(),
            stdout: None,
            log,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<S: AsRef<OsStr>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Redirect standard output into a file (truncated before the start).
    pub fn stdout(mut self, path: PathBuf) -> Self {
        self.stdout = Some(path);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn log(&self) -> &Path {
        &self.log
    }

    /// Builds the process command, opening the log file and the stdout file.
    pub fn command(&self) -> Result<Command, Error> {
        let log = OpenOptions::new().create(true).append(true).open(&self.log).map_err(add_path!(self.log))?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        match &self.stdout {
            Some(path) => cmd.stdout(File::create(path).map_err(add_path!(path))?),
            None => cmd.stdout(log.try_clone().map_err(add_path!(self.log))?),
        };
        cmd.stderr(log);
        Ok(cmd)
    }

    /// Command line in a human-readable form.
    pub fn display(&self) -> String {
        let mut s = ext::fmt::command(self.program.as_os_str(), self.args.iter().map(OsString::as_os_str));
        if let Some(path) = &self.stdout {
            s.push_str(" > ");
            s.push_str(&ext::fmt::path(path));
        }
        s
    }
}

/// Single step of a job. Steps are executed in order, the first failed step fails the whole job.
#[derive(Clone, Debug)]
pub enum Step {
    /// Run external process, non-zero exit status is a failure.
    Exec(Invocation),
    /// Copy file.
    Copy { from: PathBuf, to: PathBuf },
    /// Concatenate several files into one.
    Concat { inputs: Vec<PathBuf>, output: PathBuf },
    /// Summarize `samtools depth` output into a single line `sample  mean  stdev`.
    DepthSummary { sample: String, depth: PathBuf, output: PathBuf },
    /// Remove file or directory.
    Remove(PathBuf),
    /// Move file into the directory, keeping its name.
    MoveInto { file: PathBuf, dir: PathBuf },
    /// Rename all files in the directory into `<prefix>_<name>`.
    PrefixFiles { dir: PathBuf, prefix: String },
}

/// Work unit: either a (sample, stage) pair, or a stage-level aggregate job (`sample = None`).
#[derive(Clone, Debug)]
pub struct Job {
    pub stage: Stage,
    pub sample: Option<String>,
    /// Files that must exist before the job is started.
    pub inputs: Vec<PathBuf>,
    /// Directories, created before the job is started.
    pub dirs: Vec<PathBuf>,
    pub steps: Vec<Step>,
    /// Files that must exist after all steps succeeded.
    pub outputs: Vec<PathBuf>,
    /// Files and directories, removed if the job fails or before it is restarted.
    pub byproducts: Vec<PathBuf>,
}

impl Job {
    pub fn for_sample(stage: Stage, sample: &str) -> Self {
        Self::new(stage, Some(sample.to_owned()))
    }

    pub fn aggregate(stage: Stage) -> Self {
        Self::new(stage, None)
    }

    fn new(stage: Stage, sample: Option<String>) -> Self {
        Self {
            stage, sample,
            inputs: Vec::new(),
            dirs: Vec::new(),
            steps: Vec::new(),
            outputs: Vec::new(),
            byproducts: Vec::new(),
        }
    }

    pub fn label(&self) -> String {
        match &self.sample {
            Some(sample) => format!("{} {}", sample, self.stage),
            None => self.stage.aggregate_name().to_owned(),
        }
    }

    pub fn exec(&mut self, invocation: Invocation) -> &mut Self {
        self.steps.push(Step::Exec(invocation));
        self
    }

    pub fn step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// All invocations of the job, in order.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.steps.iter().filter_map(|step| match step {
            Step::Exec(inv) => Some(inv),
            _ => None,
        })
    }

    pub fn missing_inputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.inputs.iter().filter(|path| !path.exists())
    }

    pub fn missing_outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.outputs.iter().filter(|path| !path.exists())
    }
}
