//! Test doubles for the orchestration layer: in-memory markers and a fake executor,
//! that creates the expected outputs instead of running external tools.

use std::{
    fs,
    collections::HashSet,
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};
use crate::Error;
use super::{
    context::{Config, RunContext},
    exec::Executor,
    job::Job,
    marker::Markers,
    paths::{self, Layout},
    stage::{Stage, Tools},
};

/// Context with the default configuration and the given active samples.
pub fn context(root: &Path, samples: &[&str]) -> RunContext {
    let mut ctx = RunContext::new(Layout::new(root), Config::default(), Tools::default());
    ctx.set_samples(samples.iter().map(|s| s.to_string()));
    ctx
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

pub fn touch_raw_reads(ctx: &RunContext) {
    for sample in ctx.active() {
        touch(&ctx.layout.raw_read(sample, 1));
        touch(&ctx.layout.raw_read(sample, 2));
    }
}

pub fn touch_trimmed_reads(ctx: &RunContext) {
    for sample in ctx.active() {
        touch(&ctx.layout.trimmed_read(sample, 1));
        touch(&ctx.layout.trimmed_read(sample, 2));
    }
}

pub fn touch_assemblies(ctx: &RunContext) {
    fs::create_dir_all(ctx.layout.dir(paths::FASTA)).unwrap();
    for sample in ctx.active() {
        fs::write(ctx.layout.fasta(sample), ">contig_1\nACGT\n").unwrap();
    }
}

#[derive(Default)]
pub struct MemMarkers {
    done: Mutex<HashSet<(String, Stage)>>,
}

impl Markers for MemMarkers {
    fn exists(&self, sample: &str, stage: Stage) -> bool {
        self.done.lock().unwrap().contains(&(sample.to_owned(), stage))
    }

    fn mark(&self, sample: &str, stage: Stage) -> Result<(), Error> {
        if stage.is_per_sample() {
            self.done.lock().unwrap().insert((sample.to_owned(), stage));
        }
        Ok(())
    }

    fn clear(&self, sample: &str, stage: Stage) -> Result<(), Error> {
        self.done.lock().unwrap().remove(&(sample.to_owned(), stage));
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Outputs are written, but the job fails.
    Exit,
    /// Job succeeds without writing outputs.
    NoOutputs,
    /// Worker thread panics without writing outputs, as if the whole run was killed.
    Killed,
}

/// Records all executed jobs. `sample = None` stands for aggregate jobs.
#[derive(Default)]
pub struct FakeExecutor {
    faults: Vec<(Stage, Option<String>, Fault)>,
    delay: Duration,
    calls: Mutex<Vec<(Stage, Option<String>)>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, stage: Stage, sample: Option<&str>, fault: Fault) -> Self {
        self.faults.push((stage, sample.map(String::from), fault));
        self
    }

    /// Each job sleeps for the given number of milliseconds.
    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn calls(&self) -> Vec<(Stage, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Samples, processed at the stage, sorted.
    pub fn dispatched(&self, stage: Stage) -> Vec<String> {
        let mut samples: Vec<String> = self.calls().into_iter()
            .filter_map(|(s, sample)| if s == stage { sample } else { None })
            .collect();
        samples.sort();
        samples
    }

    /// Largest number of simultaneously running jobs.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Executor for FakeExecutor {
    fn execute(&self, job: &Job) -> Result<(), Error> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.calls.lock().unwrap().push((job.stage, job.sample.clone()));
        let fault = self.faults.iter()
            .find(|(stage, sample, _)| *stage == job.stage && *sample == job.sample)
            .map(|(_, _, fault)| *fault);
        if fault == Some(Fault::Killed) {
            panic!("{} was killed", job.label());
        }
        if fault != Some(Fault::NoOutputs) {
            for path in job.outputs.iter() {
                touch(path);
            }
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        match fault {
            Some(Fault::Exit) => Err(Error::Subprocess(format!("{} failed with exit status: 1", job.label()))),
            _ => Ok(()),
        }
    }
}
