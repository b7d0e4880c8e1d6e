//! Run context: everything a stage needs to know about the current run.

use std::collections::BTreeSet;
use crate::{
    Error,
    ext,
};
use super::{
    paths::{self, Layout},
    stage::{Stage, Tools},
};

/// Parameters, set at process start.
#[derive(Clone, Debug)]
pub struct Config {
    pub threads: u16,
    /// Unicycler depth filter, relative to the chromosomal depth.
    pub depth_filter: f64,
    /// Only trim and assemble reads.
    pub no_extras: bool,
    pub no_fastqc: bool,
    pub no_mlst: bool,
    pub no_quast: bool,
    pub no_depth: bool,
    pub kleborate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 4,
            depth_filter: 0.25,
            no_extras: false,
            no_fastqc: false,
            no_mlst: false,
            no_quast: false,
            no_depth: false,
            kleborate: false,
        }
    }
}

impl Config {
    pub fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Trim | Stage::Assemble => true,
            Stage::FastQc => !self.no_extras && !self.no_fastqc,
            Stage::Quast => !self.no_extras && !self.no_quast,
            Stage::Mlst => !self.no_extras && !self.no_mlst,
            Stage::Depth => !self.no_extras && !self.no_depth,
            Stage::Kleborate => !self.no_extras && self.kleborate,
        }
    }
}

/// Sample that failed in one of the stages.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    pub sample: String,
    pub stage: Stage,
    pub reason: String,
}

/// Final partition of samples. Each sample appears in exactly one of the two lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
}

pub struct RunContext {
    pub layout: Layout,
    pub config: Config,
    pub tools: Tools,
    /// Run timestamp, used in the names of the output files.
    pub timestamp: String,
    /// Samples, still eligible for further stages.
    active: BTreeSet<String>,
    failures: Vec<Failure>,
}

impl RunContext {
    pub fn new(layout: Layout, config: Config, tools: Tools) -> Self {
        Self {
            layout, config, tools,
            timestamp: chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string(),
            active: BTreeSet::new(),
            failures: Vec::new(),
        }
    }

    /// Sets initial sample list after validation.
    pub fn set_samples(&mut self, samples: impl IntoIterator<Item = String>) {
        self.active = samples.into_iter().collect();
        self.failures.clear();
    }

    pub fn active(&self) -> &BTreeSet<String> {
        &self.active
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Removes the sample from the active set and records the failure.
    /// Failures are sticky: a sample, that is not active anymore, cannot fail again.
    pub fn fail(&mut self, sample: &str, stage: Stage, reason: String) -> bool {
        if self.active.remove(sample) {
            self.failures.push(Failure { sample: sample.to_owned(), stage, reason });
            true
        } else {
            log::warn!("Sample {} is not active, cannot register its failure at {}", sample, stage);
            false
        }
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            successful: self.active.iter().cloned().collect(),
            failed: self.failures.iter().map(|failure| failure.sample.clone()).collect(),
        }
    }

    /// Writes successful and failed sample lists, as well as the failure reasons.
    pub fn write_manifest(&self) -> Result<Manifest, Error> {
        let manifest = self.manifest();
        let layout = &self.layout;
        ext::sys::write_lines(&layout.dir(paths::SUCCESSFUL), &manifest.successful)?;
        ext::sys::write_lines(&layout.dir(paths::FAILED), &manifest.failed)?;
        ext::sys::write_lines(&layout.dir(paths::FAILURE_REASONS),
            std::iter::once("sample\tstage\treason".to_owned())
                .chain(self.failures.iter().map(|f| format!("{}\t{}\t{}", f.sample, f.stage, f.reason))))?;
        Ok(manifest)
    }
}
