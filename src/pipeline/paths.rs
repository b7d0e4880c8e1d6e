//! Paths to various directories and files within the working directory.

use std::path::{Path, PathBuf};

/// Raw reads are stashed in this directory at the end of a run.
pub const FASTQ_RAW: &'static str = "Fastq_raw";
/// Trimmed reads: `trimmed_reads/<sample>_{1,2}_val_{1,2}.fq.gz`.
pub const TRIMMED: &'static str = "trimmed_reads";
/// Unicycler output directories: `assembly/<sample>_assembly/`, all files prefixed with `<sample>_`.
pub const ASSEMBLY: &'static str = "assembly";
/// Final assemblies: `fasta/<sample>_assembly.fasta`.
pub const FASTA: &'static str = "fasta";
/// FastQC reports on trimmed reads.
pub const FASTQC: &'static str = "QC/fastQC";
/// TrimGalore reports, moved out of `trimmed_reads/`.
pub const TRIMMING_QC: &'static str = "QC/trimmed_reads";
/// MultiQC summary over FastQC reports.
pub const MULTIQC: &'static str = "QC/multiqc_trimmed";
/// Quast output directory.
pub const QUAST: &'static str = "QC/Quast";
/// Per-sample and overall read depth tables.
pub const READ_DEPTH: &'static str = "QC/readDepth";
/// Typing results (mlst and Kleborate).
pub const ANALYSES: &'static str = "analyses";
/// Completion markers.
pub const SUCCESS: &'static str = "success";
/// Logs of all external processes.
pub const LOGS: &'static str = "logs";

/// List of validated samples.
pub const SEQUENCE_LIST: &'static str = "sequence_list.txt";
/// Samples that passed every enabled stage.
pub const SUCCESSFUL: &'static str = "successful_sequences.txt";
/// Samples that failed in one of the stages.
pub const FAILED: &'static str = "failed_sequences.txt";
/// Failed samples together with the stage and the reason.
pub const FAILURE_REASONS: &'static str = "failure_reasons.tsv";
/// Run parameters, that influence finished assemblies.
pub const PARAMS: &'static str = "params.json";

/// Raw read suffixes, mate 1 and mate 2.
pub const RAW_SUFFIXES: [&'static str; 2] = ["_1.fastq.gz", "_2.fastq.gz"];

/// All paths used by the pipeline, relative to a single working directory.
/// Each sample-specific file name is `<sample><fixed suffix>`, so two different samples never share an output.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, subdir: &str) -> PathBuf {
        self.root.join(subdir)
    }

    /// Raw read file, `mate` is 1 or 2.
    pub fn raw_read(&self, sample: &str, mate: u8) -> PathBuf {
        self.root.join(format!("{}_{}.fastq.gz", sample, mate))
    }

    pub fn trimmed_read(&self, sample: &str, mate: u8) -> PathBuf {
        self.root.join(TRIMMED).join(format!("{}_{}_val_{}.fq.gz", sample, mate, mate))
    }

    pub fn trimming_report(&self, sample: &str, mate: u8) -> PathBuf {
        self.root.join(TRIMMED).join(format!("{}_{}.fastq.gz_trimming_report.txt", sample, mate))
    }

    /// Trimming report after it was moved into `QC/trimmed_reads/`.
    pub fn trimming_qc_report(&self, sample: &str, mate: u8) -> PathBuf {
        self.root.join(TRIMMING_QC).join(format!("{}_{}.fastq.gz_trimming_report.txt", sample, mate))
    }

    /// FastQC report for trimmed reads, `ext` is `zip` or `html`.
    pub fn fastqc_report(&self, sample: &str, mate: u8, ext: &str) -> PathBuf {
        self.root.join(FASTQC).join(format!("{}_{}_val_{}_fastqc.{}", sample, mate, mate, ext))
    }

    pub fn multiqc_fastqc_table(&self) -> PathBuf {
        self.root.join(MULTIQC).join("multiqc_data").join("multiqc_fastqc.txt")
    }

    pub fn assembly_dir(&self, sample: &str) -> PathBuf {
        self.root.join(ASSEMBLY).join(format!("{}_assembly", sample))
    }

    pub fn fasta(&self, sample: &str) -> PathBuf {
        self.root.join(FASTA).join(format!("{}_assembly.fasta", sample))
    }

    pub fn quast_report(&self) -> PathBuf {
        self.root.join(QUAST).join("transposed_report.tsv")
    }

    pub fn mlst_table(&self) -> PathBuf {
        self.root.join(ANALYSES).join("mlst.tsv")
    }

    pub fn kleborate_table(&self, timestamp: &str) -> PathBuf {
        self.root.join(ANALYSES).join(format!("Kleborate_{}.txt", timestamp))
    }

    pub fn depth_table(&self, sample: &str) -> PathBuf {
        self.root.join(READ_DEPTH).join(format!("{}_X.tsv", sample))
    }

    /// Scratch directory for read mapping, removed after depth calculation.
    pub fn depth_scratch(&self, sample: &str) -> PathBuf {
        self.root.join(READ_DEPTH).join(format!("{}_tmp", sample))
    }

    pub fn overall_depth_table(&self) -> PathBuf {
        self.root.join(READ_DEPTH).join("overall_readDepth.tsv")
    }

    pub fn marker(&self, name: &str) -> PathBuf {
        self.root.join(SUCCESS).join(name)
    }

    /// Log file for a tool, optionally prefixed with the sample name.
    pub fn log(&self, sample: Option<&str>, tool: &str) -> PathBuf {
        match sample {
            Some(sample) => self.root.join(LOGS).join(format!("{}_{}.log", sample, tool)),
            None => self.root.join(LOGS).join(format!("{}.log", tool)),
        }
    }

    pub fn report(&self, timestamp: &str) -> PathBuf {
        self.root.join(format!("Asmbl_{}.tsv", timestamp))
    }
}
