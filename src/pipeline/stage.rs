//! Statically defined pipeline stages and their input/output contracts.

use std::{
    fmt,
    cmp::max,
    path::PathBuf,
};
use crate::{
    Error,
    ext,
};
use super::{
    paths,
    context::{RunContext, Config},
    job::{Job, Invocation, Step},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// TrimGalore on raw read pairs.
    Trim,
    /// FastQC on trimmed reads, followed by a MultiQC summary.
    FastQc,
    /// Unicycler assembly.
    Assemble,
    /// Quast over all assemblies.
    Quast,
    /// Species and sequence type identification.
    Mlst,
    /// Average read depth across the assembly.
    Depth,
    /// Extended typing with Kleborate.
    Kleborate,
}

impl Stage {
    /// Stages in the order of execution.
    pub const ORDER: [Stage; 7] = [Stage::Trim, Stage::FastQc, Stage::Assemble, Stage::Quast,
        Stage::Mlst, Stage::Depth, Stage::Kleborate];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Trim => "trimming",
            Stage::FastQc => "FastQC",
            Stage::Assemble => "assembly",
            Stage::Quast => "Quast",
            Stage::Mlst => "MLST",
            Stage::Depth => "read depth calculation",
            Stage::Kleborate => "Kleborate",
        }
    }

    /// Name of the stage-level step, executed once after all samples are processed.
    pub fn aggregate_name(self) -> &'static str {
        match self {
            Stage::FastQc => "MultiQC",
            Stage::Depth => "read depth summary",
            _ => self.name(),
        }
    }

    /// Does the stage process every sample separately?
    pub fn is_per_sample(self) -> bool {
        self.marker_suffix().is_some()
    }

    /// Per-sample stages are tracked with marker files `success/<sample>_<suffix>`.
    pub fn marker_suffix(self) -> Option<&'static str> {
        match self {
            Stage::Trim => Some("Trimming_complete.txt"),
            Stage::FastQc => Some("FastQC_complete.txt"),
            Stage::Assemble => Some("Assembly_complete.txt"),
            Stage::Depth => Some("readDepth.Success"),
            Stage::Quast | Stage::Mlst | Stage::Kleborate => None,
        }
    }

    /// Returns the number of simultaneous jobs and the number of threads, given to each job.
    /// Assembly and read mapping are limited to `threads / 8` parallel jobs when there are more than 8 threads.
    pub fn concurrency(self, threads: u16) -> (usize, u16) {
        let threads = max(threads, 1);
        match self {
            Stage::Assemble | Stage::Depth => {
                let jobs = if threads > 8 { threads / 8 } else { threads };
                (usize::from(jobs), max(1, threads / jobs))
            }
            _ => (usize::from(threads), 1),
        }
    }

    /// Builds the job for a single sample. Returns None for stages without per-sample work.
    pub fn sample_job(self, ctx: &RunContext, sample: &str) -> Option<Job> {
        match self {
            Stage::Trim => Some(trim_job(ctx, sample)),
            Stage::FastQc => Some(fastqc_job(ctx, sample)),
            Stage::Assemble => Some(assembly_job(ctx, sample)),
            Stage::Depth => Some(depth_job(ctx, sample)),
            Stage::Quast | Stage::Mlst | Stage::Kleborate => None,
        }
    }

    /// Builds the stage-level job over all active samples, if the stage has one and there is something to process.
    pub fn aggregate_job(self, ctx: &RunContext) -> Option<Job> {
        match self {
            Stage::Trim | Stage::Assemble => None,
            Stage::FastQc => multiqc_job(ctx),
            Stage::Quast => quast_job(ctx),
            Stage::Mlst => mlst_job(ctx),
            Stage::Depth => depth_summary_job(ctx),
            Stage::Kleborate => kleborate_job(ctx),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Paths to the external tools.
#[derive(Clone, Debug)]
pub struct Tools {
    pub trim_galore: PathBuf,
    pub fastqc: PathBuf,
    pub multiqc: PathBuf,
    pub unicycler: PathBuf,
    pub quast: PathBuf,
    pub mlst: PathBuf,
    pub bwa: PathBuf,
    pub picard: PathBuf,
    pub samtools: PathBuf,
    pub kleborate: PathBuf,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            trim_galore: PathBuf::from("trim_galore"),
            fastqc: PathBuf::from("fastqc"),
            multiqc: PathBuf::from("multiqc"),
            unicycler: PathBuf::from("unicycler"),
            quast: PathBuf::from("quast.py"),
            mlst: PathBuf::from("mlst"),
            bwa: PathBuf::from("bwa"),
            picard: PathBuf::from("picard"),
            samtools: PathBuf::from("samtools"),
            kleborate: PathBuf::from("kleborate"),
        }
    }
}

impl Tools {
    /// Executables, needed for the stage.
    fn for_stage(&mut self, stage: Stage) -> Vec<&mut PathBuf> {
        match stage {
            Stage::Trim => vec![&mut self.trim_galore],
            Stage::FastQc => vec![&mut self.fastqc, &mut self.multiqc],
            Stage::Assemble => vec![&mut self.unicycler],
            Stage::Quast => vec![&mut self.quast],
            Stage::Mlst => vec![&mut self.mlst],
            Stage::Depth => vec![&mut self.bwa, &mut self.picard, &mut self.samtools],
            Stage::Kleborate => vec![&mut self.kleborate],
        }
    }

    /// Finds executables for all enabled stages.
    pub fn resolve(&mut self, config: &Config) -> Result<(), Error> {
        for stage in Stage::ORDER {
            if config.enabled(stage) {
                for exe in self.for_stage(stage) {
                    let path = ext::sys::find_exe(&*exe)?;
                    *exe = path;
                }
            }
        }
        Ok(())
    }
}

fn trim_job(ctx: &RunContext, sample: &str) -> Job {
    let layout = &ctx.layout;
    let raw_reads = vec![layout.raw_read(sample, 1), layout.raw_read(sample, 2)];
    let mut job = Job::for_sample(Stage::Trim, sample);
    job.dirs = vec![layout.dir(paths::TRIMMED), layout.dir(paths::TRIMMING_QC), layout.dir(paths::LOGS)];
    job.exec(Invocation::new(&ctx.tools.trim_galore, layout.log(Some(sample), "trimgalore"))
        .arg("--paired")
        .arg("--output_dir").arg(layout.dir(paths::TRIMMED))
        .args(&raw_reads));
    for mate in [1, 2] {
        job.step(Step::MoveInto { file: layout.trimming_report(sample, mate), dir: layout.dir(paths::TRIMMING_QC) });
    }
    job.inputs = raw_reads;
    job.outputs = vec![layout.trimmed_read(sample, 1), layout.trimmed_read(sample, 2)];
    job.byproducts = vec![
        layout.trimmed_read(sample, 1), layout.trimmed_read(sample, 2),
        layout.trimming_report(sample, 1), layout.trimming_report(sample, 2),
        layout.trimming_qc_report(sample, 1), layout.trimming_qc_report(sample, 2),
    ];
    job
}

fn fastqc_job(ctx: &RunContext, sample: &str) -> Job {
    let layout = &ctx.layout;
    let reads = vec![layout.trimmed_read(sample, 1), layout.trimmed_read(sample, 2)];
    let mut job = Job::for_sample(Stage::FastQc, sample);
    job.dirs = vec![layout.dir(paths::FASTQC), layout.dir(paths::LOGS)];
    job.exec(Invocation::new(&ctx.tools.fastqc, layout.log(Some(sample), "fastqc_trimmed"))
        .args(&reads)
        .arg("-o").arg(layout.dir(paths::FASTQC)));
    job.inputs = reads;
    job.outputs = vec![layout.fastqc_report(sample, 1, "zip"), layout.fastqc_report(sample, 2, "zip")];
    job.byproducts = [1, 2].into_iter()
        .flat_map(|mate| [layout.fastqc_report(sample, mate, "zip"), layout.fastqc_report(sample, mate, "html")])
        .collect();
    job
}

/// MultiQC is always rerun over all available FastQC reports.
fn multiqc_job(ctx: &RunContext) -> Option<Job> {
    let layout = &ctx.layout;
    if !layout.dir(paths::FASTQC).exists() {
        return None;
    }
    let mut job = Job::aggregate(Stage::FastQc);
    job.inputs = vec![layout.dir(paths::FASTQC)];
    job.dirs = vec![layout.dir(paths::MULTIQC), layout.dir(paths::LOGS)];
    job.exec(Invocation::new(&ctx.tools.multiqc, layout.log(None, "multiqc"))
        .arg(layout.dir(paths::FASTQC))
        .arg("-f")
        .arg("-o").arg(layout.dir(paths::MULTIQC)));
    job.outputs = vec![layout.multiqc_fastqc_table()];
    Some(job)
}

fn assembly_job(ctx: &RunContext, sample: &str) -> Job {
    let layout = &ctx.layout;
    let (_, threads) = Stage::Assemble.concurrency(ctx.config.threads);
    let out_dir = layout.assembly_dir(sample);
    let fasta = layout.fasta(sample);

    let reads = vec![layout.trimmed_read(sample, 1), layout.trimmed_read(sample, 2)];
    let mut job = Job::for_sample(Stage::Assemble, sample);
    job.dirs = vec![layout.dir(paths::ASSEMBLY), layout.dir(paths::FASTA), layout.dir(paths::LOGS)];
    job.exec(Invocation::new(&ctx.tools.unicycler, layout.log(Some(sample), "unicycler"))
        .arg("-1").arg(&reads[0])
        .arg("-2").arg(&reads[1])
        .arg("-o").arg(&out_dir)
        .args(["--verbosity", "2", "--keep", "2"])
        .arg("--depth_filter").arg(ctx.config.depth_filter.to_string())
        .arg("--threads").arg(threads.to_string()));
    job.step(Step::PrefixFiles { dir: out_dir.clone(), prefix: sample.to_owned() })
        .step(Step::Copy { from: out_dir.join(format!("{}_assembly.fasta", sample)), to: fasta.clone() });
    job.inputs = reads;
    job.outputs = vec![fasta.clone()];
    job.byproducts = vec![out_dir, fasta];
    job
}

/// Assemblies of all active samples that exist on disk.
fn active_assemblies(ctx: &RunContext) -> Vec<PathBuf> {
    ctx.active().iter()
        .map(|sample| ctx.layout.fasta(sample))
        .filter(|path| path.exists())
        .collect()
}

fn quast_job(ctx: &RunContext) -> Option<Job> {
    let fastas = active_assemblies(ctx);
    if fastas.is_empty() {
        return None;
    }
    let layout = &ctx.layout;
    let mut job = Job::aggregate(Stage::Quast);
    job.dirs = vec![layout.dir(paths::QUAST), layout.dir(paths::LOGS)];
    job.exec(Invocation::new(&ctx.tools.quast, layout.log(None, &format!("quast_{}", ctx.timestamp)))
        .args(&fastas)
        .arg("-o").arg(layout.dir(paths::QUAST)));
    job.inputs = fastas;
    job.outputs = vec![layout.quast_report()];
    Some(job)
}

fn mlst_job(ctx: &RunContext) -> Option<Job> {
    let fastas = active_assemblies(ctx);
    if fastas.is_empty() {
        return None;
    }
    let layout = &ctx.layout;
    let mut job = Job::aggregate(Stage::Mlst);
    job.dirs = vec![layout.dir(paths::ANALYSES), layout.dir(paths::LOGS)];
    job.exec(Invocation::new(&ctx.tools.mlst, layout.log(None, "mlst"))
        .args(&fastas)
        .stdout(layout.mlst_table()));
    job.inputs = fastas;
    job.outputs = vec![layout.mlst_table()];
    Some(job)
}

fn kleborate_job(ctx: &RunContext) -> Option<Job> {
    let fastas = active_assemblies(ctx);
    if fastas.is_empty() {
        return None;
    }
    let layout = &ctx.layout;
    let out_table = layout.kleborate_table(&ctx.timestamp);
    let mut job = Job::aggregate(Stage::Kleborate);
    job.dirs = vec![layout.dir(paths::ANALYSES), layout.dir(paths::LOGS)];
    job.exec(Invocation::new(&ctx.tools.kleborate, layout.log(None, "kleborate"))
        .arg("--all")
        .arg("-a").args(&fastas)
        .arg("-o").arg(&out_table));
    job.inputs = fastas;
    job.outputs = vec![out_table];
    Some(job)
}

/// Maps trimmed reads back to the assembly, marks duplicates, and summarizes per-base depth.
/// All intermediate files are kept in a sample-specific scratch directory.
fn depth_job(ctx: &RunContext, sample: &str) -> Job {
    let layout = &ctx.layout;
    let tools = &ctx.tools;
    let (_, threads) = Stage::Depth.concurrency(ctx.config.threads);
    let scratch = layout.depth_scratch(sample);
    let log = layout.log(Some(sample), "readDepth");
    let reference = scratch.join("assembly.fasta");
    let sam = scratch.join("input.sam");
    let bam = scratch.join("input.bam");
    let sorted = scratch.join("sorted.bam");
    let dedup = scratch.join("final.bam");
    let depth = scratch.join("depth.txt");
    let out_table = layout.depth_table(sample);
    let reads = [layout.trimmed_read(sample, 1), layout.trimmed_read(sample, 2)];

    let picard = |tool: &str, input: &PathBuf, output: &PathBuf| {
        let mut input_arg = std::ffi::OsString::from("INPUT=");
        input_arg.push(input);
        let mut output_arg = std::ffi::OsString::from("OUTPUT=");
        output_arg.push(output);
        Invocation::new(&tools.picard, log.clone())
            .arg(tool)
            .arg(input_arg)
            .arg(output_arg)
            .arg("VALIDATION_STRINGENCY=SILENT")
    };
    let mut metrics_arg = std::ffi::OsString::from("METRICS_FILE=");
    metrics_arg.push(scratch.join("dup_metrics.txt"));

    let mut job = Job::for_sample(Stage::Depth, sample);
    job.dirs = vec![layout.dir(paths::READ_DEPTH), scratch.clone(), layout.dir(paths::LOGS)];
    job.step(Step::Copy { from: layout.fasta(sample), to: reference.clone() })
        .exec(Invocation::new(&tools.bwa, log.clone()).arg("index").arg(&reference))
        .exec(Invocation::new(&tools.bwa, log.clone())
            .arg("mem").arg("-t").arg(threads.to_string())
            .arg(&reference).args(&reads)
            .stdout(sam.clone()))
        .exec(picard("SamFormatConverter", &sam, &bam))
        .exec(picard("SortSam", &bam, &sorted).arg("SORT_ORDER=coordinate"))
        .exec(picard("MarkDuplicates", &sorted, &dedup).arg(metrics_arg))
        .exec(picard("BuildBamIndex", &dedup, &scratch.join("final.bam.bai")))
        .exec(Invocation::new(&tools.samtools, log.clone())
            .arg("depth").arg("-a").arg(&dedup)
            .stdout(depth.clone()))
        .step(Step::DepthSummary { sample: sample.to_owned(), depth, output: out_table.clone() })
        .step(Step::Remove(scratch.clone()));
    job.inputs = vec![layout.fasta(sample)];
    job.inputs.extend(reads);
    job.outputs = vec![out_table.clone()];
    job.byproducts = vec![out_table, scratch];
    job
}

/// Concatenates per-sample depth tables of all active samples.
fn depth_summary_job(ctx: &RunContext) -> Option<Job> {
    let layout = &ctx.layout;
    let tables: Vec<PathBuf> = ctx.active().iter()
        .map(|sample| layout.depth_table(sample))
        .filter(|path| path.exists())
        .collect();
    if tables.is_empty() {
        return None;
    }
    let mut job = Job::aggregate(Stage::Depth);
    job.step(Step::Concat { inputs: tables.clone(), output: layout.overall_depth_table() });
    job.inputs = tables;
    job.outputs = vec![layout.overall_depth_table()];
    Some(job)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use super::*;
    use crate::pipeline::testing;

    #[test]
    fn concurrency_split() {
        assert_eq!(Stage::Trim.concurrency(4), (4, 1));
        assert_eq!(Stage::Assemble.concurrency(4), (4, 1));
        assert_eq!(Stage::Assemble.concurrency(32), (4, 8));
        assert_eq!(Stage::Depth.concurrency(20), (2, 10));
        assert_eq!(Stage::FastQc.concurrency(0), (1, 1));
    }

    #[test]
    fn per_sample_stages() {
        let per_sample: Vec<_> = Stage::ORDER.into_iter().filter(|s| s.is_per_sample()).collect();
        assert_eq!(per_sample, vec![Stage::Trim, Stage::FastQc, Stage::Assemble, Stage::Depth]);
    }

    #[test]
    fn disjoint_sample_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), &["A", "A_1", "A_assembly", "A_X"]);
        for stage in Stage::ORDER.into_iter().filter(|s| s.is_per_sample()) {
            let mut seen = HashSet::new();
            for sample in ctx.active() {
                let job = stage.sample_job(&ctx, sample).unwrap();
                let own: HashSet<_> = job.outputs.iter().chain(&job.byproducts).cloned().collect();
                for path in own {
                    assert!(seen.insert(path.clone()), "{} is shared between samples", path.display());
                }
            }
        }
    }

    #[test]
    fn assembly_command() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), &["S1"]);
        let job = Stage::Assemble.sample_job(&ctx, "S1").unwrap();
        let inv = job.invocations().next().unwrap();
        let args: Vec<_> = inv.get_args().iter().map(|s| s.to_string_lossy().into_owned()).collect();
        let ix = args.iter().position(|a| a == "--depth_filter").unwrap();
        assert_eq!(args[ix + 1], "0.25");
        assert_eq!(job.outputs, vec![ctx.layout.fasta("S1")]);
        assert!(job.byproducts.contains(&ctx.layout.assembly_dir("S1")));
        assert!(matches!(&job.steps[1], Step::PrefixFiles { prefix, .. } if prefix == "S1"));
        assert!(matches!(&job.steps[2], Step::Copy { from, .. }
            if *from == ctx.layout.assembly_dir("S1").join("S1_assembly.fasta")));
    }

    #[test]
    fn trimming_reports_moved() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), &["A"]);
        let job = Stage::Trim.sample_job(&ctx, "A").unwrap();
        let qc_dir = ctx.layout.dir(paths::TRIMMING_QC);
        assert!(job.dirs.contains(&qc_dir));
        let moved: Vec<_> = job.steps.iter().filter_map(|step| match step {
            Step::MoveInto { file, dir } if *dir == qc_dir => Some(file.clone()),
            _ => None,
        }).collect();
        assert_eq!(moved, vec![ctx.layout.trimming_report("A", 1), ctx.layout.trimming_report("A", 2)]);
        assert!(job.byproducts.contains(&ctx.layout.trimming_qc_report("A", 2)));
    }

    #[test]
    fn aggregate_jobs_need_assemblies() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), &["A", "B"]);
        assert!(Stage::Quast.aggregate_job(&ctx).is_none());
        assert!(Stage::Trim.aggregate_job(&ctx).is_none());

        std::fs::create_dir_all(ctx.layout.dir(paths::FASTA)).unwrap();
        std::fs::write(ctx.layout.fasta("B"), ">c\nACGT\n").unwrap();
        let job = Stage::Mlst.aggregate_job(&ctx).unwrap();
        assert_eq!(job.inputs, vec![ctx.layout.fasta("B")]);
        assert_eq!(job.outputs, vec![ctx.layout.mlst_table()]);
    }
}
