//! Run the whole pipeline in the working directory.

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Instant,
};
use colored::Colorize;
use const_format::str_repeat;
use crate::{
    Error,
    err::{validate_param, add_path},
    ext,
    report,
    pipeline::{
        paths, discovery, driver,
        Config, Layout, RunContext, Tools,
        exec::ProcessExecutor,
        marker::FsMarkers,
    },
};

struct Args {
    workdir: PathBuf,
    config: Config,
    tools: Tools,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            config: Config::default(),
            tools: Tools::default(),
        }
    }
}

impl Args {
    /// Checks parameter values.
    fn check(&self) -> Result<(), Error> {
        validate_param!(self.config.threads >= 1, "Number of threads must be positive");
        validate_param!(0.0 < self.config.depth_filter && self.config.depth_filter <= 1.0,
            "Depth filter ({}) must be within (0, 1]", self.config.depth_filter);
        validate_param!(self.workdir.is_dir(), "Working directory {} does not exist", ext::fmt::path(&self.workdir));
        Ok(())
    }

    /// Validate arguments and find executables for all enabled stages.
    fn validate(mut self) -> Result<Self, Error> {
        self.check()?;
        self.tools.resolve(&self.config)?;
        Ok(self)
    }
}

fn print_help(extended: bool) {
    const KEY: usize = 18;
    const VAL: usize = 5;
    const EMPTY: &'static str = str_repeat!(" ", KEY + VAL + 5);

    let defaults = Args::default();
    println!("{}", "Trim, assemble and type paired-end reads.".yellow());

    println!("\n{} {} run [arguments]", "Usage:".bold(), super::PROGRAM);
    if !extended {
        println!("\nThis is a {} help message. Please use {} to see the full help.",
            "short".red(), "-H/--full-help".green());
    }

    println!("\n{}", "Input/output arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Working directory with paired reads {} and {} [{}].\n\
        {EMPTY}  Illumina names ({}) are renamed automatically.",
        "-w, --workdir".green(), "DIR".yellow(), "<name>_1.fastq.gz".cyan(), "<name>_2.fastq.gz".cyan(),
        super::fmt_def(defaults.workdir.display()), "<name>_L001_R1_001.fastq.gz".cyan());

    println!("\n{}", "Assembly parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Unicycler depth filter: remove contigs with lower depth,\n\
        {EMPTY}  relative to the chromosomal depth [{}].",
        "-d, --depth-filter".green(), "FLOAT".yellow(), super::fmt_def_f64(defaults.config.depth_filter));

    println!("\n{}", "Optional stages:".bold());
    println!("    {:KEY$} {:VAL$}  Only trim and assemble reads.", "    --noex".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Do not run FastQC and MultiQC.", "    --nofqc".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Do not run species and sequence type identification.",
        "    --nomlst".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Do not run Quast.", "    --noquast".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Do not calculate read depth.", "    --nocov".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Run Kleborate on all assemblies.", "    --klebs".green(), super::flag());

    println!("\n{}", "Execution parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Number of threads [{}].",
        "-t, --threads".green(), "INT".yellow(), super::fmt_def(defaults.config.threads));
    if extended {
        let tools = &defaults.tools;
        for (key, exe) in [
            ("    --trim-galore", &tools.trim_galore),
            ("    --fastqc", &tools.fastqc),
            ("    --multiqc", &tools.multiqc),
            ("    --unicycler", &tools.unicycler),
            ("    --quast", &tools.quast),
            ("    --mlst", &tools.mlst),
            ("    --bwa", &tools.bwa),
            ("    --picard", &tools.picard),
            ("    --samtools", &tools.samtools),
            ("    --kleborate", &tools.kleborate),
        ] {
            println!("    {:KEY$} {:VAL$}  Executable [{}].", key.green(), "EXE".yellow(), super::fmt_def(exe.display()));
        }
    }

    println!("\n{}", "Other parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Show short help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show extended help message.", "-H, --full-help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

fn parse_args(argv: &[String]) -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;
    let mut args = Args::default();
    let mut parser = lexopt::Parser::from_args(argv);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('w') | Long("workdir") | Long("working-dir") => args.workdir = parser.value()?.parse()?,
            Short('d') | Long("depth-filter") | Long("depth_filter") =>
                args.config.depth_filter = parser.value()?.parse()?,

            Long("noex") | Long("no-extras") => args.config.no_extras = true,
            Long("nofqc") | Long("no-fastqc") => args.config.no_fastqc = true,
            Long("nomlst") | Long("no-mlst") => args.config.no_mlst = true,
            Long("noquast") | Long("no-quast") => args.config.no_quast = true,
            Long("nocov") | Long("no-depth") => args.config.no_depth = true,
            Long("klebs") | Long("kleborate-all") => args.config.kleborate = true,

            Short('t') | Short('@') | Long("threads") => args.config.threads = parser.value()?.parse()?,
            Long("trim-galore") | Long("trim_galore") => args.tools.trim_galore = parser.value()?.parse()?,
            Long("fastqc") => args.tools.fastqc = parser.value()?.parse()?,
            Long("multiqc") => args.tools.multiqc = parser.value()?.parse()?,
            Long("unicycler") => args.tools.unicycler = parser.value()?.parse()?,
            Long("quast") => args.tools.quast = parser.value()?.parse()?,
            Long("mlst") => args.tools.mlst = parser.value()?.parse()?,
            Long("bwa") => args.tools.bwa = parser.value()?.parse()?,
            Long("picard") => args.tools.picard = parser.value()?.parse()?,
            Long("samtools") => args.tools.samtools = parser.value()?.parse()?,
            Long("kleborate") => args.tools.kleborate = parser.value()?.parse()?,

            Short('V') | Long("version") => {
                super::print_version();
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                print_help(false);
                std::process::exit(0);
            }
            Short('H') | Long("full-help") | Long("hidden-help") => {
                print_help(true);
                std::process::exit(0);
            }
            _ => Err(arg.unexpected())?,
        }
    }
    Ok(args)
}

/// Compares parameters with the ones from the previous run, and saves new parameters.
/// Finished assemblies are not recomputed, therefore a changed depth filter only produces a warning.
/// Returns true if the parameters have changed.
fn update_params(path: &Path, config: &Config) -> Result<bool, Error> {
    let mut changed = false;
    if path.exists() {
        match ext::sys::load_json(path) {
            Ok(old) => {
                let old_filter = old["depth_filter"].as_f64();
                if old_filter != Some(config.depth_filter) {
                    log::warn!("Depth filter has changed ({} -> {}), finished assemblies will not be recomputed",
                        old_filter.map(|v| v.to_string()).unwrap_or_else(|| "?".to_owned()), config.depth_filter);
                    changed = true;
                }
            }
            Err(e) => log::warn!("Cannot load previous parameters: {}", e.display()),
        }
    }

    let json = json::object!{
        depth_filter: config.depth_filter,
        version: env!("CARGO_PKG_VERSION"),
    };
    if let Some(parent) = path.parent() {
        ext::sys::mkdir(parent)?;
    }
    let mut file = ext::sys::create_file(path)?;
    json.write_pretty(&mut file, 4).map_err(add_path!(path))?;
    file.flush().map_err(add_path!(path))?;
    Ok(changed)
}

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = parse_args(argv)?.validate()?;
    super::greet();
    let timer = Instant::now();
    let layout = Layout::new(&args.workdir);
    let mut ctx = RunContext::new(layout, args.config, args.tools);

    discovery::prepare(&mut ctx)?;
    update_params(&ctx.layout.marker(paths::PARAMS), &ctx.config)?;
    let markers = FsMarkers::new(&ctx.layout);
    let manifest = driver::run(&mut ctx, &ProcessExecutor, &markers)?;

    let config = &ctx.config;
    report::write_report(&ctx.layout, &manifest.successful, |stage| config.enabled(stage), &ctx.timestamp)?;
    discovery::stash_raw_reads(&ctx.layout, manifest.successful.iter().chain(&manifest.failed))?;
    log::info!("Success. Total time: {}", ext::fmt::Duration(timer.elapsed()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn parse_flags() {
        let args = parse_args(&argv("-t 16 --depth_filter 0.1 --noquast --klebs --bwa /opt/bwa")).unwrap();
        assert_eq!(args.config.threads, 16);
        assert_eq!(args.config.depth_filter, 0.1);
        assert!(!args.config.enabled(Stage::Quast));
        assert!(args.config.enabled(Stage::Kleborate));
        assert_eq!(args.tools.bwa, PathBuf::from("/opt/bwa"));
        assert_eq!(args.workdir, PathBuf::from("."));
        assert!(parse_args(&argv("--unknown")).is_err());
        assert!(parse_args(&argv("-t many")).is_err());
    }

    #[test]
    fn check_values() {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = tmp.path().to_str().unwrap();
        assert!(parse_args(&argv(&format!("-w {}", workdir))).unwrap().check().is_ok());
        assert!(parse_args(&argv(&format!("-w {} -t 0", workdir))).unwrap().check().is_err());
        assert!(parse_args(&argv(&format!("-w {} -d 1.5", workdir))).unwrap().check().is_err());
        assert!(parse_args(&argv(&format!("-w {}/absent", workdir))).unwrap().check().is_err());
    }

    #[test]
    fn changed_params() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Layout::new(tmp.path()).marker(paths::PARAMS);
        let mut config = Config::default();
        assert!(!update_params(&path, &config).unwrap());
        assert!(!update_params(&path, &config).unwrap());
        config.depth_filter = 0.5;
        assert!(update_params(&path, &config).unwrap());
        assert_eq!(ext::sys::load_json(&path).unwrap()["depth_filter"].as_f64(), Some(0.5));
    }
}
