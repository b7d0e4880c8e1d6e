//! Rebuild the summary report from the results of previous runs.

use std::{
    fs,
    path::{Path, PathBuf},
};
use colored::Colorize;
use crate::{
    Error,
    err::{validate_param, add_path},
    ext,
    report,
    pipeline::{paths, Layout},
};

struct Args {
    workdir: PathBuf,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
        }
    }
}

impl Args {
    fn validate(self) -> Result<Self, Error> {
        validate_param!(self.workdir.is_dir(), "Working directory {} does not exist", ext::fmt::path(&self.workdir));
        Ok(self)
    }
}

fn print_help() {
    const KEY: usize = 14;
    const VAL: usize = 4;

    let defaults = Args::default();
    println!("{}", "Rebuild the summary report without running any stage.".yellow());

    println!("\n{} {} report [arguments]", "Usage:".bold(), super::PROGRAM);

    println!("\n{}", "Input/output arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Working directory of a previous run [{}].",
        "-w, --workdir".green(), "DIR".yellow(), super::fmt_def(defaults.workdir.display()));

    println!("\n{}", "Other parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Show this help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

fn parse_args(argv: &[String]) -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;
    let mut args = Args::default();
    let mut parser = lexopt::Parser::from_args(argv);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('w') | Long("workdir") | Long("working-dir") => args.workdir = parser.value()?.parse()?,
            Short('V') | Long("version") => {
                super::print_version();
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            _ => Err(arg.unexpected())?,
        }
    }
    Ok(args)
}

/// Loads non-empty lines from the sample list.
fn load_samples(path: &Path) -> Result<Vec<String>, Error> {
    let contents = fs::read_to_string(path).map_err(add_path!(path))?;
    Ok(contents.lines().map(str::trim).filter(|line| !line.is_empty()).map(String::from).collect())
}

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = parse_args(argv)?.validate()?;
    super::greet();
    let layout = Layout::new(&args.workdir);
    let samples = load_samples(&layout.dir(paths::SUCCESSFUL))?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    report::write_report(&layout, &samples, |_| true, &timestamp)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_list() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(paths::SUCCESSFUL);
        fs::write(&path, "A\n\nB \n").unwrap();
        assert_eq!(load_samples(&path).unwrap(), vec!["A", "B"]);
        assert!(matches!(load_samples(&tmp.path().join("absent.txt")), Err(Error::Io(..))));
    }
}
