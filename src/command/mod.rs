mod run;
mod report;

use colored::Colorize;
use crate::Error;

const PROGRAM: &'static str = env!("CARGO_PKG_NAME");

/// Print tool version and authors.
fn print_version() {
    println!("{} {}", PROGRAM.underline(), format!("v{}", env!("CARGO_PKG_VERSION")).green());
    let authors: Vec<_> = env!("CARGO_PKG_AUTHORS").split(':').collect();
    let n = authors.len();
    if n == 0 {
        return;
    }
    print!("Created by ");
    for (i, author) in authors.iter().enumerate() {
        if i == 0 {
            print!("{}", author.bright_blue());
        } else if i < n - 1 {
            print!(", {}", author.bright_blue());
        } else {
            print!(" and {}", author.bright_blue());
        }
    }
    println!();
}

fn print_help() {
    print_version();
    println!("\n{} {} command [arguments]", "Usage:".bold(), PROGRAM);

    println!("\n{}", "[ Assembly ]".bold());
    println!("    {:<7}  Trim, assemble and type paired-end reads in the working directory.", "run".red());
    println!("    {:<7}  Rebuild the summary report from existing results.", "report".red());

    println!("\n{}", "[ General help ]".bold());
    println!("    {:<7}  Show this help message.", "help".red());
    println!("    {:<7}  Show version.", "version".red());
}

/// Logs the version and the command line.
fn greet() {
    log::info!("{} v{}", PROGRAM.underline(), env!("CARGO_PKG_VERSION"));
    log::debug!("{}", std::env::args().collect::<Vec<_>>().join(" "));
}

/// Placeholder in the help message, used for flags without values.
fn flag() -> colored::ColoredString {
    "    ".normal()
}

/// Formats the default value for the help message.
fn fmt_def(val: impl std::fmt::Display) -> colored::ColoredString {
    val.to_string().cyan()
}

fn fmt_def_f64(val: f64) -> colored::ColoredString {
    format!("{:.2}", val).cyan()
}

pub fn run(argv: &[String]) -> Result<(), Error> {
    if argv.len() <= 1 {
        print_help();
        std::process::exit(1);
    }
    match &argv[1] as &str {
        "run" => run::run(&argv[2..])?,
        "report" => report::run(&argv[2..])?,
        "help" | "h" | "--help" | "-h" => print_help(),
        "version" | "--version" | "-V" => print_version(),
        cmd => {
            print_help();
            return Err(Error::InvalidInput(format!("Unknown command {}", cmd)));
        }
    }
    Ok(())
}
