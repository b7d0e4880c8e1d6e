use std::{
    io,
    fmt::Write,
    path::PathBuf,
};
use colored::Colorize;
use crate::ext;

/// General enum, representing possible errors.
#[derive(Debug)]
pub enum Error {
    Io(io::Error, Vec<PathBuf>),
    /// Error, produced by an argument parser.
    Lexopt(lexopt::Error),
    /// Executable not found.
    NoExec(PathBuf),
    /// Subprocess exited with a non-zero status or could not be started.
    Subprocess(String),
    /// Some samples have only one of the two mates.
    Unpaired(Vec<String>),
    InvalidInput(String),
    InvalidData(String),
    ParsingError(String),
    RuntimeError(String),
    JsonLoad(String),
    Csv(String),
}

impl From<lexopt::Error> for Error {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

impl From<json::JsonError> for Error {
    fn from(e: json::JsonError) -> Self {
        Self::JsonLoad(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

impl Error {
    /// Format error message.
    pub fn display(&self) -> String {
        let mut s = String::new();
        match self {
            Self::Io(e, files) => {
                write!(s, "{} in relation to ", "Input/Output error".red()).unwrap();
                if files.is_empty() {
                    write!(s, "unnamed streams").unwrap();
                } else {
                    write!(s, "{}", files.iter().map(|f| ext::fmt::path(f).cyan().to_string())
                        .collect::<Vec<_>>().join(", ")).unwrap();
                }
                write!(s, ": {}", e.kind()).unwrap();
                if let Some(e2) = e.get_ref() {
                    write!(s, ", {}", e2).unwrap();
                }
            }
            Self::Lexopt(e) => write!(s, "{} to parse command-line arguments: {}", "Failed".red(), e).unwrap(),
            Self::NoExec(path) => write!(s, "{} at {}", "Could not find executable".red(),
                ext::fmt::path(path).cyan()).unwrap(),
            Self::Subprocess(e) => write!(s, "{}: {}", "Subprocess error".red(), e).unwrap(),
            Self::Unpaired(samples) => write!(s, "{}: {}. Pipeline stopped, please fix sequence pairs",
                "Not all sequence sets have pairs".red(), samples.join(", ")).unwrap(),
            Self::InvalidInput(e) => write!(s, "{}: {}", "Invalid input".red(), e).unwrap(),
            Self::InvalidData(e) => write!(s, "{}: {}", "Invalid data".red(), e).unwrap(),
            Self::ParsingError(e) => write!(s, "{}: {}", "Parsing error".red(), e).unwrap(),
            Self::RuntimeError(e) => write!(s, "{}: {}", "Runtime error".red(), e).unwrap(),
            Self::JsonLoad(e) => write!(s, "{}: {}", "Could not load JSON".red(), e).unwrap(),
            Self::Csv(e) => write!(s, "{}: {}", "Could not process table".red(), e).unwrap(),
        };
        s
    }

    /// Short, uncoloured, single-line description. Stored next to failed samples.
    pub fn reason(&self) -> String {
        let s = match self {
            Self::Io(e, files) if files.is_empty() => format!("I/O error: {}", e),
            Self::Io(e, files) => format!("I/O error ({}): {}", ext::fmt::paths(files), e),
            Self::Lexopt(e) => e.to_string(),
            Self::NoExec(path) => format!("executable {} not found", ext::fmt::path(path)),
            Self::Unpaired(samples) => format!("unpaired samples {}", samples.join(",")),
            Self::Subprocess(e) | Self::InvalidInput(e) | Self::InvalidData(e) | Self::ParsingError(e)
                | Self::RuntimeError(e) | Self::JsonLoad(e) | Self::Csv(e) => e.clone(),
        };
        s.replace(|c: char| c == '\t' || c == '\n', " ")
    }
}

macro_rules! validate_param {
    ($cond:expr, $($arg:expr),+) => {{
        if !($cond) {
            (
                Err($crate::Error::InvalidInput(format!($($arg),+)))
            ?)
        }
    }};
}
pub(crate) use validate_param;

macro_rules! add_path {
    (!) => {
        |e| $crate::Error::Io(e, Vec::new())
    };
    ($path:expr) => {
        |e| $crate::Error::Io(e, vec![std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned()])
    };
    ($($path:expr),+) => {
        |e| {
            let mut v = Vec::new();
            $(
                v.push(std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned());
            )*
            $crate::Error::Io(e, v)
        }
    };
}
pub(crate) use add_path;

macro_rules! error {
    ($var:ident, $($arg:expr),+ $(,)?) => {
        $crate::Error::$var(format!($($arg),+))
    }
}
pub(crate) use error;

/// Wrapper around the standard result.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_is_single_line() {
        let e = Error::Subprocess("trim_galore failed\n\twith status 2".to_owned());
        assert_eq!(e.reason(), "trim_galore failed  with status 2");
        let e = Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone"), vec![PathBuf::from("a b.txt")]);
        assert_eq!(e.reason(), "I/O error ('a b.txt'): gone");
    }
}
