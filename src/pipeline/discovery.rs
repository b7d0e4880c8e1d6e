//! Discovery of raw read pairs in the working directory.

use std::{
    fs,
    collections::BTreeSet,
    path::Path,
};
use regex::Regex;
use lazy_static::lazy_static;
use crate::{
    Error,
    err::add_path,
    ext,
};
use super::{
    context::RunContext,
    paths::{self, Layout},
};

lazy_static! {
    /// Illumina file names: `<sample>_L001_R1_001.fastq.gz` or `<sample>_R1_001.fastq.gz`.
    static ref ILLUMINA_NAME: Regex = Regex::new(r"^(.+?)(?:_L001)?_R([12])_001\.fastq\.gz$").unwrap();
}

/// Canonical name `<sample>_{1,2}.fastq.gz` for an Illumina file name, if it is not canonical yet.
pub fn canonical_name(file_name: &str) -> Option<String> {
    ILLUMINA_NAME.captures(file_name).map(|caps| format!("{}_{}.fastq.gz", &caps[1], &caps[2]))
}

/// Sample name and mate number from a canonical raw read file name.
pub fn sample_name(file_name: &str) -> Option<(&str, u8)> {
    for (i, suffix) in paths::RAW_SUFFIXES.iter().enumerate() {
        if let Some(name) = file_name.strip_suffix(suffix) {
            if !name.is_empty() {
                return Some((name, i as u8 + 1));
            }
        }
    }
    None
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Renames Illumina read files into canonical names. Existing files are never overwritten.
/// Returns the number of renamed files.
pub fn normalize_names(dir: &Path) -> Result<usize, Error> {
    let mut renamed = 0;
    for path in ext::sys::glob_in(dir, "*.fastq.gz")? {
        let Some(new_name) = file_name(&path).and_then(canonical_name) else { continue };
        let new_path = dir.join(&new_name);
        if new_path.exists() {
            return Err(Error::InvalidInput(format!("Cannot rename {} into {}: file already exists",
                ext::fmt::path(&path), ext::fmt::path(&new_path))));
        }
        log::debug!("    Renaming {} -> {}", ext::fmt::path(&path), new_name);
        fs::rename(&path, &new_path).map_err(add_path!(path, new_path))?;
        renamed += 1;
    }
    Ok(renamed)
}

/// Moves raw reads, stashed during previous runs, back into the working directory.
pub fn gather_raw_reads(layout: &Layout) -> Result<usize, Error> {
    let stash = layout.dir(paths::FASTQ_RAW);
    if !stash.is_dir() {
        return Ok(0);
    }
    let mut moved = 0;
    for path in ext::sys::glob_in(&stash, "*fastq.gz")? {
        let target = layout.root().join(path.file_name().unwrap_or_default());
        if target.exists() {
            log::warn!("Both {} and {} exist, keeping the second one",
                ext::fmt::path(&path), ext::fmt::path(&target));
            continue;
        }
        ext::sys::move_into(&path, layout.root())?;
        moved += 1;
    }
    Ok(moved)
}

/// Moves raw reads of the samples into `Fastq_raw`.
pub fn stash_raw_reads(layout: &Layout, samples: impl IntoIterator<Item = impl AsRef<str>>) -> Result<(), Error> {
    let stash = layout.dir(paths::FASTQ_RAW);
    ext::sys::mkdir(&stash)?;
    for sample in samples {
        for mate in [1, 2] {
            let path = layout.raw_read(sample.as_ref(), mate);
            if path.exists() {
                ext::sys::move_into(&path, &stash)?;
            }
        }
    }
    Ok(())
}

/// Finds all samples with at least one canonical raw read file in the directory.
pub fn discover(dir: &Path) -> Result<BTreeSet<String>, Error> {
    let files = ext::sys::glob_in(dir, "*.fastq.gz")?;
    if files.is_empty() {
        return Err(Error::InvalidInput(format!("No *.fastq.gz files found in {}. \
            If reads are stored in a separate directory for each sample, please move them into the working directory",
            ext::fmt::path(dir))));
    }
    let mut samples = BTreeSet::new();
    for path in files.iter() {
        match file_name(path).and_then(sample_name) {
            Some((name, _)) => {
                samples.insert(name.to_owned());
            }
            None => log::warn!("Cannot detect sample name for {}, ignoring it", ext::fmt::path(path)),
        }
    }
    Ok(samples)
}

/// Samples with both mates and samples with a missing mate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pairing {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

pub fn validate_pairs(layout: &Layout, samples: impl IntoIterator<Item = String>) -> Pairing {
    let mut pairing = Pairing::default();
    for sample in samples {
        if layout.raw_read(&sample, 1).is_file() && layout.raw_read(&sample, 2).is_file() {
            pairing.valid.push(sample);
        } else {
            pairing.invalid.push(sample);
        }
    }
    pairing
}

/// Prepares input reads and sets the active samples.
/// If any sample has a missing mate, nothing else is done and `Error::Unpaired` is returned.
pub fn prepare(ctx: &mut RunContext) -> Result<(), Error> {
    let layout = &ctx.layout;
    let gathered = gather_raw_reads(layout)?;
    if gathered > 0 {
        log::info!("Restored {} raw read files from {}", gathered, paths::FASTQ_RAW);
    }
    let renamed = normalize_names(layout.root())?;
    if renamed > 0 {
        log::info!("Renamed {} read files", renamed);
    }

    let pairing = validate_pairs(layout, discover(layout.root())?);
    if !pairing.invalid.is_empty() {
        return Err(Error::Unpaired(pairing.invalid));
    }
    log::info!("All {} samples have paired reads", pairing.valid.len());
    ext::sys::write_lines(&layout.dir(paths::SEQUENCE_LIST), &pairing.valid)?;
    ctx.set_samples(pairing.valid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "").unwrap();
        }
    }

    #[test]
    fn illumina_names() {
        assert_eq!(canonical_name("S1_L001_R1_001.fastq.gz").unwrap(), "S1_1.fastq.gz");
        assert_eq!(canonical_name("S1_R2_001.fastq.gz").unwrap(), "S1_2.fastq.gz");
        assert_eq!(canonical_name("KP_01_S3_L001_R2_001.fastq.gz").unwrap(), "KP_01_S3_2.fastq.gz");
        assert_eq!(canonical_name("S1_1.fastq.gz"), None);
        assert_eq!(sample_name("S1_2.fastq.gz"), Some(("S1", 2)));
        assert_eq!(sample_name("S_1_1.fastq.gz"), Some(("S_1", 1)));
        assert_eq!(sample_name("_1.fastq.gz"), None);
        assert_eq!(sample_name("S1.fastq.gz"), None);
    }

    #[test]
    fn normalize_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        touch(dir, &["A_L001_R1_001.fastq.gz", "A_L001_R2_001.fastq.gz", "B_R1_001.fastq.gz", "C_1.fastq.gz"]);
        assert_eq!(normalize_names(dir).unwrap(), 3);
        assert_eq!(normalize_names(dir).unwrap(), 0);
        for name in ["A_1.fastq.gz", "A_2.fastq.gz", "B_1.fastq.gz", "C_1.fastq.gz"] {
            assert!(dir.join(name).is_file());
        }

        touch(dir, &["C_R1_001.fastq.gz"]);
        assert!(normalize_names(dir).is_err());
        assert!(dir.join("C_R1_001.fastq.gz").is_file());
    }

    #[test]
    fn paired_samples() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &[]);
        touch(tmp.path(), &["A_1.fastq.gz", "A_2.fastq.gz", "B_R1_001.fastq.gz", "B_R2_001.fastq.gz", "notes.txt"]);
        prepare(&mut ctx).unwrap();
        assert_eq!(ctx.active().iter().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(fs::read_to_string(ctx.layout.dir(paths::SEQUENCE_LIST)).unwrap(), "A\nB\n");
    }

    #[test]
    fn unpaired_sample_halts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &[]);
        touch(tmp.path(), &["A_1.fastq.gz", "A_2.fastq.gz", "B_1.fastq.gz"]);
        match prepare(&mut ctx) {
            Err(Error::Unpaired(samples)) => assert_eq!(samples, vec!["B"]),
            other => panic!("Unexpected result {:?}", other),
        }
        assert!(ctx.active().is_empty());
        assert!(!ctx.layout.dir(paths::TRIMMED).exists());
        assert!(!ctx.layout.dir(paths::SEQUENCE_LIST).exists());
    }

    #[test]
    fn no_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &[]);
        assert!(matches!(prepare(&mut ctx), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn stash_and_gather() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        touch(tmp.path(), &["A_1.fastq.gz", "A_2.fastq.gz"]);
        stash_raw_reads(&layout, ["A"]).unwrap();
        assert!(!layout.raw_read("A", 1).exists());
        assert!(layout.dir(paths::FASTQ_RAW).join("A_2.fastq.gz").is_file());

        assert_eq!(gather_raw_reads(&layout).unwrap(), 2);
        assert!(layout.raw_read("A", 1).is_file() && layout.raw_read("A", 2).is_file());
        assert_eq!(gather_raw_reads(&layout).unwrap(), 0);
    }
}
