//! Completion markers. Marker presence is the only record of a finished (sample, stage) pair,
//! so the set of pending samples is always re-derived from the storage.

use std::{
    fs,
    path::PathBuf,
};
use crate::{
    Error,
    err::add_path,
    ext,
};
use super::{
    paths::Layout,
    stage::Stage,
};

/// Markers are written from the worker threads, as soon as a sample is finished.
pub trait Markers: Sync {
    /// Is `stage` complete for `sample`? Always false for stages without per-sample markers.
    fn exists(&self, sample: &str, stage: Stage) -> bool;

    fn mark(&self, sample: &str, stage: Stage) -> Result<(), Error>;

    fn clear(&self, sample: &str, stage: Stage) -> Result<(), Error>;

    /// Samples, for which the stage still needs to be run, in the input order.
    fn pending(&self, samples: &[String], stage: Stage) -> Vec<String> {
        samples.iter().filter(|sample| !self.exists(sample, stage)).cloned().collect()
    }
}

/// Markers, stored as files `success/<sample>_<suffix>`.
pub struct FsMarkers {
    layout: Layout,
}

impl FsMarkers {
    pub fn new(layout: &Layout) -> Self {
        Self { layout: layout.clone() }
    }

    fn path(&self, sample: &str, stage: Stage) -> Option<PathBuf> {
        stage.marker_suffix().map(|suffix| self.layout.marker(&format!("{}_{}", sample, suffix)))
    }
}

impl Markers for FsMarkers {
    fn exists(&self, sample: &str, stage: Stage) -> bool {
        self.path(sample, stage).map(|path| path.is_file()).unwrap_or(false)
    }

    fn mark(&self, sample: &str, stage: Stage) -> Result<(), Error> {
        let Some(path) = self.path(sample, stage) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            ext::sys::mkdir(parent)?;
        }
        let contents = format!("{}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        fs::write(&path, contents).map_err(add_path!(path))
    }

    fn clear(&self, sample: &str, stage: Stage) -> Result<(), Error> {
        match self.path(sample, stage) {
            Some(path) => ext::sys::remove_any(&path).map(|_| ()).map_err(add_path!(path)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_markers() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let markers = FsMarkers::new(&layout);
        let samples: Vec<String> = ["A", "B", "C"].map(String::from).to_vec();

        assert_eq!(markers.pending(&samples, Stage::Assemble), samples);
        markers.mark("A", Stage::Assemble).unwrap();
        markers.mark("B", Stage::Assemble).unwrap();
        assert!(layout.marker("A_Assembly_complete.txt").is_file());
        assert_eq!(markers.pending(&samples, Stage::Assemble), vec!["C"]);
        // Markers of different stages are independent.
        assert_eq!(markers.pending(&samples, Stage::Depth), samples);

        markers.clear("A", Stage::Assemble).unwrap();
        markers.clear("A", Stage::Assemble).unwrap();
        assert_eq!(markers.pending(&samples, Stage::Assemble), vec!["A", "C"]);

        // Aggregate-only stages are never complete.
        markers.mark("A", Stage::Mlst).unwrap();
        assert!(!markers.exists("A", Stage::Mlst));
    }
}
