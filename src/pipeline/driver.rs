//! Runs all enabled stages in a fixed order.

use std::time::Instant;
use crate::{
    Error,
    ext,
    report,
};
use super::{
    context::{Manifest, RunContext},
    exec::Executor,
    marker::Markers,
    runner,
    stage::Stage,
};

/// Runs all enabled stages over the active samples and writes the manifests.
/// Samples, failed at any stage, are not processed in the following stages.
pub fn run(ctx: &mut RunContext, executor: &dyn Executor, markers: &dyn Markers) -> Result<Manifest, Error> {
    let timer = Instant::now();
    for stage in Stage::ORDER {
        if !ctx.config.enabled(stage) {
            log::debug!("Skipping {}: disabled", stage);
            continue;
        }
        if ctx.active().is_empty() {
            log::warn!("No samples left, stopping before {}", stage);
            break;
        }
        runner::run_stage(ctx, stage, executor, markers);
        if stage == Stage::Quast {
            if let Err(e) = report::review_assemblies(&ctx.layout.quast_report()) {
                log::warn!("Could not review assemblies: {}", e.display());
            }
        }
    }

    let manifest = ctx.write_manifest()?;
    log::info!("Pipeline finished in {}: {} successful, {} failed samples",
        ext::fmt::Duration(timer.elapsed()), manifest.successful.len(), manifest.failed.len());
    if !manifest.failed.is_empty() {
        log::warn!("Failed samples: {}", manifest.failed.join(", "));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use super::*;
    use crate::pipeline::{
        paths,
        testing::{self, FakeExecutor, Fault, MemMarkers},
    };

    #[test]
    fn all_samples_succeed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &["A", "B", "C"]);
        testing::touch_raw_reads(&ctx);
        let executor = FakeExecutor::new();
        let markers = MemMarkers::default();

        let manifest = run(&mut ctx, &executor, &markers).unwrap();
        assert_eq!(manifest.successful, vec!["A", "B", "C"]);
        assert!(manifest.failed.is_empty());
        for stage in Stage::ORDER.into_iter().filter(|s| s.is_per_sample()) {
            assert!(manifest.successful.iter().all(|s| markers.exists(s, stage)), "Missing {} markers", stage);
        }
        assert_eq!(fs::read_to_string(ctx.layout.dir(paths::SUCCESSFUL)).unwrap(), "A\nB\nC\n");
        assert_eq!(fs::read_to_string(ctx.layout.dir(paths::FAILED)).unwrap(), "");
        // Kleborate is disabled by default.
        assert!(executor.calls().iter().all(|(stage, _)| *stage != Stage::Kleborate));
        assert!(executor.calls().contains(&(Stage::Quast, None)));
    }

    #[test]
    fn pure_resume() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &["A", "B"]);
        testing::touch_raw_reads(&ctx);
        let markers = MemMarkers::default();
        run(&mut ctx, &FakeExecutor::new(), &markers).unwrap();

        ctx.set_samples(["A", "B"].map(String::from));
        let executor = FakeExecutor::new();
        let manifest = run(&mut ctx, &executor, &markers).unwrap();
        assert_eq!(manifest.successful, vec!["A", "B"]);
        // Only stage-level summaries are recomputed.
        assert!(executor.calls().iter().all(|(_, sample)| sample.is_none()));
    }

    #[test]
    fn failed_sample_stays_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &["A", "B", "C"]);
        testing::touch_raw_reads(&ctx);
        let executor = FakeExecutor::new().fail_on(Stage::FastQc, Some("A"), Fault::Exit);
        let markers = MemMarkers::default();

        let manifest = run(&mut ctx, &executor, &markers).unwrap();
        assert_eq!(manifest.failed, vec!["A"]);
        assert_eq!(manifest.successful, vec!["B", "C"]);
        for stage in [Stage::Assemble, Stage::Depth] {
            assert_eq!(executor.dispatched(stage), vec!["B", "C"]);
        }
        assert!(!markers.exists("A", Stage::Assemble));
    }

    #[test]
    fn depth_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &["A", "B"]);
        testing::touch_raw_reads(&ctx);
        let executor = FakeExecutor::new().fail_on(Stage::Depth, Some("A"), Fault::Exit);
        let markers = MemMarkers::default();

        let manifest = run(&mut ctx, &executor, &markers).unwrap();
        assert_eq!(manifest.successful, vec!["B"]);
        assert_eq!(manifest.failed, vec!["A"]);
        // Assembly of A is kept.
        assert!(markers.exists("A", Stage::Assemble));
        assert!(ctx.layout.fasta("A").exists());
        assert!(!ctx.layout.depth_table("A").exists());
        assert!(ctx.layout.overall_depth_table().exists());

        let reasons = fs::read_to_string(ctx.layout.dir(paths::FAILURE_REASONS)).unwrap();
        let lines: Vec<_> = reasons.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("A\tread depth calculation\t"));
    }

    #[test]
    fn only_trim_and_assemble() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &["A"]);
        ctx.config.no_extras = true;
        ctx.config.kleborate = true;
        testing::touch_raw_reads(&ctx);
        let executor = FakeExecutor::new();

        run(&mut ctx, &executor, &MemMarkers::default()).unwrap();
        assert_eq!(executor.calls(), vec![(Stage::Trim, Some("A".to_owned())), (Stage::Assemble, Some("A".to_owned()))]);
    }

    #[test]
    fn all_samples_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(tmp.path(), &["A"]);
        testing::touch_raw_reads(&ctx);
        let executor = FakeExecutor::new().fail_on(Stage::Trim, Some("A"), Fault::Exit);

        let manifest = run(&mut ctx, &executor, &MemMarkers::default()).unwrap();
        assert!(manifest.successful.is_empty());
        assert_eq!(executor.calls().len(), 1);
    }
}
