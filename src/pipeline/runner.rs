//! Runs one stage over all active samples: bounded parallel dispatch, failure isolation and resume.

use std::{
    thread,
    time::Instant,
    sync::{Mutex, mpsc},
};
use crate::{
    Error,
    err::add_path,
    ext,
};
use super::{
    context::RunContext,
    exec::Executor,
    job::Job,
    marker::Markers,
    stage::Stage,
};

/// Applies `f` to all items using at most `limit` worker threads.
/// Results are returned in the order of completion.
pub fn dispatch<T, R, F>(items: Vec<T>, limit: usize, f: F) -> Vec<(T, R)>
where T: Send,
      R: Send,
      F: Fn(&T) -> R + Sync,
{
    let n_workers = limit.max(1).min(items.len());
    let n_items = items.len();
    let queue = Mutex::new(items.into_iter());
    let (sender, receiver) = mpsc::channel();
    thread::scope(|scope| {
        for _ in 0..n_workers {
            let sender = sender.clone();
            let queue = &queue;
            let f = &f;
            scope.spawn(move || loop {
                // Poisoned queue still holds valid items: only `next` was interrupted.
                let Some(item) = queue.lock().unwrap_or_else(|e| e.into_inner()).next() else {
                    break;
                };
                let res = f(&item);
                if sender.send((item, res)).is_err() {
                    break;
                }
            });
        }
        drop(sender);
        let mut results = Vec::with_capacity(n_items);
        results.extend(receiver.iter());
        results
    })
}

/// Number of samples in each category after a stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub dispatched: usize,
    /// Samples, skipped due to existing markers.
    pub skipped: usize,
    pub failed: usize,
}

/// Removes leftovers of a previous (interrupted or failed) attempt and creates output directories.
/// Returns error if some of the job inputs are missing.
fn prepare(job: &Job) -> Result<(), Error> {
    let missing: Vec<_> = job.missing_inputs().cloned().collect();
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!("Missing input files {}", ext::fmt::paths(&missing))));
    }
    cleanup(job)?;
    for dir in job.dirs.iter() {
        ext::sys::mkdir(dir)?;
    }
    Ok(())
}

fn cleanup(job: &Job) -> Result<(), Error> {
    for path in job.byproducts.iter() {
        if ext::sys::remove_any(path).map_err(add_path!(path))? {
            log::debug!("    Removed {}", ext::fmt::path(path));
        }
    }
    Ok(())
}

/// Removes expected outputs of a previous execution.
fn remove_outputs(job: &Job) -> Result<(), Error> {
    for path in job.outputs.iter() {
        ext::sys::remove_any(path).map_err(add_path!(path))?;
    }
    Ok(())
}

/// Executes the job and checks that all expected outputs were created.
fn execute_checked(executor: &dyn Executor, job: &Job) -> Result<(), Error> {
    executor.execute(job)?;
    let missing: Vec<_> = job.missing_outputs().cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::RuntimeError(format!("{} finished, but did not produce {}",
            job.label(), ext::fmt::paths(&missing))))
    }
}

/// Registers the failure of a single sample: removes byproducts and the marker, and excludes the sample
/// from all further stages.
fn fail_sample(ctx: &mut RunContext, markers: &dyn Markers, job: &Job, sample: &str, err: Error) {
    log::error!("[{}] {}", job.label(), err.display());
    if let Err(e) = cleanup(job).and_then(|()| markers.clear(sample, job.stage)) {
        log::warn!("[{}] Could not clean up: {}", job.label(), e.display());
    }
    ctx.fail(sample, job.stage, err.reason());
}

/// Runs the stage for all active samples without a completion marker, followed by the stage-level
/// aggregate job. A failure of one sample never stops other samples;
/// a failure of the aggregate job is only reported.
pub fn run_stage(
    ctx: &mut RunContext,
    stage: Stage,
    executor: &dyn Executor,
    markers: &dyn Markers,
) -> StageSummary {
    let timer = Instant::now();
    let mut summary = StageSummary::default();
    if stage.is_per_sample() {
        let active: Vec<String> = ctx.active().iter().cloned().collect();
        let pending = markers.pending(&active, stage);
        summary.skipped = active.len() - pending.len();
        if summary.skipped > 0 {
            log::info!("    Skipping {} samples with finished {}", summary.skipped, stage);
        }

        let mut jobs = Vec::with_capacity(pending.len());
        for sample in pending.iter() {
            let Some(job) = stage.sample_job(ctx, sample) else { continue };
            match markers.clear(sample, stage).and_then(|()| prepare(&job)) {
                Ok(()) => jobs.push(job),
                Err(e) => {
                    fail_sample(ctx, markers, &job, sample, e);
                    summary.failed += 1;
                }
            }
        }

        summary.dispatched = jobs.len();
        if !jobs.is_empty() {
            let (n_jobs, job_threads) = stage.concurrency(ctx.config.threads);
            log::info!("Running {} for {} samples ({} parallel jobs, {} threads each)",
                stage, jobs.len(), n_jobs, job_threads);
            // Each sample is marked by its worker, so an interrupted batch keeps finished samples.
            let mut results = dispatch(jobs, n_jobs, |job| {
                let res = execute_checked(executor, job);
                match (res, job.sample.as_deref()) {
                    (Ok(()), Some(sample)) => markers.mark(sample, stage),
                    (res, _) => res,
                }
            });
            results.sort_by(|a, b| a.0.sample.cmp(&b.0.sample));
            for (job, res) in results {
                let Some(sample) = job.sample.as_deref() else { continue };
                match res {
                    Ok(()) => log::debug!("    [{}] Success", job.label()),
                    Err(e) => {
                        fail_sample(ctx, markers, &job, sample, e);
                        summary.failed += 1;
                    }
                }
            }
        }
    }

    if let Some(job) = stage.aggregate_job(ctx) {
        log::info!("Running {}", job.label());
        let res = remove_outputs(&job)
            .and_then(|()| prepare(&job))
            .and_then(|()| execute_checked(executor, &job));
        if let Err(e) = res {
            log::warn!("[{}] {}", job.label(), e.display());
            // Partial or outdated tables must not reach the report.
            if let Err(e) = remove_outputs(&job) {
                log::warn!("[{}] Could not clean up: {}", job.label(), e.display());
            }
        }
    } else if !stage.is_per_sample() {
        log::warn!("Skipping {}: no assemblies available", stage);
    }
    log::info!("    Finished {} in {} ({} samples, {} skipped, {} failed)", stage,
        ext::fmt::Duration(timer.elapsed()), summary.dispatched, summary.skipped, summary.failed);
    summary
}
