use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::aggregator::Aggregator;
use super::chunker;
use super::worker::{ScanOutcome, SegmentWorker};
use crate::config::SieveConfig;
use crate::errors::{SegmentReadError, SieveError, SieveResult};
use crate::filters::FilterSet;
use crate::metrics::ScanMetrics;
use crate::results::{Report, WorkerResult};
use crate::source::{FileSource, LogSource};

/// Filters `input` into `output` with default settings.
///
/// `worker_count` of `None` uses one worker per CPU.
pub fn execute(
    input: &Path,
    output: &Path,
    filters: &FilterSet,
    worker_count: Option<usize>,
) -> SieveResult<Report> {
    let config = SieveConfig {
        worker_count,
        ..SieveConfig::default()
    };
    execute_with_config(&config, input, output, filters)
}

/// Filters `input` into `output` using explicit engine settings
pub fn execute_with_config(
    config: &SieveConfig,
    input: &Path,
    output: &Path,
    filters: &FilterSet,
) -> SieveResult<Report> {
    config.validate()?;

    let source = FileSource::open(input)?;
    if same_file(input, output) {
        return Err(SieveError::invalid_configuration(format!(
            "output path {} is the input file",
            output.display()
        )));
    }

    execute_with_source(config, &source, output, filters)
}

/// Runs the full pipeline over any log source.
///
/// Plans line-aligned segments, scans them on a fixed-size pool, and hands
/// the results to the aggregator. The first worker failure cancels the rest
/// of the run and is returned as `RunFailed`; no output is written then.
pub fn execute_with_source<S: LogSource + ?Sized>(
    config: &SieveConfig,
    source: &S,
    output: &Path,
    filters: &FilterSet,
) -> SieveResult<Report> {
    let started = Instant::now();
    config.validate()?;
    let requested = config.resolve_worker_count()?;

    info!(
        "Filtering {} ({} bytes) with {} filter(s)",
        source.path().display(),
        source.len(),
        filters.len()
    );

    let view = source
        .view()
        .map_err(|e| SieveError::file_access(source.path(), e))?;
    let segments = chunker::plan(&view, requested)?;
    let (bases, total_lines) = chunker::line_bases(&view, &segments);
    drop(view);

    debug!(
        "Dispatching {} segment(s) covering {} lines",
        segments.len(),
        total_lines
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(segments.len())
        .thread_name(|i| format!("logsieve-worker-{}", i))
        .build()
        .map_err(|e| {
            SieveError::invalid_configuration(format!("cannot start worker pool: {}", e))
        })?;

    let metrics = ScanMetrics::new();
    let progress = progress_bar(config, source.len());
    let mut worker = SegmentWorker::new(filters, config).with_metrics(metrics.clone());
    if let Some(bar) = &progress {
        worker = worker.with_progress(bar.clone());
    }

    let cancel = AtomicBool::new(false);
    let first_failure: OnceCell<SegmentReadError> = OnceCell::new();

    let outcomes: Vec<Option<WorkerResult>> = pool.install(|| {
        segments
            .par_iter()
            .zip(bases.par_iter())
            .map(|(segment, &base)| {
                // Nothing new starts once a failure has been seen
                if cancel.load(Ordering::Relaxed) {
                    metrics.record_abandoned();
                    return None;
                }
                match worker.run(segment, base, source, &cancel) {
                    Ok(ScanOutcome::Completed(result)) => Some(result),
                    Ok(ScanOutcome::Abandoned { .. }) => None,
                    Err(e) => {
                        warn!("Worker failed: {}", e);
                        metrics.record_failed();
                        let _ = first_failure.set(e);
                        cancel.store(true, Ordering::Relaxed);
                        None
                    }
                }
            })
            .collect()
    });

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    metrics.log_stats();

    if let Some(failure) = first_failure.into_inner() {
        warn!(
            "Run failed in segment {}; no output written",
            failure.ordinal
        );
        return Err(SieveError::run_failed(failure));
    }

    let results: Vec<WorkerResult> = outcomes.into_iter().flatten().collect();
    debug_assert_eq!(
        results.iter().map(|r| r.lines_scanned).sum::<u64>(),
        total_lines
    );

    let report = Aggregator::new(filters, output, segments.len())
        .with_totals(total_lines, source.len())
        .started_at(started)
        .merge(results)?;

    info!(
        "Filtering complete: {} of {} lines matched in {:.3}s",
        report.matched_lines,
        report.total_lines,
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

fn progress_bar(config: &SieveConfig, total_bytes: u64) -> Option<ProgressBar> {
    if !config.show_progress {
        return None;
    }
    let bar = ProgressBar::new(total_bytes);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec})")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    Some(bar)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
