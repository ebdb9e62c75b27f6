use anyhow::Result;
use logsieve::engine::chunker::{self, Segment};
use logsieve::engine::{ScanOutcome, SegmentWorker};
use logsieve::source::SourceBytes;
use logsieve::{
    execute, execute_with_source, Filter, FilterSet, LogSource, MemorySource, Report,
    SieveConfig, SieveError,
};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tempfile::tempdir;

const LEVELS: [&str; 5] = ["INFO", "WARN", "ERROR", "DEBUG", "TRACE"];

fn create_log(lines: usize) -> String {
    let mut log = String::new();
    for i in 0..lines {
        let level = LEVELS[(i * 7 + i / 3) % LEVELS.len()];
        log.push_str(&format!(
            "2024-03-01T12:00:{:02} {} request {} took {}ms{}\n",
            i % 60,
            level,
            i,
            (i * 13) % 500,
            if i % 11 == 0 { " timeout" } else { "" }
        ));
    }
    log
}

fn write_log(dir: &Path, name: &str, contents: &str) -> Result<std::path::PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

fn same_counts(a: &Report, b: &Report) {
    assert_eq!(a.total_lines, b.total_lines);
    assert_eq!(a.matched_lines, b.matched_lines);
    assert_eq!(a.filter_counts, b.filter_counts);
    assert_eq!(a.bytes_scanned, b.bytes_scanned);
}

#[test]
fn test_every_line_is_scanned_exactly_once() -> Result<()> {
    let log = create_log(997);
    let data = log.as_bytes();
    let source = MemorySource::new(data);
    // Every line contains "request"
    let filters = FilterSet::from_keywords(["request"])?;
    let config = SieveConfig::default();

    for workers in 1..=12 {
        let segments = chunker::plan(data, workers)?;
        let (bases, total) = chunker::line_bases(data, &segments);
        assert_eq!(total, 997);

        let worker = SegmentWorker::new(&filters, &config);
        let mut indices = Vec::new();
        for (segment, base) in segments.iter().zip(bases) {
            match worker.run(segment, base, &source, &AtomicBool::new(false))? {
                ScanOutcome::Completed(result) => {
                    indices.extend(result.lines.iter().map(|l| l.index))
                }
                ScanOutcome::Abandoned { .. } => panic!("unexpected cancellation"),
            }
        }
        let expected: Vec<u64> = (0..997).collect();
        assert_eq!(indices, expected, "coverage broken with {} workers", workers);
    }
    Ok(())
}

#[test]
fn test_output_independent_of_worker_count() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "app.log", &create_log(2_000))?;
    let filters = FilterSet::new(vec![
        Filter::new("errors", "ERROR", true)?,
        Filter::new("timeouts", "TIMEOUT", false)?,
    ])?;

    let baseline_path = dir.path().join("baseline.log");
    let baseline = execute(&input, &baseline_path, &filters, Some(1))?;
    let expected = fs::read(&baseline_path)?;

    for workers in [2, 3, 4, 7, 16] {
        let output = dir.path().join(format!("out_{}.log", workers));
        let report = execute(&input, &output, &filters, Some(workers))?;
        assert_eq!(fs::read(&output)?, expected, "{} workers", workers);
        same_counts(&report, &baseline);
        assert_eq!(report.workers, workers, "input large enough for every worker");
    }
    Ok(())
}

#[test]
fn test_counts_match_single_filter_runs() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "app.log", &create_log(1_500))?;
    let combined = FilterSet::from_keywords(["WARN", "ERROR", "timeout", "request 1"])?;

    let report = execute(&input, &dir.path().join("all.log"), &combined, Some(6))?;

    for filter in combined.iter() {
        let alone = FilterSet::new(vec![filter.clone()])?;
        let output = dir.path().join(format!("{}.log", filter.name().replace(' ', "_")));
        let single = execute(&input, &output, &alone, Some(1))?;
        assert_eq!(
            report.count_for(filter.name()),
            single.count_for(filter.name()),
            "filter {}",
            filter.name()
        );
        assert_eq!(single.count_for(filter.name()), Some(single.matched_lines));
    }
    Ok(())
}

#[test]
fn test_repeated_runs_are_identical() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "app.log", &create_log(800))?;
    let filters = FilterSet::from_keywords(["ERROR", "DEBUG"])?;
    let output = dir.path().join("out.log");

    let first = execute(&input, &output, &filters, Some(4))?;
    let first_bytes = fs::read(&output)?;
    let second = execute(&input, &output, &filters, Some(4))?;
    let second_bytes = fs::read(&output)?;

    assert_eq!(first_bytes, second_bytes);
    same_counts(&first, &second);
    assert_eq!(first.workers, second.workers);
    Ok(())
}

/// Source whose reader for one segment fails halfway through
struct FaultySource {
    inner: MemorySource,
    failing_ordinal: usize,
}

struct FailingReader<'a> {
    inner: Box<dyn Read + Send + 'a>,
    remaining: u64,
}

impl Read for FailingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other("injected read fault"));
        }
        let limit = buf.len().min(self.remaining as usize);
        let n = self.inner.read(&mut buf[..limit])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl LogSource for FaultySource {
    fn path(&self) -> &Path {
        Path::new("faulty.log")
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn view(&self) -> io::Result<SourceBytes<'_>> {
        self.inner.view()
    }

    fn open_segment(&self, segment: &Segment) -> io::Result<Box<dyn Read + Send + '_>> {
        let reader = self.inner.open_segment(segment)?;
        if segment.ordinal == self.failing_ordinal {
            Ok(Box::new(FailingReader {
                inner: reader,
                remaining: segment.len() / 2,
            }))
        } else {
            Ok(reader)
        }
    }
}

#[test]
fn test_worker_fault_leaves_no_output() -> Result<()> {
    let dir = tempdir()?;
    let output = dir.path().join("filtered.log");
    let filters = FilterSet::from_keywords(["ERROR"])?;
    let source = FaultySource {
        inner: MemorySource::new(create_log(5_000)),
        failing_ordinal: 2,
    };
    let config = SieveConfig {
        worker_count: Some(4),
        cancel_check_interval: 64,
        ..SieveConfig::default()
    };

    let err = execute_with_source(&config, &source, &output, &filters).unwrap_err();
    match err {
        SieveError::RunFailed(failure) => {
            assert_eq!(failure.ordinal, 2);
            assert!(failure.offset > 0);
        }
        other => panic!("expected RunFailed, got {:?}", other),
    }

    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0, "temporary file left behind");
    Ok(())
}

#[test]
fn test_fault_keeps_previous_output_intact() -> Result<()> {
    let dir = tempdir()?;
    let output = dir.path().join("filtered.log");
    fs::write(&output, "previous run\n")?;

    let filters = FilterSet::from_keywords(["ERROR"])?;
    let source = FaultySource {
        inner: MemorySource::new(create_log(1_000)),
        failing_ordinal: 0,
    };
    let config = SieveConfig {
        worker_count: Some(2),
        ..SieveConfig::default()
    };

    assert!(execute_with_source(&config, &source, &output, &filters).is_err());
    assert_eq!(fs::read_to_string(&output)?, "previous run\n");
    Ok(())
}

#[test]
fn test_scenario_three_errors_in_ten_lines() -> Result<()> {
    let dir = tempdir()?;
    let log = "boot\nERROR disk\nok\nok\nwarn: not an error\nERROR\nok\nok\nok\nfinal ERROR here\n";
    let input = write_log(dir.path(), "app.log", log)?;
    let output = dir.path().join("out.log");
    let filters = FilterSet::from_keywords(["ERROR"])?;

    let report = execute(&input, &output, &filters, Some(4))?;

    assert_eq!(
        fs::read_to_string(&output)?,
        "ERROR disk\nERROR\nfinal ERROR here\n"
    );
    assert_eq!(report.total_lines, 10);
    assert_eq!(report.matched_lines, 3);
    assert_eq!(report.count_for("ERROR"), Some(3));
    Ok(())
}

#[test]
fn test_scenario_empty_file() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "empty.log", "")?;
    let output = dir.path().join("out.log");
    let filters = FilterSet::from_keywords(["ERROR"])?;

    for workers in [None, Some(1), Some(8)] {
        let report = execute(&input, &output, &filters, workers)?;
        assert!(output.exists());
        assert_eq!(fs::read(&output)?.len(), 0);
        assert_eq!(report.total_lines, 0);
        assert_eq!(report.matched_lines, 0);
        assert_eq!(report.count_for("ERROR"), Some(0));
    }
    Ok(())
}

#[test]
fn test_scenario_line_matching_two_filters() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "app.log", "start\nWARN retry after ERROR\nend\n")?;
    let output = dir.path().join("out.log");
    let filters = FilterSet::from_keywords(["WARN", "ERROR"])?;

    let report = execute(&input, &output, &filters, Some(2))?;

    assert_eq!(fs::read_to_string(&output)?, "WARN retry after ERROR\n");
    assert_eq!(report.matched_lines, 1);
    assert_eq!(report.count_for("WARN"), Some(1));
    assert_eq!(report.count_for("ERROR"), Some(1));
    Ok(())
}

#[test]
fn test_scenario_more_workers_than_lines() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "tiny.log", "ERROR one\ntwo\n")?;
    let output = dir.path().join("out.log");
    let filters = FilterSet::from_keywords(["ERROR", "two"])?;

    let report = execute(&input, &output, &filters, Some(8))?;

    assert!(report.workers <= 2);
    assert_eq!(report.total_lines, 2);
    assert_eq!(report.matched_lines, 2);
    assert_eq!(fs::read_to_string(&output)?, "ERROR one\ntwo\n");
    Ok(())
}

#[test]
fn test_scenario_case_sensitivity() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "app.log", "an ERROR occurred\n")?;

    let insensitive = FilterSet::new(vec![Filter::new("error", "error", false)?])?;
    let report = execute(&input, &dir.path().join("ci.log"), &insensitive, Some(1))?;
    assert_eq!(report.count_for("error"), Some(1));

    let sensitive = FilterSet::new(vec![Filter::new("error", "error", true)?])?;
    let report = execute(&input, &dir.path().join("cs.log"), &sensitive, Some(1))?;
    assert_eq!(report.count_for("error"), Some(0));
    assert_eq!(fs::read(dir.path().join("cs.log"))?.len(), 0);
    Ok(())
}

#[test]
fn test_preserves_line_terminators() -> Result<()> {
    let dir = tempdir()?;
    let log = "INFO a\r\nERROR b\r\nINFO c\r\nERROR d";
    let input = write_log(dir.path(), "windows.log", log)?;
    let output = dir.path().join("out.log");
    let filters = FilterSet::from_keywords(["ERROR"])?;

    let report = execute(&input, &output, &filters, Some(3))?;

    assert_eq!(fs::read_to_string(&output)?, "ERROR b\r\nERROR d");
    assert_eq!(report.total_lines, 4);
    Ok(())
}

#[test]
fn test_every_filter_reported() -> Result<()> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "app.log", &create_log(100))?;
    let filters = FilterSet::from_keywords(["ERROR", "NEVER_PRESENT", "WARN"])?;

    let report = execute(&input, &dir.path().join("out.log"), &filters, None)?;

    let names: Vec<&str> = report.filter_counts.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["ERROR", "NEVER_PRESENT", "WARN"]);
    assert_eq!(report.count_for("NEVER_PRESENT"), Some(0));
    assert!(report.hits().iter().all(|&(name, _)| name != "NEVER_PRESENT"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_output_is_readable_like_a_normal_file() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let input = write_log(dir.path(), "app.log", "ERROR one\nINFO two\n")?;
    let output = dir.path().join("out.log");
    let filters = FilterSet::from_keywords(["ERROR"])?;

    execute(&input, &output, &filters, Some(2))?;

    let mode = fs::metadata(&output)?.permissions().mode() & 0o777;
    assert_eq!(mode, 0o644, "output mode {:o}", mode);
    Ok(())
}
