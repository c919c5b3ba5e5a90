use std::io::{Cursor, Read};

use anyhow::{Context, Result};

use crate::{
    extract::Extractor,
    models::{ErrorSnippet, Job, Outcome, Report},
    resolve::JobTable,
};

/// Collects snippets, keeping the first one seen for each job.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    report: Report,
}

impl ReportBuilder {
    pub fn new() -> Self { Self::default() }

    /// Whether a snippet for `job` would still be accepted.
    pub fn wants(&self, job: &str) -> bool { !self.report.contains(job) }

    /// Returns `false` if the job already had a snippet.
    pub fn push(&mut self, snippet: ErrorSnippet) -> bool {
        if !self.wants(&snippet.job) {
            return false;
        }
        self.report.snippets.push(snippet);
        true
    }

    pub fn finish(self) -> Report { self.report }
}

/// A failed run without snippets is not the same outcome as a passing run.
pub fn classify(jobs: &[Job], report: Report) -> Outcome {
    if !jobs.iter().any(Job::failed) {
        Outcome::AllPassed
    } else if report.is_empty() {
        Outcome::FailedNoEvidence
    } else {
        Outcome::FailedWithEvidence(report)
    }
}

/// Walk a run's log archive and build the report for its failed jobs.
///
/// Entries that are not `.txt` logs, or whose folder resolves to no failed
/// job, are skipped.
pub fn collect_report(jobs: &[Job], archive: &[u8], extractor: &Extractor) -> Result<Report> {
    let table = JobTable::from_jobs(jobs);
    let mut builder = ReportBuilder::new();
    if table.is_empty() {
        return Ok(builder.finish());
    }
    let mut archive =
        zip::ZipArchive::new(Cursor::new(archive)).context("Failed to open log archive")?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).context("Failed to read log archive entry")?;
        if file.is_dir() || !file.name().ends_with(".txt") {
            continue;
        }
        let name = file.name().to_string();
        let Some(job) = table.resolve_entry(&name) else {
            tracing::debug!("No failed job matches log {}", name);
            continue;
        };
        if !builder.wants(job) {
            continue;
        }
        let mut contents = Vec::with_capacity(file.size() as usize);
        if let Err(e) = file.read_to_end(&mut contents) {
            tracing::warn!("Failed to read log {}: {:?}", name, e);
            continue;
        }
        if let Some(snippet) = extractor.extract(job, &contents) {
            tracing::debug!("Found errors for job {} in {}", job, name);
            builder.push(snippet);
        }
    }
    Ok(builder.finish())
}

/// Classify a completed run from its job list and log archive.
pub fn analyze_run(jobs: &[Job], archive: &[u8], extractor: &Extractor) -> Result<Outcome> {
    if !jobs.iter().any(Job::failed) {
        return Ok(Outcome::AllPassed);
    }
    let report = collect_report(jobs, archive, extractor)?;
    Ok(classify(jobs, report))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

    use super::*;
    use crate::{config::AnalysisConfig, models::JobConclusion};

    pub(crate) fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn scenario_log() -> String {
        let mut lines =
            (0..30).map(|i| format!("2025-04-01T04:07:58.0000000Z step {i}")).collect::<Vec<_>>();
        lines[10] =
            "2025-04-01T04:07:58.1000000Z \x1b[31mFAILED: assertion error\x1b[0m".to_string();
        lines.join("\n")
    }

    fn extractor() -> Extractor { Extractor::new(&AnalysisConfig::default()).unwrap() }

    #[test]
    fn test_first_snippet_per_job_wins() {
        let mut builder = ReportBuilder::new();
        assert!(builder.push(ErrorSnippet { job: "A".into(), text: "one".into() }));
        assert!(builder.push(ErrorSnippet { job: "B".into(), text: "two".into() }));
        assert!(!builder.push(ErrorSnippet { job: "A".into(), text: "three".into() }));
        let report = builder.finish();
        assert_eq!(report.len(), 2);
        assert_eq!(report.get("A").map(|s| s.text.as_str()), Some("one"));
        assert_eq!(report.snippets[1].job, "B");
    }

    #[test]
    fn test_classify() {
        let passed = [Job::new("Lint", JobConclusion::Success)];
        let failed = [Job::new("Lint", JobConclusion::Failure)];
        let report =
            Report { snippets: vec![ErrorSnippet { job: "Lint".into(), text: "x".into() }] };
        assert_eq!(classify(&passed, report.clone()), Outcome::AllPassed);
        assert_eq!(classify(&failed, Report::default()), Outcome::FailedNoEvidence);
        assert_eq!(classify(&failed, report.clone()), Outcome::FailedWithEvidence(report));
    }

    #[test]
    fn test_all_passed_ignores_log_content() {
        let jobs = [Job::new("Units (devel)", JobConclusion::Success)];
        let log = scenario_log();
        let archive = build_archive(&[("0_units_devel_.txt", log.as_bytes())]);
        assert_eq!(analyze_run(&jobs, &archive, &extractor()).unwrap(), Outcome::AllPassed);
        // Not even a valid archive is needed.
        assert_eq!(analyze_run(&jobs, b"garbage", &extractor()).unwrap(), Outcome::AllPassed);
    }

    #[test]
    fn test_failed_job_with_evidence() {
        let jobs = [
            Job::new("Lint", JobConclusion::Success),
            Job::new("Units (devel)", JobConclusion::Failure),
        ];
        let log = scenario_log();
        let archive = build_archive(&[
            ("0_units_devel_.txt", log.as_bytes()),
            ("Units (devel)/system.json", &b"{\"FAILED\": true}"[..]),
            ("Units (devel)/2_Run tests.txt", &b"ERROR: later file"[..]),
        ]);
        let outcome = analyze_run(&jobs, &archive, &extractor()).unwrap();
        let Outcome::FailedWithEvidence(report) = outcome else {
            panic!("expected evidence");
        };
        assert_eq!(report.len(), 1);
        let snippet = report.get("Units (devel)").unwrap();
        let lines = snippet.text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "step 7");
        assert_eq!(lines[3], "FAILED: assertion error");
        assert_eq!(lines[9], "step 16");
        assert!(!snippet.text.contains("later file"));
    }

    #[test]
    fn test_unmatched_folder_has_no_evidence() {
        let jobs = [Job::new("Units (devel)", JobConclusion::Failure)];
        let log = scenario_log();
        let archive = build_archive(&[("3_sanity_stable.txt", log.as_bytes())]);
        assert_eq!(
            analyze_run(&jobs, &archive, &extractor()).unwrap(),
            Outcome::FailedNoEvidence
        );
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let jobs = [Job::new("Units", JobConclusion::Failure)];
        assert!(analyze_run(&jobs, b"not a zip", &extractor()).is_err());
    }
}
