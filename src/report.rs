//! Result translation and reporting.
//!
//! [`ResultTranslator`] walks a completed run's job → suite → test hierarchy
//! and builds a [`RunReport`]. The report can be written as JUnit XML (see
//! [`junit`]) and summarized on the console with [`print_summary`].
//!
//! # Classification
//!
//! | Remote result | Status |
//! |---------------|--------|
//! | `SUCCESS`, `PASSED` | [`TestStatus::Success`] |
//! | `SKIPPED`, `PENDING`, `STOPPED` | [`TestStatus::Skipped`] |
//! | `FAILED`, `ERRORED`, `WARNED` | [`TestStatus::Failed`] |
//!
//! Any other value is a classification error. It is logged, the test is
//! left out of its suite, and it is counted in [`RunReport::unclassified`].
//!
//! Suite error and failure counts are copied from the service's suite
//! counters. They are not recomputed from the classified tests and may
//! disagree with them.

pub mod junit;

pub use junit::{render_suite, run_report_dir, write_reports};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{DeviceFarmApi, Job, Run, Suite, Test, collect_pages};
use crate::error::{DeviceFarmError, DeviceFarmResult};

/// Outcome of a single test after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Success,
    Skipped,
    Failed,
}

/// Maps a remote test result string to a [`TestStatus`].
///
/// # Errors
///
/// Returns [`DeviceFarmError::Classification`] for unknown values.
pub fn classify(test: &str, result: &str) -> DeviceFarmResult<TestStatus> {
    match result {
        "SUCCESS" | "PASSED" => Ok(TestStatus::Success),
        "SKIPPED" | "PENDING" | "STOPPED" => Ok(TestStatus::Skipped),
        "FAILED" | "ERRORED" | "WARNED" => Ok(TestStatus::Failed),
        other => Err(DeviceFarmError::Classification {
            test: test.to_string(),
            value: other.to_string(),
        }),
    }
}

/// One classified test.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub name: String,
    pub status: TestStatus,
    /// Stop minus start, when both timestamps are known.
    pub duration: Option<Duration>,
    pub message: Option<String>,
}

/// One suite with the service's own counters.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteReport {
    pub name: String,
    pub errors: u32,
    pub failures: u32,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn tests(&self) -> usize {
        self.cases.len()
    }
}

/// One job, i.e. one device.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub name: String,
    pub device: String,
    pub result: Option<String>,
    pub suites: Vec<SuiteReport>,
}

/// Report for a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_arn: String,
    pub jobs: Vec<JobReport>,
    /// Tests left out because their result could not be classified.
    pub unclassified: usize,
}

impl RunReport {
    fn cases(&self) -> impl Iterator<Item = &CaseReport> {
        self.jobs
            .iter()
            .flat_map(|job| &job.suites)
            .flat_map(|suite| &suite.cases)
    }

    pub fn total(&self) -> usize {
        self.cases().count()
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.cases().filter(|case| case.status == status).count()
    }

    /// Returns `true` if no classified test failed and none were unclassified.
    pub fn success(&self) -> bool {
        self.count(TestStatus::Failed) == 0 && self.unclassified == 0
    }
}

/// Builds reports from the service's result hierarchy.
pub struct ResultTranslator {
    api: Arc<dyn DeviceFarmApi>,
}

impl ResultTranslator {
    pub fn new(api: Arc<dyn DeviceFarmApi>) -> Self {
        Self { api }
    }

    /// Fetches jobs, suites and tests for `run` and classifies every test.
    ///
    /// # Errors
    ///
    /// Remote call failures are returned. Classification errors are not.
    pub async fn build_report(&self, run: &Run) -> DeviceFarmResult<RunReport> {
        let api = self.api.as_ref();
        let jobs = collect_pages(|token| api.list_jobs(&run.arn, token)).await?;
        info!("Found {} jobs for run {}", jobs.len(), run.arn);

        let mut report = RunReport {
            run_arn: run.arn.clone(),
            jobs: Vec::with_capacity(jobs.len()),
            unclassified: 0,
        };

        for job in jobs {
            log_job(&job);
            let suites = collect_pages(|token| api.list_suites(&job.arn, token)).await?;

            let mut job_report = JobReport {
                device: job
                    .device
                    .as_ref()
                    .map(|device| device.name.clone())
                    .unwrap_or_else(|| job.name.clone()),
                name: job.name,
                result: job.result,
                suites: Vec::with_capacity(suites.len()),
            };

            for suite in suites {
                debug!("Looking up tests for suite {}", suite.name);
                let tests = collect_pages(|token| api.list_tests(&suite.arn, token)).await?;
                let (suite_report, unclassified) = translate_suite(&suite, tests);
                report.unclassified += unclassified;
                job_report.suites.push(suite_report);
            }

            report.jobs.push(job_report);
        }

        Ok(report)
    }
}

fn log_job(job: &Job) {
    info!(
        "(Type: {}) {}: {} - {}",
        job.job_type.as_deref().unwrap_or("UNKNOWN"),
        job.name,
        job.message.as_deref().unwrap_or(""),
        job.result.as_deref().unwrap_or("")
    );
}

fn translate_suite(suite: &Suite, tests: Vec<Test>) -> (SuiteReport, usize) {
    let mut cases = Vec::with_capacity(tests.len());
    let mut unclassified = 0;

    for test in tests {
        let result = test.result.as_deref().unwrap_or("");
        match classify(&test.name, result) {
            Ok(status) => cases.push(translate_test(test, status)),
            Err(e) => {
                warn!("{}", e);
                unclassified += 1;
            }
        }
    }

    let report = SuiteReport {
        name: suite.name.clone(),
        errors: suite.counters.errored,
        failures: suite.counters.failed,
        cases,
    };
    (report, unclassified)
}

fn translate_test(test: Test, status: TestStatus) -> CaseReport {
    let duration = match (test.started, test.stopped) {
        (Some(started), Some(stopped)) => (stopped - started).to_std().ok(),
        _ => None,
    };
    let message = match status {
        TestStatus::Failed => test.message.or(test.result),
        _ => test.message,
    };

    CaseReport {
        name: test.name,
        status,
        duration,
        message,
    }
}

/// Prints a summary of a run report to the console.
pub fn print_summary(report: &RunReport) {
    println!();
    println!("Device Farm Results ({}):", report.run_arn);
    println!("  Jobs:    {}", report.jobs.len());
    println!("  Total:   {}", report.total());
    println!(
        "  Passed:  {}",
        console::style(report.count(TestStatus::Success)).green()
    );
    println!(
        "  Failed:  {}",
        console::style(report.count(TestStatus::Failed)).red()
    );
    println!(
        "  Skipped: {}",
        console::style(report.count(TestStatus::Skipped)).yellow()
    );

    if report.unclassified > 0 {
        println!(
            "  Unclassified: {}",
            console::style(report.unclassified).red().bold()
        );
    }

    println!();
    if report.success() {
        println!("{}", console::style("All tests passed!").green().bold());
    } else {
        println!("{}", console::style("Some tests failed.").red().bold());
    }
}
