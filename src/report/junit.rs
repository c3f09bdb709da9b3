//! JUnit XML report generation.
//!
//! Each suite of each job becomes its own file, named
//! `TEST-<device>-<suite>.xml`, which is the layout CI systems pick up from a
//! results directory. Shards of one invocation can run the same suites on the
//! same device, so each shard writes below [`run_report_dir`].
//!
//! # Format
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuite errors="0" failures="1" name="com.example.CartTest" tests="2">
//!   <testcase classname="com.example.CartTest" name="testAdd" time="1.250"/>
//!   <testcase classname="com.example.CartTest" name="testCheckout">
//!     <failure message="expected &lt;1&gt; but was &lt;2&gt;"/>
//!   </testcase>
//! </testsuite>
//! ```
//!
//! The `errors` and `failures` attributes carry the service's suite counters.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use regex::Regex;
use tracing::{debug, error, info};

use super::{CaseReport, RunReport, SuiteReport, TestStatus};
use crate::arn::run_id_from_arn;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Renders one suite as a standalone JUnit XML document.
pub fn render_suite(suite: &SuiteReport) -> anyhow::Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut testsuite = BytesStart::new("testsuite");
    testsuite.push_attribute(("errors", suite.errors.to_string().as_str()));
    testsuite.push_attribute(("failures", suite.failures.to_string().as_str()));
    testsuite.push_attribute(("name", clean_xml(&suite.name).as_str()));
    testsuite.push_attribute(("tests", suite.tests().to_string().as_str()));

    if suite.cases.is_empty() {
        writer.write_event(Event::Empty(testsuite))?;
    } else {
        writer.write_event(Event::Start(testsuite))?;
        for case in &suite.cases {
            write_testcase(&mut writer, &suite.name, case)?;
        }
        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    }

    let xml = String::from_utf8(writer.into_inner())?;
    Ok(xml)
}

fn write_testcase<W: std::io::Write>(
    writer: &mut Writer<W>,
    classname: &str,
    case: &CaseReport,
) -> anyhow::Result<()> {
    let mut testcase = BytesStart::new("testcase");
    testcase.push_attribute(("classname", clean_xml(classname).as_str()));
    testcase.push_attribute(("name", clean_xml(&case.name).as_str()));
    if let Some(duration) = case.duration {
        testcase.push_attribute(("time", format!("{:.3}", duration.as_secs_f64()).as_str()));
    }

    match case.status {
        TestStatus::Success => {
            writer.write_event(Event::Empty(testcase))?;
        }
        TestStatus::Skipped => {
            writer.write_event(Event::Start(testcase))?;
            writer.write_event(Event::Empty(BytesStart::new("skipped")))?;
            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }
        TestStatus::Failed => {
            writer.write_event(Event::Start(testcase))?;
            let mut failure = BytesStart::new("failure");
            let message = case.message.as_deref().unwrap_or("");
            // push_attribute escapes; only characters XML cannot carry are removed here
            failure.push_attribute(("message", clean_xml(message).as_str()));
            writer.write_event(Event::Empty(failure))?;
            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }
    }

    Ok(())
}

/// Writes one file per suite per job below `dir` and returns their paths.
///
/// The directory is created if missing. Write failures are logged and the
/// affected files skipped.
pub fn write_reports(report: &RunReport, dir: &Path) -> Vec<PathBuf> {
    let mut written = Vec::new();

    if !dir.exists() {
        info!("Creating report directory {}", dir.display());
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Failed to create report directory {}: {}", dir.display(), e);
            return written;
        }
    }

    for job in &report.jobs {
        for suite in &job.suites {
            let path = dir.join(report_file_name(&job.device, &suite.name));
            let xml = match render_suite(suite) {
                Ok(xml) => xml,
                Err(e) => {
                    error!("Failed to generate JUnit XML for {}: {}", suite.name, e);
                    continue;
                }
            };

            debug!("Writing {} bytes to {}", xml.len(), path.display());
            match std::fs::write(&path, xml) {
                Ok(()) => {
                    info!("JUnit XML written to: {}", path.display());
                    written.push(path);
                }
                Err(e) => error!("Failed to write JUnit XML {}: {}", path.display(), e),
            }
        }
    }

    written
}

/// Directory below `base` holding one run's reports, named by its run id.
pub fn run_report_dir(base: &Path, run_arn: &str) -> PathBuf {
    let id = run_id_from_arn(run_arn).unwrap_or(run_arn);
    base.join(UNSAFE_CHARS.replace_all(id, "_").as_ref())
}

/// `TEST-<device>-<suite>.xml` with path-hostile characters replaced.
fn report_file_name(device: &str, suite: &str) -> String {
    let device = UNSAFE_CHARS.replace_all(device, "_");
    let suite = UNSAFE_CHARS.replace_all(suite, "_");
    format!("TEST-{}-{}.xml", device, suite)
}

/// Removes characters that are not allowed in XML 1.0 documents.
fn clean_xml(s: &str) -> String {
    s.chars()
        .filter(|c| {
            matches!(
                c,
                '\t' | '\n' | '\r' | ' '..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..
            )
        })
        .collect()
}
