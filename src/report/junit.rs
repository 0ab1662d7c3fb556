//! JUnit XML output for CI systems

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::PathBuf;

use super::{emit, Reporter, RunReport};
use crate::common::{Error, Result};
use crate::runner::ExecutionResult;

/// Writes one `<testcase>` per case
pub struct JunitReporter {
    output: Option<PathBuf>,
}

impl JunitReporter {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }
}

impl Reporter for JunitReporter {
    fn report(&self, report: &RunReport) -> Result<()> {
        let xml = generate_junit_xml(report)?;
        emit(&xml, self.output.as_deref(), "JUnit")
    }
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// Render a run as a JUnit XML document
pub fn generate_junit_xml(report: &RunReport) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let total = report.summary.total.to_string();
    let failures = report.summary.failed.to_string();
    let time = format!("{:.3}", report.duration_ms().max(0) as f64 / 1000.0);

    let mut suites = BytesStart::new("testsuites");
    suites.push_attribute(("name", "apicontract"));
    suites.push_attribute(("tests", total.as_str()));
    suites.push_attribute(("failures", failures.as_str()));
    suites.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites))?;

    let run_id = report.run_id.to_string();
    let timestamp = report.started_at.to_rfc3339();
    let mut suite = BytesStart::new("testsuite");
    suite.push_attribute(("name", report.suite.as_str()));
    suite.push_attribute(("id", run_id.as_str()));
    suite.push_attribute(("tests", total.as_str()));
    suite.push_attribute(("failures", failures.as_str()));
    suite.push_attribute(("errors", "0"));
    suite.push_attribute(("skipped", "0"));
    suite.push_attribute(("time", time.as_str()));
    suite.push_attribute(("timestamp", timestamp.as_str()));
    writer.write_event(Event::Start(suite))?;

    writer.write_event(Event::Start(BytesStart::new("properties")))?;
    for (name, value) in [
        ("base_url", report.base_url.as_str()),
        ("session_token", report.session.token.as_str()),
    ] {
        let mut property = BytesStart::new("property");
        property.push_attribute(("name", name));
        property.push_attribute(("value", value));
        writer.write_event(Event::Empty(property))?;
    }
    writer.write_event(Event::End(BytesEnd::new("properties")))?;

    for result in &report.results {
        write_test_case(&mut writer, &report.suite, result)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| Error::Xml(format!("report is not valid UTF-8: {}", e)))
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    suite: &str,
    result: &ExecutionResult,
) -> Result<()> {
    let time = seconds(result.duration_ms);
    let mut case = BytesStart::new("testcase");
    case.push_attribute(("name", result.name()));
    case.push_attribute(("classname", suite));
    case.push_attribute(("time", time.as_str()));

    if result.passed {
        writer.write_event(Event::Empty(case))?;
        return Ok(());
    }

    writer.write_event(Event::Start(case))?;

    let message = result
        .failures
        .first()
        .map(|f| f.message.as_str())
        .unwrap_or("failed");
    let kind = result
        .failures
        .first()
        .map(|f| f.kind.to_string())
        .unwrap_or_default();
    let mut failure = BytesStart::new("failure");
    failure.push_attribute(("message", message));
    failure.push_attribute(("type", kind.as_str()));
    writer.write_event(Event::Start(failure))?;

    let mut detail = format!("{} {}\n", result.request.method, result.request.url);
    for f in &result.failures {
        detail.push_str(&format!("{}\n", f));
        if let (Some(expected), Some(actual)) = (&f.expected, &f.actual) {
            detail.push_str(&format!("  expected: {}\n  actual:   {}\n", expected, actual));
        }
    }
    for section in cdata_sections(&detail) {
        writer.write_event(Event::CData(BytesCData::new(section)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("failure")))?;

    if let Some(status) = result.actual_status {
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new(&format!("status {}", status))))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Split text so no CDATA section contains its own terminator
///
/// `a]]>b` becomes `a]]` and `>b`; readers concatenate adjacent sections.
fn cdata_sections(text: &str) -> Vec<String> {
    let parts: Vec<&str> = text.split("]]>").collect();
    let last = parts.len() - 1;
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let open = if i > 0 { ">" } else { "" };
            let close = if i < last { "]]" } else { "" };
            format!("{}{}{}", open, part, close)
        })
        .collect()
}
