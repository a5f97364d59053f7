//! JUnit-style test report decoding.
//!
//! One uploaded file holds one XML document whose root is `<testsuites>` or
//! `<testsuite>`. Suites may nest; every `<testcase>` found anywhere below the
//! root becomes one [`ParsedTestResult`], in document order.
//!
//! Status precedence for a case with several outcome children is
//! `error` > `failure` > `skipped` > passed.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};

use super::truncation::{
    FAILURE_MESSAGE_BUDGET, FAILURE_OUTPUT_BUDGET, truncate_optional, truncate_with_marker,
};

/// Outcome of one test case execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// The case ran and passed.
    Passed,
    /// An assertion failed.
    Failed,
    /// The case errored outside its assertions.
    Error,
    /// The case did not run.
    Skipped,
}

impl TestStatus {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    /// Whether this outcome counts as a failing attempt for flake detection.
    #[must_use]
    pub const fn is_failing(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored status string is not one of the known outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown test status `{0}`")]
pub struct UnknownTestStatus(pub String);

impl FromStr for TestStatus {
    type Err = UnknownTestStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            other => Err(UnknownTestStatus(other.to_owned())),
        }
    }
}

/// One test outcome decoded from a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTestResult {
    /// Stable identity, `classname#name`.
    pub test_identifier: String,
    /// Class or module the case belongs to.
    pub classname: String,
    /// Case name.
    pub name: String,
    /// Classified outcome.
    pub status: TestStatus,
    /// Recorded duration in whole milliseconds.
    pub duration_ms: i64,
    /// Failure message, at most 1024 bytes.
    pub failure_message: Option<String>,
    /// Failure output, at most 8192 bytes.
    pub failure_output: Option<String>,
}

/// Build the `classname#name` identifier that pairs attempts of one test.
///
/// # Examples
/// ```
/// use flaketrack::domain::report_parser::test_identifier;
///
/// assert_eq!(test_identifier("pkg.Suite", "works"), "pkg.Suite#works");
/// ```
#[must_use]
pub fn test_identifier(classname: &str, name: &str) -> String {
    format!("{classname}#{name}")
}

/// A report file could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("report `{filename}` is malformed: {reason}")]
pub struct ReportParseError {
    /// Name of the offending uploaded file.
    pub filename: String,
    /// What went wrong.
    pub reason: String,
}

/// Decode one report document.
///
/// # Errors
///
/// Returns [`ReportParseError`] naming `filename` when the document is not
/// well-formed XML, is empty or truncated, has a root other than
/// `<testsuites>`/`<testsuite>`, or contains a `<testcase>` without a name.
///
/// # Examples
/// ```
/// use flaketrack::domain::report_parser::{parse_report, TestStatus};
///
/// let xml = br#"<testsuite name="unit">
///   <testcase classname="math" name="adds" time="0.0125"/>
///   <testcase classname="math" name="divides"><failure message="boom">trace</failure></testcase>
/// </testsuite>"#;
/// let results = parse_report("unit.xml", xml).expect("valid report");
/// assert_eq!(results.len(), 2);
/// assert_eq!(results[0].duration_ms, 12);
/// assert_eq!(results[1].status, TestStatus::Failed);
/// ```
pub fn parse_report(filename: &str, bytes: &[u8]) -> Result<Vec<ParsedTestResult>, ReportParseError> {
    ReportReader::default()
        .read(bytes)
        .map_err(|reason| ReportParseError {
            filename: filename.to_owned(),
            reason,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailKind {
    Failure,
    Error,
}

#[derive(Debug, Default)]
struct Detail {
    message: Option<String>,
    output: String,
}

#[derive(Debug)]
struct CaseBuilder {
    classname: String,
    name: String,
    duration_ms: i64,
    failure: Option<Detail>,
    error: Option<Detail>,
    skipped: bool,
}

impl CaseBuilder {
    fn from_element(element: &BytesStart<'_>) -> Result<Self, String> {
        let name = attribute(element, b"name")?
            .ok_or_else(|| "testcase element is missing its name attribute".to_owned())?;
        let classname = attribute(element, b"classname")?.unwrap_or_default();
        let duration_ms = attribute(element, b"time")?
            .as_deref()
            .map_or(0, seconds_to_millis);
        Ok(Self {
            classname,
            name,
            duration_ms,
            failure: None,
            error: None,
            skipped: false,
        })
    }

    /// Record an outcome child; returns the detail kind to capture text into
    /// when this is the first child of that kind.
    fn record(&mut self, kind: &[u8], message: Option<String>) -> Option<DetailKind> {
        let (slot, detail_kind) = match kind {
            b"failure" => (&mut self.failure, DetailKind::Failure),
            b"error" => (&mut self.error, DetailKind::Error),
            _ => {
                self.skipped = true;
                return None;
            }
        };
        if slot.is_some() {
            return None;
        }
        *slot = Some(Detail {
            message,
            output: String::new(),
        });
        Some(detail_kind)
    }

    fn append_output(&mut self, kind: DetailKind, text: &str) {
        let slot = match kind {
            DetailKind::Failure => &mut self.failure,
            DetailKind::Error => &mut self.error,
        };
        if let Some(detail) = slot {
            detail.output.push_str(text);
        }
    }

    fn finish(self) -> ParsedTestResult {
        let status = if self.error.is_some() {
            TestStatus::Error
        } else if self.failure.is_some() {
            TestStatus::Failed
        } else if self.skipped {
            TestStatus::Skipped
        } else {
            TestStatus::Passed
        };

        let detail = self.error.or(self.failure);
        let (failure_message, failure_output) = match detail {
            Some(detail) => {
                let output = detail.output.trim();
                let output = (!output.is_empty())
                    .then(|| truncate_with_marker(output, FAILURE_OUTPUT_BUDGET).into_owned());
                let message = truncate_optional(detail.message.as_deref(), FAILURE_MESSAGE_BUDGET);
                (message, output)
            }
            None => (None, None),
        };

        ParsedTestResult {
            test_identifier: test_identifier(&self.classname, &self.name),
            classname: self.classname,
            name: self.name,
            status,
            duration_ms: self.duration_ms,
            failure_message,
            failure_output,
        }
    }
}

#[derive(Debug, Default)]
struct ReportReader {
    depth: usize,
    saw_root: bool,
    current: Option<CaseBuilder>,
    capture: Option<DetailKind>,
    results: Vec<ParsedTestResult>,
}

impl ReportReader {
    fn read(mut self, bytes: &[u8]) -> Result<Vec<ParsedTestResult>, String> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|error| format!("invalid XML at byte {}: {error}", reader.buffer_position()))?;
            match event {
                Event::Start(element) => self.open(&element, false)?,
                Event::Empty(element) => self.open(&element, true)?,
                Event::End(element) => self.close(element.local_name().as_ref())?,
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|error| format!("invalid text content: {error}"))?;
                    self.text(&text)?;
                }
                Event::CData(data) => {
                    let raw = data.into_inner();
                    self.text(&String::from_utf8_lossy(&raw))?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !self.saw_root {
            return Err("document has no root element".to_owned());
        }
        if self.depth > 0 {
            return Err("unexpected end of document; elements left unclosed".to_owned());
        }
        Ok(self.results)
    }

    fn open(&mut self, element: &BytesStart<'_>, self_closing: bool) -> Result<(), String> {
        let local_name = element.local_name();
        let name = local_name.as_ref();

        if !self.saw_root {
            if !matches!(name, b"testsuites" | b"testsuite") {
                return Err(format!(
                    "unexpected root element <{}>; expected <testsuites> or <testsuite>",
                    String::from_utf8_lossy(name)
                ));
            }
            self.saw_root = true;
        } else if self.depth == 0 {
            return Err("content found after the root element".to_owned());
        }

        match name {
            b"testcase" => {
                if self.current.is_some() {
                    return Err("testcase elements must not nest".to_owned());
                }
                let case = CaseBuilder::from_element(element)?;
                if self_closing {
                    self.results.push(case.finish());
                } else {
                    self.current = Some(case);
                }
            }
            b"failure" | b"error" | b"skipped" => {
                if let Some(case) = self.current.as_mut() {
                    let message = attribute(element, b"message")?;
                    let capture = case.record(name, message);
                    if !self_closing {
                        self.capture = capture;
                    }
                }
            }
            _ => {}
        }

        if !self_closing {
            self.depth += 1;
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<(), String> {
        self.depth = self
            .depth
            .checked_sub(1)
            .ok_or_else(|| "unbalanced closing tag".to_owned())?;
        match name {
            b"testcase" => {
                if let Some(case) = self.current.take() {
                    self.results.push(case.finish());
                }
                self.capture = None;
            }
            b"failure" | b"error" => self.capture = None,
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), String> {
        let stray = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
        if self.depth == 0 && !stray.is_empty() {
            return Err(if self.saw_root {
                "text found after the root element"
            } else {
                "text found before the root element"
            }
            .to_owned());
        }
        if let (Some(kind), Some(case)) = (self.capture, self.current.as_mut()) {
            case.append_output(kind, text);
        }
        Ok(())
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|error| format!("invalid attribute: {error}"))?;
        if attr.key.local_name().as_ref() == key {
            let value: Cow<'_, str> = attr
                .unescape_value()
                .map_err(|error| format!("invalid attribute value: {error}"))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "float-to-int casts saturate; durations are truncated to whole milliseconds"
)]
fn seconds_to_millis(raw: &str) -> i64 {
    match raw.trim().parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => (seconds * 1000.0).trunc() as i64,
        _ => 0,
    }
}
