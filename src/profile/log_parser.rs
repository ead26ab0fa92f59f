//! Log parsing (§4.6, §7 Parse error): turns raw test-runner output into a
//! `{test_name: outcome}` map. A line that matches no known pattern is simply
//! ignored; the caller decides whether the unclassified fraction crosses the
//! `unparseable` threshold.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Per-test outcome (§3 Test Report).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Pass,
    Fail,
    Error,
    Skip,
    Missing,
}

/// Which textual convention `parse_log` expects (§4.1 `log_parser`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogParserKind {
    /// `pytest -v` style: `tests/test_x.py::test_name PASSED`.
    Pytest,
    /// Jest/Mocha style: `✓ test name` / `✗ test name` / `1) test name`.
    Jest,
    /// `go test -v` style: `--- PASS: TestName` / `--- FAIL: TestName`.
    GoTest,
}

impl LogParserKind {
    pub fn parse(&self, text: &str) -> BTreeMap<String, TestOutcome> {
        match self {
            LogParserKind::Pytest => parse_pytest(text),
            LogParserKind::Jest => parse_jest(text),
            LogParserKind::GoTest => parse_go_test(text),
        }
    }
}

/// Fraction of input lines that matched no known record, used to decide
/// `unparseable` (§7). `total_lines` counts non-blank lines only.
pub fn unclassified_fraction(text: &str, parser: LogParserKind) -> (usize, usize) {
    let total = text.lines().filter(|l| !l.trim().is_empty()).count();
    let classified = parser.parse(text).len();
    (total.saturating_sub(classified), total)
}

fn parse_pytest(text: &str) -> BTreeMap<String, TestOutcome> {
    let re = Regex::new(r"^(?P<name>\S+::\S+)\s+(?P<status>PASSED|FAILED|ERROR|SKIPPED)\b").unwrap();
    let mut out = BTreeMap::new();
    for line in text.lines() {
        if let Some(caps) = re.captures(line.trim()) {
            let outcome = match &caps["status"] {
                "PASSED" => TestOutcome::Pass,
                "FAILED" => TestOutcome::Fail,
                "ERROR" => TestOutcome::Error,
                "SKIPPED" => TestOutcome::Skip,
                _ => continue,
            };
            out.insert(caps["name"].to_string(), outcome);
        }
    }
    out
}

fn parse_jest(text: &str) -> BTreeMap<String, TestOutcome> {
    let pass_re = Regex::new(r"^[✓✔]\s+(?P<name>.+?)(?:\s+\(\d+\s*ms\))?$").unwrap();
    let fail_re = Regex::new(r"^[✗✕]\s+(?P<name>.+?)(?:\s+\(\d+\s*ms\))?$").unwrap();
    let skip_re = Regex::new(r"^○\s+(?P<name>.+)$").unwrap();
    let mut out = BTreeMap::new();
    for raw in text.lines() {
        let line = raw.trim();
        if let Some(caps) = pass_re.captures(line) {
            out.insert(caps["name"].to_string(), TestOutcome::Pass);
        } else if let Some(caps) = fail_re.captures(line) {
            out.insert(caps["name"].to_string(), TestOutcome::Fail);
        } else if let Some(caps) = skip_re.captures(line) {
            out.insert(caps["name"].to_string(), TestOutcome::Skip);
        }
    }
    out
}

fn parse_go_test(text: &str) -> BTreeMap<String, TestOutcome> {
    let re = Regex::new(r"^--- (?P<status>PASS|FAIL|SKIP):\s+(?P<name>\S+)").unwrap();
    let mut out = BTreeMap::new();
    for line in text.lines() {
        if let Some(caps) = re.captures(line.trim()) {
            let outcome = match &caps["status"] {
                "PASS" => TestOutcome::Pass,
                "FAIL" => TestOutcome::Fail,
                "SKIP" => TestOutcome::Skip,
                _ => continue,
            };
            out.insert(caps["name"].to_string(), outcome);
        }
    }
    out
}
