//! Validator (§4.6): two-phase differential test execution. Phase 1 runs the
//! clean tree once per image and caches the result as the gold report; Phase 2
//! runs each candidate, in parallel, against that gold report and classifies
//! every test's outcome transition into F2P / P2P / ignored.
//!
//! Concurrency is a bounded worker pool (`threadpool`) collecting results over
//! an `mpsc` channel, a queue-of-tasks scheduling shape reused from C6's
//! container-runtime fan-out (§5 "pool of workers over a queue of tasks").

pub mod container;

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};

use dashmap::DashMap;
use threadpool::ThreadPool;
use tracing::{info, warn};

use crate::errors::SmithError;
use crate::generators::CandidatePatch;
use crate::profile::log_parser::{self, TestOutcome};
use crate::profile::RepoProfile;
use crate::validator::container::ContainerRuntime;

/// A test report whose unclassified line fraction exceeds this is dropped as
/// `unparseable` rather than classified against noise (§7 "Parse error").
const UNPARSEABLE_THRESHOLD: f64 = 0.5;

/// `{test_name -> outcome}` plus run metadata (§3 Test Report).
#[derive(Debug, Clone, Default)]
pub struct TestReport {
    pub outcomes: BTreeMap<String, TestOutcome>,
    pub exit_code: i32,
    pub parsed_from_logs: bool,
}

/// Per-candidate classification result (§4.6 step 5-6).
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub candidate_hash: String,
    pub fail_to_pass: Vec<String>,
    pub pass_to_pass: Vec<String>,
    pub apply_failed: bool,
    pub timed_out: bool,
    pub unparseable: bool,
}

impl ValidationOutcome {
    pub fn is_promotable(&self) -> bool {
        !self.apply_failed
            && !self.timed_out
            && !self.unparseable
            && !self.fail_to_pass.is_empty()
            && !self.pass_to_pass.is_empty()
    }
}

/// Builds a `TestReport` from raw runner output, dropping it as
/// `unparseable` (§7, §8 boundary "patch applies but produces zero/unparseable
/// test output") when the unclassified fraction exceeds `UNPARSEABLE_THRESHOLD`
/// or no non-blank lines were produced at all.
fn build_report(profile: &RepoProfile, stdout: &str, exit_code: i32) -> Result<TestReport, SmithError> {
    let (unclassified, total) = log_parser::unclassified_fraction(stdout, profile.log_parser);
    if total == 0 || unclassified as f64 / total as f64 > UNPARSEABLE_THRESHOLD {
        return Err(SmithError::UnparseableReport { unclassified, total });
    }
    Ok(TestReport {
        outcomes: profile.parse_log(stdout),
        exit_code,
        parsed_from_logs: true,
    })
}

/// Classifies every test appearing in either report per the §4.6 transition
/// table. Tests missing or skipped on either side, or already broken on the
/// clean tree, are ignored — only a `pass -> fail/error` or `pass -> pass`
/// transition is meaningful.
pub fn classify(gold: &TestReport, candidate: &TestReport) -> (Vec<String>, Vec<String>) {
    let mut fail_to_pass = Vec::new();
    let mut pass_to_pass = Vec::new();

    let all_tests: std::collections::BTreeSet<&String> =
        gold.outcomes.keys().chain(candidate.outcomes.keys()).collect();

    for test in all_tests {
        let g = gold.outcomes.get(test).copied().unwrap_or(TestOutcome::Missing);
        let c = candidate.outcomes.get(test).copied().unwrap_or(TestOutcome::Missing);
        match (g, c) {
            (TestOutcome::Pass, TestOutcome::Fail | TestOutcome::Error) => fail_to_pass.push(test.clone()),
            (TestOutcome::Pass, TestOutcome::Pass) => pass_to_pass.push(test.clone()),
            _ => {}
        }
    }

    fail_to_pass.sort();
    pass_to_pass.sort();
    (fail_to_pass, pass_to_pass)
}

pub struct Validator {
    runtime: Arc<dyn ContainerRuntime>,
    workers: usize,
    gold_cache: Arc<DashMap<String, TestReport>>,
}

impl Validator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, workers: usize) -> Self {
        Self {
            runtime,
            workers: workers.max(1),
            gold_cache: Arc::new(DashMap::new()),
        }
    }

    /// Phase 1: runs the test suite on the clean tree once per `image_name`,
    /// caching by that key (§4.6). Must complete before Phase 2 starts (§5).
    pub fn gold_report(&self, profile: &RepoProfile, image_name: &str) -> Result<TestReport, SmithError> {
        if let Some(cached) = self.gold_cache.get(image_name) {
            return Ok(cached.clone());
        }
        info!(image = image_name, "running gold test suite");
        let output = self.runtime.run(image_name, &profile.effective_test_cmd(), profile.per_test_timeout_secs)?;
        let report = build_report(profile, &output.stdout, output.exit_code)?;
        self.gold_cache.insert(image_name.to_string(), report.clone());
        Ok(report)
    }

    /// Phase 2: validates every candidate in the manifest against `gold`, up
    /// to `self.workers` in parallel (§4.6, §5).
    pub fn validate_all(
        &self,
        profile: &RepoProfile,
        image_name: &str,
        gold: &TestReport,
        candidates: Vec<CandidatePatch>,
    ) -> Vec<ValidationOutcome> {
        let pool = ThreadPool::new(self.workers);
        let (tx, rx) = mpsc::channel();
        let total = candidates.len();

        for candidate in candidates {
            let runtime = Arc::clone(&self.runtime);
            let tx = tx.clone();
            let profile = profile.clone();
            let image_name = image_name.to_string();
            let gold = gold.clone();
            pool.execute(move || {
                let outcome = validate_one(&runtime, &profile, &image_name, &gold, &candidate);
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        for outcome in rx.iter().take(total) {
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn validate_one(
    runtime: &Arc<dyn ContainerRuntime>,
    profile: &RepoProfile,
    image_name: &str,
    gold: &TestReport,
    candidate: &CandidatePatch,
) -> ValidationOutcome {
    let hash = candidate.hash.to_short();

    if let Err(e) = runtime.apply_patch(image_name, &candidate.diff) {
        warn!(hash, error = %e, "candidate failed to apply");
        return ValidationOutcome {
            candidate_hash: hash,
            fail_to_pass: Vec::new(),
            pass_to_pass: Vec::new(),
            apply_failed: true,
            timed_out: false,
            unparseable: false,
        };
    }

    let output = match runtime.run(image_name, &profile.effective_test_cmd(), profile.per_test_timeout_secs) {
        Ok(output) => output,
        Err(_) => {
            return ValidationOutcome {
                candidate_hash: hash,
                fail_to_pass: Vec::new(),
                pass_to_pass: Vec::new(),
                apply_failed: false,
                timed_out: true,
                unparseable: false,
            };
        }
    };

    let candidate_report = match build_report(profile, &output.stdout, output.exit_code) {
        Ok(report) => report,
        Err(e) => {
            warn!(hash, error = %e, "candidate test report unparseable");
            return ValidationOutcome {
                candidate_hash: hash,
                fail_to_pass: Vec::new(),
                pass_to_pass: Vec::new(),
                apply_failed: false,
                timed_out: false,
                unparseable: true,
            };
        }
    };
    let (fail_to_pass, pass_to_pass) = classify(gold, &candidate_report);

    ValidationOutcome {
        candidate_hash: hash,
        fail_to_pass,
        pass_to_pass,
        apply_failed: false,
        timed_out: false,
        unparseable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(pairs: &[(&str, TestOutcome)]) -> TestReport {
        TestReport {
            outcomes: pairs.iter().map(|(n, o)| (n.to_string(), *o)).collect(),
            exit_code: 0,
            parsed_from_logs: true,
        }
    }

    #[test]
    fn pass_to_fail_is_fail_to_pass() {
        let gold = report(&[("t1", TestOutcome::Pass)]);
        let candidate = report(&[("t1", TestOutcome::Fail)]);
        let (f2p, p2p) = classify(&gold, &candidate);
        assert_eq!(f2p, vec!["t1".to_string()]);
        assert!(p2p.is_empty());
    }

    #[test]
    fn pass_to_pass_is_regression_witness() {
        let gold = report(&[("t1", TestOutcome::Pass)]);
        let candidate = report(&[("t1", TestOutcome::Pass)]);
        let (f2p, p2p) = classify(&gold, &candidate);
        assert!(f2p.is_empty());
        assert_eq!(p2p, vec!["t1".to_string()]);
    }

    #[test]
    fn preexisting_failure_is_ignored() {
        let gold = report(&[("t1", TestOutcome::Fail)]);
        let candidate = report(&[("t1", TestOutcome::Pass)]);
        let (f2p, p2p) = classify(&gold, &candidate);
        assert!(f2p.is_empty());
        assert!(p2p.is_empty());
    }

    #[test]
    fn missing_test_is_ignored() {
        let gold = report(&[]);
        let candidate = report(&[("t1", TestOutcome::Pass)]);
        let (f2p, p2p) = classify(&gold, &candidate);
        assert!(f2p.is_empty());
        assert!(p2p.is_empty());
    }
}
