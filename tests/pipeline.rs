//! End-to-end exercise of the synthesis pipeline against a small fixture
//! repository: profile load -> entity extraction -> procedural bug generation
//! -> collection -> validation (against an in-process fake container runtime)
//! -> gathering -> static issue generation -> dataset assembly.

use std::sync::{Arc, Mutex};

use swesmith::collector;
use swesmith::entity::{self, LanguageAdapter};
use swesmith::errors::SmithError;
use swesmith::gatherer;
use swesmith::generators::procedural::ProceduralGenerator;
use swesmith::generators::BugGenerator;
use swesmith::issue::{self, IssueMode};
use swesmith::profile::RepoProfile;
use swesmith::validator::container::{ContainerRuntime, ProcessOutput};
use swesmith::{dataset, validator};

/// Serves a fixed gold report on the first `run`, then a candidate-specific
/// report keyed by whether the applied diff contains the marker string
/// `"False"` (our procedural negate-boolean variant's tell).
struct ScriptedRuntime {
    calls: Mutex<usize>,
}

impl ContainerRuntime for ScriptedRuntime {
    fn apply_patch(&self, _image_name: &str, diff: &str) -> Result<(), SmithError> {
        if diff.contains("nope") {
            return Err(SmithError::ApplyFailed("img".into(), "conflict".into()));
        }
        Ok(())
    }

    fn run(&self, _image_name: &str, _command: &str, _timeout_secs: u64) -> Result<ProcessOutput, SmithError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let stdout = if *calls == 1 {
            // gold run: both tests pass on the clean tree.
            "tests/test_widget.py::test_add PASSED\ntests/test_widget.py::test_sub PASSED\n".to_string()
        } else {
            // candidate run: the negated boolean flips test_add.
            "tests/test_widget.py::test_add FAILED\ntests/test_widget.py::test_sub PASSED\n".to_string()
        };
        Ok(ProcessOutput { stdout, stderr: String::new(), exit_code: 0 })
    }
}

fn fixture_profile_toml() -> &'static str {
    r#"
        owner = "acme"
        repo = "widget"
        commit = "abc1234def5678"
        container_recipe = "FROM python:3.11"
        test_cmd = "pytest"
        log_parser = "pytest"
        language = "python"
        source_globs = ["**/*.py"]
    "#
}

#[test]
fn pipeline_produces_a_schema_valid_dataset_from_a_fixture_repo() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("widget.py"),
        "def add(a, b):\n    ok = True\n    if ok:\n        return a + b\n    return 0\n",
    )
    .unwrap();

    let profiles = RepoProfile::load_all(fixture_profile_toml()).unwrap();
    let profile = &profiles[0];

    let source_files = entity::gather_source_tree(dir.path(), profile).unwrap();
    assert_eq!(source_files.len(), 1);

    let adapter = LanguageAdapter::for_language(profile.language());
    let entities = adapter.entities_of(&source_files).unwrap();
    assert!(!entities.is_empty());

    let candidates = ProceduralGenerator.generate(&entities, 10).unwrap();
    assert!(!candidates.is_empty());

    let bug_gen_dir = profile.bug_gen_dir(&dir.path().to_path_buf());
    for candidate in &candidates {
        candidate.write_to(&bug_gen_dir).unwrap();
    }
    let manifest = collector::collect(&bug_gen_dir).unwrap();
    assert_eq!(manifest.entries.len(), candidates.len());

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(ScriptedRuntime { calls: Mutex::new(0) });
    let validator = validator::Validator::new(Arc::clone(&runtime), 2);
    let gold = validator.gold_report(profile, "img").unwrap();
    let outcomes = validator.validate_all(profile, "img", &gold, candidates.clone());
    assert_eq!(outcomes.len(), candidates.len());

    let instances = gatherer::gather(profile, "img", &candidates, &outcomes);
    assert!(!instances.is_empty(), "at least the negate-boolean candidate should promote");

    let mut issues = Vec::new();
    for instance in &instances {
        if let Some(record) = issue::generate(instance, IssueMode::Static, None).unwrap() {
            issues.push(record);
        }
    }
    assert_eq!(issues.len(), instances.len());

    let records = dataset::assemble(&instances, &issues, IssueMode::Static).unwrap();
    assert_eq!(records.len(), instances.len());
    for record in &records {
        assert!(!record.patch.is_empty());
        assert!(!record.fail_to_pass.is_empty());
        let overlap = record.fail_to_pass.iter().any(|t| record.pass_to_pass.contains(t));
        assert!(!overlap);
    }

    let path = dataset::write_dataset(&records, dir.path(), &profile.repo).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("FAIL_TO_PASS"));
}

#[test]
fn apply_failure_keeps_candidate_out_of_the_gathered_set() {
    let profiles = RepoProfile::load_all(fixture_profile_toml()).unwrap();
    let profile = &profiles[0];

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(ScriptedRuntime { calls: Mutex::new(0) });
    let validator = validator::Validator::new(Arc::clone(&runtime), 1);
    let gold = validator.gold_report(profile, "img").unwrap();

    let candidate = swesmith::generators::CandidatePatch::new(
        "nope this will not apply".to_string(),
        swesmith::generators::GeneratorMetadata {
            bug_kind: swesmith::generators::BugKind::LmModify,
            target_entity: swesmith::generators::EntityRef {
                file: "m.py".into(),
                name: "f".into(),
            },
            prompt: None,
        },
    );
    let outcomes = validator.validate_all(profile, "img", &gold, vec![candidate.clone()]);
    assert!(outcomes[0].apply_failed);

    let instances = gatherer::gather(profile, "img", &[candidate], &outcomes);
    assert!(instances.is_empty());
}
