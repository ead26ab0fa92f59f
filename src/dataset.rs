//! Dataset Assembler (§4.9): joins gathered instances with issue texts on
//! `instance_id`, enforces the canonical seven-field schema (§3, §6), and
//! writes the final corpus. Fails loudly — no dataset is written — on any
//! schema violation (§7 "Schema violation at the Assembler: fatal").

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::SmithError;
use crate::gatherer::GatheredInstance;
use crate::issue::{IssueMode, IssueRecord};

/// The canonical task-instance record: exactly these seven fields, no extras
/// (§3 Task Instance, §6 canonical schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstanceRecord {
    pub instance_id: String,
    pub repo: String,
    pub patch: String,
    pub problem_statement: String,
    #[serde(rename = "FAIL_TO_PASS")]
    pub fail_to_pass: Vec<String>,
    #[serde(rename = "PASS_TO_PASS")]
    pub pass_to_pass: Vec<String>,
    pub image_name: String,
}

/// Joins `instances` with `issues` on `instance_id`. An instance with no
/// matching issue is a fatal schema violation unless `mode == Skip`, in which
/// case `problem_statement` is simply empty and any `empty FAIL_TO_PASS`/empty
/// `patch` check below still applies.
pub fn assemble(
    instances: &[GatheredInstance],
    issues: &[IssueRecord],
    mode: IssueMode,
) -> Result<Vec<TaskInstanceRecord>, SmithError> {
    let issues_by_id: HashMap<&str, &IssueRecord> =
        issues.iter().map(|i| (i.instance_id.as_str(), i)).collect();

    let mut records = Vec::with_capacity(instances.len());
    for instance in instances {
        let problem_statement = match issues_by_id.get(instance.instance_id.as_str()) {
            Some(issue) => issue.problem_statement.clone(),
            None if mode == IssueMode::Skip => String::new(),
            None => {
                return Err(SmithError::Schema(format!(
                    "instance `{}` has no problem_statement and issue-mode is not `skip`",
                    instance.instance_id
                )));
            }
        };

        let record = TaskInstanceRecord {
            instance_id: instance.instance_id.clone(),
            repo: instance.repo.clone(),
            patch: instance.patch.clone(),
            problem_statement,
            fail_to_pass: instance.fail_to_pass.clone(),
            pass_to_pass: instance.pass_to_pass.clone(),
            image_name: instance.image_name.clone(),
        };
        validate_record(&record)?;
        records.push(record);
    }
    Ok(records)
}

fn validate_record(record: &TaskInstanceRecord) -> Result<(), SmithError> {
    if record.patch.is_empty() {
        return Err(SmithError::Schema(format!("instance `{}` has an empty patch", record.instance_id)));
    }
    if record.fail_to_pass.is_empty() {
        return Err(SmithError::Schema(format!(
            "instance `{}` has an empty FAIL_TO_PASS",
            record.instance_id
        )));
    }
    let overlap: Vec<&String> = record
        .fail_to_pass
        .iter()
        .filter(|t| record.pass_to_pass.contains(t))
        .collect();
    if !overlap.is_empty() {
        return Err(SmithError::Schema(format!(
            "instance `{}` has tests in both FAIL_TO_PASS and PASS_TO_PASS: {overlap:?}",
            record.instance_id
        )));
    }
    Ok(())
}

/// `logs/agent_datasets/<repo>_final.json` (§4.9, §6).
pub fn write_dataset(records: &[TaskInstanceRecord], workspace: &Path, repo: &str) -> Result<std::path::PathBuf, SmithError> {
    let dir = workspace.join("logs/agent_datasets");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{repo}_final.json"));
    std::fs::write(&path, serde_json::to_vec_pretty(records)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> GatheredInstance {
        GatheredInstance {
            instance_id: "acme__widget.abc1234.lm_modify__abcdef123456".into(),
            repo: "widget".into(),
            patch: "--- a/m.py\n+++ b/m.py\n".into(),
            fail_to_pass: vec!["test_add".into()],
            pass_to_pass: vec!["test_sub".into()],
            image_name: "img".into(),
        }
    }

    fn issue_for(instance: &GatheredInstance) -> IssueRecord {
        IssueRecord {
            instance_id: instance.instance_id.clone(),
            problem_statement: "add is broken".into(),
        }
    }

    #[test]
    fn assemble_joins_on_instance_id() {
        let inst = instance();
        let issue = issue_for(&inst);
        let records = assemble(&[inst], &[issue], IssueMode::Llm).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].problem_statement, "add is broken");
    }

    #[test]
    fn missing_problem_statement_fails_unless_skip_mode() {
        let inst = instance();
        assert!(assemble(&[inst.clone()], &[], IssueMode::Llm).is_err());
        assert!(assemble(&[inst], &[], IssueMode::Skip).is_ok());
    }

    #[test]
    fn overlapping_f2p_p2p_is_schema_violation() {
        let mut inst = instance();
        inst.pass_to_pass.push("test_add".into());
        let issue = issue_for(&inst);
        assert!(assemble(&[inst], &[issue], IssueMode::Llm).is_err());
    }

    #[test]
    fn serializes_with_canonical_field_names() {
        let inst = instance();
        let issue = issue_for(&inst);
        let records = assemble(&[inst], &[issue], IssueMode::Llm).unwrap();
        let json = serde_json::to_string(&records[0]).unwrap();
        assert!(json.contains("\"FAIL_TO_PASS\""));
        assert!(json.contains("\"PASS_TO_PASS\""));
    }
}
