//! Trajectory / SFT Distiller (§4.10): re-validates each agent trajectory's
//! proposed patch against the gold tree, classifies it resolved or not, and
//! serializes resolved (or all) trajectories as one JSON line per instance in
//! the chosen tool-call dialect.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SmithError;
use crate::profile::RepoProfile;
use crate::validator::container::ContainerRuntime;
use crate::validator::TestReport;

/// One message in an agent transcript (§3 Trajectory Record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Agent transcript for one instance: ordered messages + a final proposed
/// patch (§3 Trajectory Record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub instance_id: String,
    pub messages: Vec<Message>,
    pub model_patch: String,
}

/// A distilled, resolution-tagged record (§4.10 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub instance_id: String,
    pub messages: Vec<Message>,
    pub model_patch: String,
    pub resolved: bool,
}

/// Which tool-call convention to serialize messages in (§4.10 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    FunctionCall,
    XmlTagged,
}

/// Re-validates `trajectory`'s proposed patch against `gold` inside a fresh
/// container: resolved iff every `fail_to_pass` test now passes and every
/// `pass_to_pass` test still passes (§4.10 step 1-2).
pub fn distill_one(
    runtime: &dyn ContainerRuntime,
    profile: &RepoProfile,
    image_name: &str,
    _gold: &TestReport,
    fail_to_pass: &[String],
    pass_to_pass: &[String],
    trajectory: &Trajectory,
) -> Result<TrajectoryRecord, SmithError> {
    use crate::profile::log_parser::TestOutcome;

    let applied = runtime.apply_patch(image_name, &trajectory.model_patch);
    let resolved = if applied.is_err() {
        false
    } else {
        match runtime.run(image_name, &profile.effective_test_cmd(), profile.per_test_timeout_secs) {
            Ok(output) => {
                let report_outcomes = profile.parse_log(&output.stdout);
                let all_pass = |names: &[String]| {
                    names.iter().all(|t| matches!(report_outcomes.get(t), Some(TestOutcome::Pass)))
                };
                all_pass(fail_to_pass) && all_pass(pass_to_pass)
            }
            Err(_) => false,
        }
    };

    Ok(TrajectoryRecord {
        instance_id: trajectory.instance_id.clone(),
        messages: trajectory.messages.clone(),
        model_patch: trajectory.model_patch.clone(),
        resolved,
    })
}

/// Filters to resolved-only records when requested (§4.10 step 4).
pub fn filter_resolved(records: Vec<TrajectoryRecord>, resolved_only: bool) -> Vec<TrajectoryRecord> {
    if resolved_only {
        records.into_iter().filter(|r| r.resolved).collect()
    } else {
        records
    }
}

/// Serializes one record per line in the chosen dialect (§4.10 step 5).
/// Length/tokenizer-budget enforcement is deliberately not performed here —
/// upstream truncates at training time, and this boundary is preserved.
pub fn write_jsonl(records: &[TrajectoryRecord], dialect: Dialect, path: &Path) -> Result<(), SmithError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    for record in records {
        let value = match dialect {
            Dialect::FunctionCall => function_call_dialect(record),
            Dialect::XmlTagged => xml_tagged_dialect(record),
        };
        writeln!(file, "{}", serde_json::to_string(&value)?)?;
    }
    Ok(())
}

fn function_call_dialect(record: &TrajectoryRecord) -> Value {
    serde_json::json!({
        "instance_id": record.instance_id,
        "messages": record.messages,
        "model_patch": record.model_patch,
        "resolved": record.resolved,
    })
}

fn xml_tagged_dialect(record: &TrajectoryRecord) -> Value {
    let tagged: Vec<Value> = record
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": format!("<message>{}</message>", m.content),
            })
        })
        .collect();
    serde_json::json!({
        "instance_id": record.instance_id,
        "messages": tagged,
        "model_patch": format!("<patch>{}</patch>", record.model_patch),
        "resolved": record.resolved,
    })
}

/// Distribution summary over a batch of distilled records, reported instead
/// of enforcing a length cutoff (§4.10 "Length policy").
pub fn resolution_summary(records: &[TrajectoryRecord]) -> (usize, usize) {
    let resolved = records.iter().filter(|r| r.resolved).count();
    (resolved, records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_resolved_keeps_only_resolved_records() {
        let records = vec![
            TrajectoryRecord { instance_id: "a".into(), messages: vec![], model_patch: "p".into(), resolved: true },
            TrajectoryRecord { instance_id: "b".into(), messages: vec![], model_patch: "p".into(), resolved: false },
        ];
        let filtered = filter_resolved(records, true);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].instance_id, "a");
    }

    #[test]
    fn resolution_summary_counts_resolved_out_of_total() {
        let records: Vec<TrajectoryRecord> = (0..100)
            .map(|i| TrajectoryRecord {
                instance_id: format!("inst-{i}"),
                messages: vec![],
                model_patch: "p".into(),
                resolved: i < 37,
            })
            .collect();
        assert_eq!(resolution_summary(&records), (37, 100));
    }

    #[test]
    fn jsonl_has_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let records = vec![
            TrajectoryRecord { instance_id: "a".into(), messages: vec![], model_patch: "p".into(), resolved: true },
            TrajectoryRecord { instance_id: "b".into(), messages: vec![], model_patch: "p".into(), resolved: true },
        ];
        write_jsonl(&records, Dialect::FunctionCall, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn xml_dialect_wraps_patch_in_tags() {
        let records = vec![TrajectoryRecord {
            instance_id: "a".into(),
            messages: vec![],
            model_patch: "diff content".into(),
            resolved: true,
        }];
        let value = xml_tagged_dialect(&records[0]);
        assert_eq!(value["model_patch"], "<patch>diff content</patch>");
    }
}
