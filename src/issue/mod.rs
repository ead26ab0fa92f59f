//! Issue Generator (§4.8): produces a natural-language problem statement for
//! an instance from its diff and failing-test signal, without revealing the
//! fix. Prompt shape for the `llm` mode is grounded on the retrieved pack's
//! SWE-bench scenario tooling (hint/test/constraint sections, "MINIMAL
//! CHANGES" / "NEVER MODIFY TEST FILES" framing).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::SmithError;
use crate::gatherer::GatheredInstance;
use crate::llm::LlmClient;

/// Which strategy produces the problem statement (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueMode {
    Llm,
    Static,
    Tests,
    Pr,
    Skip,
}

/// `{instance_id, problem_statement}` (§4.8, §6 filesystem layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub instance_id: String,
    pub problem_statement: String,
}

const SYSTEM_PROMPT: &str = "You write a realistic bug-report issue for the software repository \
described below. Base it only on the failing tests and the surrounding context. Do not reveal \
the fix, the diff, or any code that would give away the patch. Keep it concise and in the voice \
of a real reporter.";

pub fn generate(
    instance: &GatheredInstance,
    mode: IssueMode,
    llm: Option<&LlmClient>,
) -> Result<Option<IssueRecord>, SmithError> {
    let problem_statement = match mode {
        IssueMode::Skip => return Ok(None),
        IssueMode::Static => static_template(instance),
        IssueMode::Tests => tests_template(instance),
        IssueMode::Pr => static_template(instance), // PR-mirror text falls back to the diff-derived template when no PR data is available.
        IssueMode::Llm => {
            let client = llm.ok_or_else(|| SmithError::Configuration("issue-mode=llm requires an LLM client".into()))?;
            let prompt = llm_prompt(instance);
            client.complete(SYSTEM_PROMPT, &prompt)?
        }
    };

    Ok(Some(IssueRecord {
        instance_id: instance.instance_id.clone(),
        problem_statement,
    }))
}

fn llm_prompt(instance: &GatheredInstance) -> String {
    format!(
        "Repository: {}\n\nFailing tests after the change:\n{}\n\nDiff (for your analysis only, \
         never quote it in the issue):\n```diff\n{}\n```\n\nWrite the issue now. MINIMAL CHANGES \
         should be implied, never stated explicitly; NEVER reference test file names directly.",
        instance.repo,
        instance.fail_to_pass.join("\n"),
        instance.patch
    )
}

fn static_template(instance: &GatheredInstance) -> String {
    format!(
        "A regression was introduced in `{}`. The following behavior is broken:\n{}",
        instance.repo,
        instance.fail_to_pass.join("\n")
    )
}

fn tests_template(instance: &GatheredInstance) -> String {
    format!(
        "The following tests are failing and need to be fixed:\n{}",
        instance
            .fail_to_pass
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

/// `logs/issue_gen/<repo>__<exp>_n1.json` (§4.8, §6). A mode that writes to a
/// legacy location is rehomed here and the rehoming is logged: the upstream
/// cause of the legacy path is unclear, so we only document and log the
/// rehoming rule rather than guess at the cause.
pub fn canonical_issue_path(workspace: &Path, repo: &str, experiment: &str) -> PathBuf {
    workspace.join("logs/issue_gen").join(format!("{repo}__{experiment}_n1.json"))
}

/// Rehomes a legacy `logs/task_insts/<repo>.json` issue file to the canonical
/// location if one exists there instead, logging when it fires.
pub fn rehome_if_legacy(workspace: &Path, repo: &str, experiment: &str) -> Result<bool, SmithError> {
    let legacy = workspace.join("logs/task_insts").join(format!("{repo}.json"));
    let canonical = canonical_issue_path(workspace, repo, experiment);
    if legacy.exists() && !canonical.exists() {
        if let Some(parent) = canonical.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&legacy, &canonical)?;
        tracing::warn!(repo, from = %legacy.display(), to = %canonical.display(), "rehomed legacy issue output path");
        return Ok(true);
    }
    Ok(false)
}

pub fn write_records(records: &[IssueRecord], path: &Path) -> Result<(), SmithError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(records)?)?;
    Ok(())
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

    #[test]
    fn skip_mode_emits_nothing() {
        assert!(generate(&instance(), IssueMode::Skip, None).unwrap().is_none());
    }

    #[test]
    fn static_mode_never_requires_llm() {
        let record = generate(&instance(), IssueMode::Static, None).unwrap().unwrap();
        assert!(record.problem_statement.contains("widget"));
    }

    #[test]
    fn llm_mode_without_client_is_configuration_error() {
        let result = generate(&instance(), IssueMode::Llm, None);
        assert!(result.is_err());
    }

    #[test]
    fn canonical_path_matches_layout() {
        let path = canonical_issue_path(Path::new("/ws"), "widget", "exp1");
        assert_eq!(path, PathBuf::from("/ws/logs/issue_gen/widget__exp1_n1.json"));
    }
}
