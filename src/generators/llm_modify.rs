//! LM-Modify bug generator (§4.4.2): asks the LLM to modify one entity's body
//! in place, then verifies the response can't change the signature, imports,
//! or surrounding code before accepting it as a candidate.

use regex::Regex;

use crate::entity::CodeEntity;
use crate::errors::SmithError;
use crate::generators::{unified_diff, BugGenerator, BugKind, CandidatePatch, GeneratorMetadata};
use crate::llm::LlmClient;

const SYSTEM_PROMPT: &str = "You modify the body of a single function to introduce a subtle, \
realistic bug. Do not change the function's signature, its declared types, its imports, or any \
surrounding code. Reply with only the new function body.";

pub struct LmModifyGenerator<'a> {
    pub client: &'a LlmClient,
}

impl BugGenerator for LmModifyGenerator<'_> {
    fn generate(&self, entities: &[CodeEntity], max_bugs: usize) -> Result<Vec<CandidatePatch>, SmithError> {
        let mut out = Vec::new();
        for entity in entities.iter().take(max_bugs) {
            let prompt = format!("Entity `{}`:\n```\n{}\n```", entity.name, entity.src_code);
            let response = self.client.complete(SYSTEM_PROMPT, &prompt)?;
            let Some(candidate) = accept_or_reject(entity, &response, BugKind::LmModify, prompt)? else {
                continue;
            };
            out.push(candidate);
        }
        Ok(out)
    }
}

/// Shared post-condition gate for LM-Modify and LM-Rewrite (§4.4.2, §4.4.3):
/// reject a response that changes the signature, fails to look parseable, or
/// differs only in whitespace from the original.
pub(crate) fn accept_or_reject(
    entity: &CodeEntity,
    response: &str,
    bug_kind: BugKind,
    prompt: String,
) -> Result<Option<CandidatePatch>, SmithError> {
    let new_body = strip_code_fence(response);

    if signature_changed(&entity.src_code, &new_body) {
        return Ok(None);
    }
    if whitespace_only_diff(&entity.src_code, &new_body) {
        return Ok(None);
    }

    let spliced = entity.splice(&entity.file_contents, &new_body);
    let diff = unified_diff(&entity.file.to_string_lossy(), &entity.file_contents, &spliced);
    if diff.is_empty() {
        return Ok(None);
    }

    Ok(Some(CandidatePatch::new(
        diff,
        GeneratorMetadata {
            bug_kind,
            target_entity: entity.into(),
            prompt: Some(prompt),
        },
    )))
}

fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.trim_start_matches(|c: char| c.is_alphanumeric());
    let rest = rest.trim_start_matches('\n');
    rest.trim_end().trim_end_matches("```").trim_end().to_string()
}

fn signature_line(src: &str) -> Option<&str> {
    let re = Regex::new(r"^\s*(?:def|function|class)\s+\S+\s*\(?.*$").ok()?;
    src.lines().find(|l| re.is_match(l))
}

fn signature_changed(before: &str, after: &str) -> bool {
    match (signature_line(before), signature_line(after)) {
        (Some(a), Some(b)) => a.trim() != b.trim(),
        (None, None) => false,
        _ => true,
    }
}

fn whitespace_only_diff(before: &str, after: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    before != after && normalize(before) == normalize(after)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::entity::EntityKind;

    fn entity() -> CodeEntity {
        let src_code = "def add(a, b):\n    return a + b\n".to_string();
        CodeEntity {
            file: PathBuf::from("m.py"),
            lo: 0,
            hi: src_code.len(),
            kind: EntityKind::Function,
            name: "add".to_string(),
            file_contents: std::sync::Arc::from(src_code.as_str()),
            src_code,
        }
    }

    #[test]
    fn rejects_signature_change() {
        let e = entity();
        let response = "def add(a, b, c):\n    return a + b\n";
        let result = accept_or_reject(&e, response, BugKind::LmModify, "p".into()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn rejects_whitespace_only_change() {
        let e = entity();
        let response = "def add(a, b):\n    return   a + b\n";
        let result = accept_or_reject(&e, response, BugKind::LmModify, "p".into()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn accepts_genuine_behavioral_change() {
        let e = entity();
        let response = "def add(a, b):\n    return a - b\n";
        let result = accept_or_reject(&e, response, BugKind::LmModify, "p".into()).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn strips_markdown_code_fence() {
        let stripped = strip_code_fence("```python\ndef add(a, b):\n    return a - b\n```");
        assert_eq!(stripped, "def add(a, b):\n    return a - b");
    }
}
