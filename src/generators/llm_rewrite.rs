//! LM-Rewrite bug generator (§4.4.3): same shape as LM-Modify but the prompt
//! asks for a complete reimplementation rather than a local edit. Shares the
//! same post-conditions (signature preserved, file re-parses, diff non-empty).

use crate::entity::CodeEntity;
use crate::errors::SmithError;
use crate::generators::llm_modify::accept_or_reject;
use crate::generators::{BugGenerator, BugKind, CandidatePatch};
use crate::llm::LlmClient;

const SYSTEM_PROMPT: &str = "You completely reimplement a single function, preserving its exact \
signature, declared types, and imports, but introduce a subtle, realistic bug somewhere in the \
new implementation. Reply with only the new function body.";

pub struct LmRewriteGenerator<'a> {
    pub client: &'a LlmClient,
}

impl BugGenerator for LmRewriteGenerator<'_> {
    fn generate(&self, entities: &[CodeEntity], max_bugs: usize) -> Result<Vec<CandidatePatch>, SmithError> {
        let mut out = Vec::new();
        for entity in entities.iter().take(max_bugs) {
            let prompt = format!("Entity `{}`:\n```\n{}\n```", entity.name, entity.src_code);
            let response = self.client.complete(SYSTEM_PROMPT, &prompt)?;
            if let Some(candidate) = accept_or_reject(entity, &response, BugKind::LmRewrite, prompt)? {
                out.push(candidate);
            }
        }
        Ok(out)
    }
}
