//! Bug Generators (§4.4): three complementary producers of candidate defect
//! patches, all landing `(bug__<kind>__<hash>.diff, metadata__<kind>__<hash>.json)`
//! pairs under `logs/bug_gen/<repo>/<file>/<entity>/` (§6 filesystem layout).

pub mod llm_modify;
pub mod llm_rewrite;
pub mod procedural;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entity::CodeEntity;
use crate::errors::SmithError;
use crate::hash::PatchHash;

/// Which generator produced a candidate, and which procedural variant if any
/// (§3 Candidate Patch `bug_kind`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugKind {
    Procedural(procedural::ProceduralVariant),
    LmModify,
    LmRewrite,
}

impl BugKind {
    /// The `<kind>` token used in `bug__<kind>__<hash>.diff` (§4.4).
    pub fn tag(&self) -> String {
        match self {
            BugKind::Procedural(variant) => format!("func_pm_{}", variant.tag()),
            BugKind::LmModify => "lm_modify".to_string(),
            BugKind::LmRewrite => "lm_rewrite".to_string(),
        }
    }
}

/// A reference to the entity a candidate patch targets, retained in metadata
/// even after the in-memory `CodeEntity` is gone (entities are never persisted
/// — §3 Lifecycles).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub file: PathBuf,
    pub name: String,
}

impl From<&CodeEntity> for EntityRef {
    fn from(e: &CodeEntity) -> Self {
        Self {
            file: e.file.clone(),
            name: e.name.clone(),
        }
    }
}

/// Free-form generator provenance, serialized alongside the diff (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorMetadata {
    pub bug_kind: BugKind,
    pub target_entity: EntityRef,
    pub prompt: Option<String>,
}

/// A unified diff over the clean tree plus metadata (§3 Candidate Patch).
/// Invariant: `hash == PatchHash::compute(diff.as_bytes())`.
#[derive(Debug, Clone)]
pub struct CandidatePatch {
    pub hash: PatchHash,
    pub diff: String,
    pub metadata: GeneratorMetadata,
}

impl CandidatePatch {
    pub fn new(diff: String, metadata: GeneratorMetadata) -> Self {
        let hash = PatchHash::compute(diff.as_bytes());
        Self { hash, diff, metadata }
    }

    /// `bug__<kind>__<hash>.diff` (§4.4).
    pub fn diff_filename(&self) -> String {
        format!("bug__{}__{}.diff", self.metadata.bug_kind.tag(), self.hash.to_short())
    }

    /// `metadata__<kind>__<hash>.json` (§4.4).
    pub fn metadata_filename(&self) -> String {
        format!("metadata__{}__{}.json", self.metadata.bug_kind.tag(), self.hash.to_short())
    }

    /// Writes the diff/metadata pair under `dir/<file>/<entity>/` (§6 layout).
    pub fn write_to(&self, bug_gen_dir: &Path) -> Result<(), SmithError> {
        let entity_dir = bug_gen_dir
            .join(&self.metadata.target_entity.file)
            .join(sanitize_name(&self.metadata.target_entity.name));
        std::fs::create_dir_all(&entity_dir)?;
        std::fs::write(entity_dir.join(self.diff_filename()), &self.diff)?;
        std::fs::write(
            entity_dir.join(self.metadata_filename()),
            serde_json::to_vec_pretty(&self.metadata)?,
        )?;
        Ok(())
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Shared contract every bug generator implements (§4.4).
pub trait BugGenerator {
    fn generate(&self, entities: &[CodeEntity], max_bugs: usize) -> Result<Vec<CandidatePatch>, SmithError>;
}

/// Builds a unified diff of `file_path` between `before` and `after` using the
/// `similar` crate.
pub fn unified_diff(file_path: &str, before: &str, after: &str) -> String {
    similar::TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{file_path}"), &format!("b/{file_path}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> GeneratorMetadata {
        GeneratorMetadata {
            bug_kind: BugKind::LmModify,
            target_entity: EntityRef {
                file: PathBuf::from("src/m.py"),
                name: "add".to_string(),
            },
            prompt: None,
        }
    }

    #[test]
    fn candidate_hash_matches_diff_bytes() {
        let patch = CandidatePatch::new("--- a\n+++ b\n".to_string(), sample_metadata());
        assert_eq!(patch.hash, PatchHash::compute(patch.diff.as_bytes()));
    }

    #[test]
    fn filename_embeds_kind_and_short_hash() {
        let patch = CandidatePatch::new("diff content".to_string(), sample_metadata());
        assert!(patch.diff_filename().starts_with("bug__lm_modify__"));
        assert!(patch.diff_filename().ends_with(".diff"));
    }

    #[test]
    fn unified_diff_is_empty_for_identical_text() {
        let diff = unified_diff("a.py", "same\n", "same\n");
        assert!(diff.is_empty());
    }
}
