//! Patch Collector (§4.5): walks generator outputs under `logs/bug_gen/<repo>/`
//! and consolidates every candidate into one indexed manifest with a stable,
//! reproducible ordering (§8 S6: two runs over identical inputs must produce a
//! byte-identical manifest).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::errors::SmithError;
use crate::generators::GeneratorMetadata;

/// One consolidated entry in `<repo>_all_patches.json` (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub instance_id_stub: String,
    pub patch: String,
    pub bug_kind: String,
    pub source_entity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatchManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Walks `bug_gen_dir` and builds the manifest. Ordering is lexicographic by
/// relative path, then by hash embedded in the filename — both are stable
/// across runs given identical inputs, satisfying the reproducibility
/// invariant without any run-order dependence.
pub fn collect(bug_gen_dir: &Path) -> Result<PatchManifest, SmithError> {
    let mut diff_paths: Vec<PathBuf> = WalkDir::new(bug_gen_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.extension().is_some_and(|ext| ext == "diff"))
        .collect();
    diff_paths.sort();

    let mut entries = Vec::with_capacity(diff_paths.len());
    for diff_path in diff_paths {
        let patch = std::fs::read_to_string(&diff_path)?;
        let metadata_path = metadata_path_for(&diff_path);
        let metadata: GeneratorMetadata = serde_json::from_str(&std::fs::read_to_string(&metadata_path)?)?;

        let hash = diff_path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit("__").next())
            .unwrap_or("")
            .to_string();

        entries.push(ManifestEntry {
            instance_id_stub: format!("{}__{}", metadata.bug_kind.tag(), hash),
            patch,
            bug_kind: metadata.bug_kind.tag(),
            source_entity: metadata.target_entity.name,
        });
    }

    Ok(PatchManifest { entries })
}

fn metadata_path_for(diff_path: &Path) -> PathBuf {
    let file_name = diff_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let metadata_name = file_name.replacen("bug__", "metadata__", 1);
    diff_path.with_file_name(metadata_name)
}

/// Writes `<repo>_all_patches.json` (§4.5, §6 filesystem layout).
pub fn write_manifest(manifest: &PatchManifest, bug_gen_root: &Path, repo: &str) -> Result<PathBuf, SmithError> {
    let path = bug_gen_root.join(format!("{repo}_all_patches.json"));
    std::fs::write(&path, serde_json::to_vec_pretty(manifest)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{BugKind, CandidatePatch, GeneratorMetadata};
    use std::path::PathBuf as StdPathBuf;

    fn sample_patch(name: &str) -> CandidatePatch {
        CandidatePatch::new(
            format!("--- a/{name}\n+++ b/{name}\n"),
            GeneratorMetadata {
                bug_kind: BugKind::LmModify,
                target_entity: crate::generators::EntityRef {
                    file: StdPathBuf::from(format!("src/{name}.py")),
                    name: name.to_string(),
                },
                prompt: None,
            },
        )
    }

    #[test]
    fn collect_is_order_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_entity", "a_entity"] {
            sample_patch(name).write_to(dir.path()).unwrap();
        }

        let manifest_a = collect(dir.path()).unwrap();
        let manifest_b = collect(dir.path()).unwrap();
        assert_eq!(
            serde_json::to_string(&manifest_a).unwrap(),
            serde_json::to_string(&manifest_b).unwrap()
        );
        assert_eq!(manifest_a.entries.len(), 2);
    }

    #[test]
    fn manifest_entry_hash_matches_patch_hash() {
        let dir = tempfile::tempdir().unwrap();
        let patch = sample_patch("widget");
        patch.write_to(dir.path()).unwrap();

        let manifest = collect(dir.path()).unwrap();
        assert!(manifest.entries[0].instance_id_stub.ends_with(&patch.hash.to_short()));
    }
}
