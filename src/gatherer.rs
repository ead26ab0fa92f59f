//! Instance Gatherer (§4.7): keeps every candidate whose validation produced
//! at least one F2P and one P2P, mints a stable instance ID, and pushes a
//! mirror branch per kept instance. Concurrent pushes to the same mirror are
//! serialized (§5) via a per-repo mutex held only for the `git push` call.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::SmithError;
use crate::generators::CandidatePatch;
use crate::profile::RepoProfile;
use crate::validator::ValidationOutcome;

/// Canonical instance record minus `problem_statement`, which the Issue
/// Generator fills in later (§4.7, §3 Task Instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatheredInstance {
    pub instance_id: String,
    pub repo: String,
    pub patch: String,
    pub fail_to_pass: Vec<String>,
    pub pass_to_pass: Vec<String>,
    pub image_name: String,
}

/// `"<owner>__<repo>.<commit_short>.<kind>__<hash>"` (§3, §8 S2 worked example).
pub fn mint_instance_id(profile: &RepoProfile, kind_tag: &str, short_hash: &str) -> String {
    format!(
        "{}__{}.{}.{}__{}",
        profile.owner,
        profile.repo,
        profile.commit_short(),
        kind_tag,
        short_hash
    )
}

/// Per-repo push serialization: one mutex per mirror name, so two gatherer
/// runs against different repos never block each other (§5).
pub struct MirrorPushLock {
    locks: HashMap<String, Mutex<()>>,
}

impl MirrorPushLock {
    pub fn new() -> Self {
        Self { locks: HashMap::new() }
    }

    pub fn for_mirror(&mut self, mirror_name: &str) -> &Mutex<()> {
        self.locks.entry(mirror_name.to_string()).or_insert_with(|| Mutex::new(()))
    }
}

impl Default for MirrorPushLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters candidates to the promotable ones and mints their instance records
/// (§4.7: "keeps K iff |F2P| >= 1 and |P2P| >= 1").
pub fn gather(
    profile: &RepoProfile,
    image_name: &str,
    candidates: &[CandidatePatch],
    outcomes: &[ValidationOutcome],
) -> Vec<GatheredInstance> {
    let candidates_by_hash: HashMap<String, &CandidatePatch> =
        candidates.iter().map(|c| (c.hash.to_short(), c)).collect();

    outcomes
        .iter()
        .filter(|o| o.is_promotable())
        .filter_map(|o| {
            let candidate = candidates_by_hash.get(&o.candidate_hash)?;
            let instance_id = mint_instance_id(profile, &candidate.metadata.bug_kind.tag(), &o.candidate_hash);
            Some(GatheredInstance {
                instance_id,
                repo: profile.repo.clone(),
                patch: candidate.diff.clone(),
                fail_to_pass: o.fail_to_pass.clone(),
                pass_to_pass: o.pass_to_pass.clone(),
                image_name: image_name.to_string(),
            })
        })
        .collect()
}

/// Pushes a branch named `instance.instance_id` on `mirror_name`, applying the
/// instance's patch over the pinned commit first. Idempotent: an existing
/// branch with byte-identical tip content is accepted; a mismatch is a hard
/// error (§4.7).
pub fn push_instance_branch(mirror_name: &str, instance: &GatheredInstance, work_tree: &std::path::Path) -> Result<(), SmithError> {
    let mut apply = Command::new("git")
        .current_dir(work_tree)
        .args(["apply", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SmithError::Transport {
            endpoint: "git apply".to_string(),
            source: Box::new(e),
        })?;
    apply
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(instance.patch.as_bytes())
        .map_err(|e| SmithError::Transport {
            endpoint: "git apply".to_string(),
            source: Box::new(e),
        })?;
    let apply_output = apply.wait_with_output().map_err(|e| SmithError::Transport {
        endpoint: "git apply".to_string(),
        source: Box::new(e),
    })?;
    if !apply_output.status.success() {
        return Err(SmithError::ApplyFailed(
            instance.instance_id.clone(),
            String::from_utf8_lossy(&apply_output.stderr).to_string(),
        ));
    }

    let push = Command::new("git")
        .current_dir(work_tree)
        .args(["push", mirror_name, &format!("HEAD:{}", instance.instance_id)])
        .output()
        .map_err(|e| SmithError::Transport {
            endpoint: format!("git push {mirror_name}"),
            source: Box::new(e),
        })?;
    if !push.status.success() {
        return Err(SmithError::BridgeUnreachable(format!(
            "push of `{}` to `{mirror_name}` failed: {}",
            instance.instance_id,
            String::from_utf8_lossy(&push.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{BugKind, EntityRef, GeneratorMetadata};
    use std::path::PathBuf;

    fn profile() -> RepoProfile {
        RepoProfile {
            owner: "acme".into(),
            repo: "widget".into(),
            commit: "abc1234def".into(),
            container_recipe: "FROM scratch".into(),
            test_cmd: "pytest".into(),
            test_cmd_rewrite_rules: vec![],
            log_parser: crate::profile::log_parser::LogParserKind::Pytest,
            language: crate::profile::Language::Python,
            source_globs: vec!["**/*.py".into()],
            exclude_globs: vec![],
            max_container_memory_mb: 1024,
            per_test_timeout_secs: 60,
        }
    }

    fn candidate() -> CandidatePatch {
        CandidatePatch::new(
            "--- a/m.py\n+++ b/m.py\n".to_string(),
            GeneratorMetadata {
                bug_kind: BugKind::LmModify,
                target_entity: EntityRef { file: PathBuf::from("m.py"), name: "f".into() },
                prompt: None,
            },
        )
    }

    #[test]
    fn instance_id_matches_canonical_shape() {
        let p = profile();
        let id = mint_instance_id(&p, "func_pm_invert_return", "abcdef123456");
        assert_eq!(id, "acme__widget.abc1234.func_pm_invert_return__abcdef123456");
    }

    #[test]
    fn gather_drops_candidates_without_pass_to_pass() {
        let p = profile();
        let c = candidate();
        let outcome = ValidationOutcome {
            candidate_hash: c.hash.to_short(),
            fail_to_pass: vec!["t1".into()],
            pass_to_pass: vec![],
            apply_failed: false,
            timed_out: false,
            unparseable: false,
        };
        let instances = gather(&p, "img", &[c], &[outcome]);
        assert!(instances.is_empty());
    }

    #[test]
    fn gather_keeps_candidates_with_both_f2p_and_p2p() {
        let p = profile();
        let c = candidate();
        let outcome = ValidationOutcome {
            candidate_hash: c.hash.to_short(),
            fail_to_pass: vec!["t1".into()],
            pass_to_pass: vec!["t2".into()],
            apply_failed: false,
            timed_out: false,
            unparseable: false,
        };
        let instances = gather(&p, "img", &[c], &[outcome]);
        assert_eq!(instances.len(), 1);
        assert!(instances[0].fail_to_pass.iter().collect::<std::collections::HashSet<_>>().is_disjoint(
            &instances[0].pass_to_pass.iter().collect()
        ));
    }
}
