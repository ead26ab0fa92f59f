//! Repo Profile Registry (§4.1): the immutable, per-repository descriptor every
//! other stage consults. A profile is identified by `(owner, repo, commit)`; two
//! profiles agreeing on that triple must agree on every attribute below.

pub mod log_parser;

use std::path::PathBuf;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::SmithError;
use crate::profile::log_parser::{LogParserKind, TestOutcome};

/// Language tag selecting the `LanguageAdapter` variant (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    JavaScript,
}

/// One rewrite rule for `effective_test_cmd()`: segments of a `&&`-joined shell
/// command matching `pattern` are dropped entirely (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCmdRewriteRule {
    pub pattern: String,
}

/// Immutable per-repository descriptor (§3 Repository Profile).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoProfile {
    pub owner: String,
    pub repo: String,
    pub commit: String,
    pub container_recipe: String,
    pub test_cmd: String,
    #[serde(default)]
    pub test_cmd_rewrite_rules: Vec<TestCmdRewriteRule>,
    pub log_parser: LogParserKind,
    pub language: Language,
    pub source_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_container_memory_mb")]
    pub max_container_memory_mb: u64,
    #[serde(default = "default_per_test_timeout_secs")]
    pub per_test_timeout_secs: u64,
}

fn default_max_container_memory_mb() -> u64 {
    4096
}

fn default_per_test_timeout_secs() -> u64 {
    300
}

impl RepoProfile {
    /// Loads one or more profiles from a TOML document. A document with a
    /// top-level `[[profile]]` array describes a batch; a single `[profile]`
    /// table (or bare document) describes one. Any missing required field or
    /// malformed document is a `Configuration`/`InvalidProfile` error — profiles
    /// never partially load (§4.1).
    pub fn load_all(text: &str) -> Result<Vec<RepoProfile>, SmithError> {
        #[derive(Deserialize)]
        struct Batch {
            #[serde(default)]
            profile: Vec<RepoProfile>,
        }

        if let Ok(batch) = toml::from_str::<Batch>(text) {
            if !batch.profile.is_empty() {
                for p in &batch.profile {
                    p.validate()?;
                }
                return Ok(batch.profile);
            }
        }
        let single: RepoProfile = toml::from_str(text)?;
        single.validate()?;
        Ok(vec![single])
    }

    fn validate(&self) -> Result<(), SmithError> {
        if self.owner.is_empty() || self.repo.is_empty() || self.commit.is_empty() {
            return Err(SmithError::InvalidProfile(
                self.repo.clone(),
                "owner, repo, and commit must all be non-empty".into(),
            ));
        }
        if self.test_cmd.trim().is_empty() {
            return Err(SmithError::InvalidProfile(
                self.repo.clone(),
                "test_cmd must invoke the test runner directly".into(),
            ));
        }
        if self.source_globs.is_empty() {
            return Err(SmithError::InvalidProfile(
                self.repo.clone(),
                "source_globs must name at least one glob".into(),
            ));
        }
        Ok(())
    }

    pub fn container_recipe(&self) -> &str {
        &self.container_recipe
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn commit_short(&self) -> &str {
        &self.commit[..self.commit.len().min(7)]
    }

    /// Strips non-test steps (lint, type-check, doc build) out of a `&&`-joined
    /// test command, per the repo's rewrite rules (§4.1).
    pub fn effective_test_cmd(&self) -> String {
        if self.test_cmd_rewrite_rules.is_empty() {
            return self.test_cmd.clone();
        }
        let patterns: Vec<Regex> = self
            .test_cmd_rewrite_rules
            .iter()
            .filter_map(|r| Regex::new(&r.pattern).ok())
            .collect();
        let kept: Vec<&str> = self
            .test_cmd
            .split("&&")
            .map(str::trim)
            .filter(|segment| !patterns.iter().any(|re| re.is_match(segment)))
            .collect();
        kept.join(" && ")
    }

    pub fn parse_log(&self, text: &str) -> std::collections::BTreeMap<String, TestOutcome> {
        self.log_parser.parse(text)
    }

    fn globset_for(&self, patterns: &[String]) -> Result<GlobSet, SmithError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| SmithError::InvalidProfile(self.repo.clone(), e.to_string()))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| SmithError::InvalidProfile(self.repo.clone(), e.to_string()))
    }

    pub fn source_globset(&self) -> Result<GlobSet, SmithError> {
        self.globset_for(&self.source_globs)
    }

    pub fn exclude_globset(&self) -> Result<GlobSet, SmithError> {
        self.globset_for(&self.exclude_globs)
    }

    /// `<dh_org>/swesmith.<arch>.<owner>_1776_<repo>.<commit_short>` (§4.1, §6).
    /// `1776` is a literal separator token chosen to avoid collisions with
    /// repo names that already contain underscores.
    pub fn image_name(&self, dh_org: &str, arch: &str) -> String {
        format!(
            "{dh_org}/swesmith.{arch}.{}_1776_{}.{}",
            self.owner,
            self.repo,
            self.commit_short()
        )
    }

    /// `<gh_org>/<owner>__<repo>.<commit_short>` (§4.1, §6).
    pub fn mirror_name(&self, gh_org: &str) -> String {
        format!("{gh_org}/{}__{}.{}", self.owner, self.repo, self.commit_short())
    }

    pub fn bug_gen_dir(&self, workspace: &PathBuf) -> PathBuf {
        workspace.join("logs/bug_gen").join(&self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            owner = "acme"
            repo = "widget"
            commit = "abc1234def5678"
            container_recipe = "FROM python:3.11"
            test_cmd = "npm run lint && npm test && npm run build"
            log_parser = "pytest"
            language = "python"
            source_globs = ["src/**/*.py"]
            exclude_globs = ["**/test_*.py"]

            [[test_cmd_rewrite_rules]]
            pattern = "^npm run lint$"

            [[test_cmd_rewrite_rules]]
            pattern = "^npm run build$"
        "#
    }

    #[test]
    fn loads_single_profile() {
        let profiles = RepoProfile::load_all(sample_toml()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].owner, "acme");
    }

    #[test]
    fn effective_test_cmd_strips_non_test_segments() {
        let profiles = RepoProfile::load_all(sample_toml()).unwrap();
        assert_eq!(profiles[0].effective_test_cmd(), "npm test");
    }

    #[test]
    fn image_and_mirror_names_are_deterministic() {
        let profiles = RepoProfile::load_all(sample_toml()).unwrap();
        let p = &profiles[0];
        assert_eq!(p.image_name("dhorg", "amd64"), "dhorg/swesmith.amd64.acme_1776_widget.abc1234");
        assert_eq!(p.mirror_name("ghorg"), "ghorg/acme__widget.abc1234");
    }

    #[test]
    fn empty_test_cmd_is_rejected() {
        let bad = sample_toml().replace(
            r#"test_cmd = "npm run lint && npm test && npm run build""#,
            r#"test_cmd = "   ""#,
        );
        assert!(RepoProfile::load_all(&bad).is_err());
    }
}
