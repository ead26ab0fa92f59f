//! Procedural bug generator (§4.4.1): a family of AST-directed rewrites, each
//! an (applicability predicate, rewrite) pair over a `CodeEntity`'s source
//! text. Fanned out with `rayon`, stopping once `max_bugs` candidates have
//! been emitted for the run.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::entity::CodeEntity;
use crate::errors::SmithError;
use crate::generators::{unified_diff, BugGenerator, BugKind, CandidatePatch, GeneratorMetadata};

/// One procedural mutation family (§4.4.1 lists the required set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProceduralVariant {
    RemoveConditional,
    InvertBoundary,
    SwapSiblingStatements,
    DropReturnValue,
    OffByOneLoopBound,
    NegateBooleanTest,
    ShuffleBranches,
}

impl ProceduralVariant {
    pub const ALL: [ProceduralVariant; 7] = [
        ProceduralVariant::RemoveConditional,
        ProceduralVariant::InvertBoundary,
        ProceduralVariant::SwapSiblingStatements,
        ProceduralVariant::DropReturnValue,
        ProceduralVariant::OffByOneLoopBound,
        ProceduralVariant::NegateBooleanTest,
        ProceduralVariant::ShuffleBranches,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ProceduralVariant::RemoveConditional => "remove_conditional",
            ProceduralVariant::InvertBoundary => "invert_boundary",
            ProceduralVariant::SwapSiblingStatements => "swap_sibling_statements",
            ProceduralVariant::DropReturnValue => "drop_return_value",
            ProceduralVariant::OffByOneLoopBound => "off_by_one_loop_bound",
            ProceduralVariant::NegateBooleanTest => "negate_boolean_test",
            ProceduralVariant::ShuffleBranches => "shuffle_branches",
        }
    }

    /// Whether this variant's textual pattern is present in `entity`'s source
    /// (§4.4.1 "applicability predicate").
    pub fn applies_to(&self, entity: &CodeEntity) -> bool {
        self.pattern().is_match(&entity.src_code)
    }

    /// Produces the mutated body, or `None` if the rewrite would be a no-op
    /// (byte-identical source is dropped per §8 Boundaries).
    pub fn rewrite(&self, entity: &CodeEntity) -> Option<String> {
        let pattern = self.pattern();
        if !pattern.is_match(&entity.src_code) {
            return None;
        }
        let rewritten = match self {
            ProceduralVariant::RemoveConditional => pattern.replace(&entity.src_code, "").to_string(),
            ProceduralVariant::InvertBoundary => invert_boundary(&entity.src_code, &pattern),
            ProceduralVariant::SwapSiblingStatements => swap_sibling_statements(&entity.src_code),
            ProceduralVariant::DropReturnValue => drop_return_value(&entity.src_code, &pattern),
            ProceduralVariant::OffByOneLoopBound => off_by_one(&entity.src_code, &pattern),
            ProceduralVariant::NegateBooleanTest => negate_boolean(&entity.src_code, &pattern),
            ProceduralVariant::ShuffleBranches => shuffle_branches(&entity.src_code),
        };
        if rewritten == entity.src_code {
            None
        } else {
            Some(rewritten)
        }
    }

    fn pattern(&self) -> Regex {
        let src = match self {
            ProceduralVariant::RemoveConditional => r"(?m)^\s*if\s+.*:\n(?:[ \t]+.*\n)+",
            ProceduralVariant::InvertBoundary => r"[<>]=?",
            ProceduralVariant::SwapSiblingStatements => r"(?m)^.*\n.*$",
            ProceduralVariant::DropReturnValue => r"return\s+.+",
            ProceduralVariant::OffByOneLoopBound => r"range\((\w+)\)",
            ProceduralVariant::NegateBooleanTest => r"\b(True|False)\b",
            ProceduralVariant::ShuffleBranches => r"(?ms)if\s+.+?:\n.+?\nelse:\n.+",
        };
        Regex::new(src).unwrap()
    }
}

fn invert_boundary(src: &str, pattern: &Regex) -> String {
    pattern
        .replace_all(src, |caps: &regex::Captures| {
            match &caps[0] {
                "<" => ">",
                ">" => "<",
                "<=" => ">=",
                ">=" => "<=",
                other => other,
            }
            .to_string()
        })
        .to_string()
}

fn swap_sibling_statements(src: &str) -> String {
    let lines: Vec<&str> = src.lines().collect();
    if lines.len() < 2 {
        return src.to_string();
    }
    let mut swapped = lines;
    swapped.swap(0, 1);
    let mut out = swapped.join("\n");
    if src.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn drop_return_value(src: &str, pattern: &Regex) -> String {
    pattern.replace(src, "return None").to_string()
}

fn off_by_one(src: &str, pattern: &Regex) -> String {
    pattern
        .replace(src, |caps: &regex::Captures| format!("range({} + 1)", &caps[1]))
        .to_string()
}

fn negate_boolean(src: &str, pattern: &Regex) -> String {
    pattern
        .replace(src, |caps: &regex::Captures| {
            match &caps[0] {
                "True" => "False",
                _ => "True",
            }
            .to_string()
        })
        .to_string()
}

fn shuffle_branches(src: &str) -> String {
    if let Some(if_pos) = src.find("if ") {
        if let Some(else_pos) = src.find("\nelse:\n") {
            if else_pos > if_pos {
                let if_block = &src[if_pos..else_pos];
                let else_block = &src[else_pos + "\nelse:\n".len()..];
                return format!(
                    "{}{}{}",
                    &src[..if_pos],
                    format!("if True:\n{else_block}\nelse:\n{if_block}\n"),
                    ""
                );
            }
        }
    }
    src.to_string()
}

pub struct ProceduralGenerator;

impl BugGenerator for ProceduralGenerator {
    fn generate(&self, entities: &[CodeEntity], max_bugs: usize) -> Result<Vec<CandidatePatch>, SmithError> {
        if max_bugs == 0 {
            return Ok(Vec::new());
        }
        let emitted = AtomicUsize::new(0);
        let pairs: Vec<(&CodeEntity, ProceduralVariant)> = entities
            .iter()
            .flat_map(|e| ProceduralVariant::ALL.iter().map(move |v| (e, *v)))
            .collect();

        let patches: Vec<CandidatePatch> = pairs
            .into_par_iter()
            .filter_map(|(entity, variant)| {
                if emitted.load(Ordering::Relaxed) >= max_bugs {
                    return None;
                }
                if !variant.applies_to(entity) {
                    return None;
                }
                let after = variant.rewrite(entity)?;
                let spliced = entity.splice(&entity.file_contents, &after);
                let diff = unified_diff(&entity.file.to_string_lossy(), &entity.file_contents, &spliced);
                if diff.is_empty() {
                    return None;
                }
                if emitted.fetch_add(1, Ordering::Relaxed) >= max_bugs {
                    return None;
                }
                Some(CandidatePatch::new(
                    diff,
                    GeneratorMetadata {
                        bug_kind: BugKind::Procedural(variant),
                        target_entity: entity.into(),
                        prompt: None,
                    },
                ))
            })
            .collect();
        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::entity::EntityKind;

    fn entity(src: &str) -> CodeEntity {
        CodeEntity {
            file: PathBuf::from("m.py"),
            lo: 0,
            hi: src.len(),
            kind: EntityKind::Function,
            name: "add".to_string(),
            src_code: src.to_string(),
            file_contents: std::sync::Arc::from(src),
        }
    }

    #[test]
    fn negate_boolean_flips_literal() {
        let e = entity("def f():\n    return True\n");
        let rewritten = ProceduralVariant::NegateBooleanTest.rewrite(&e).unwrap();
        assert!(rewritten.contains("False"));
    }

    #[test]
    fn off_by_one_adjusts_range_bound() {
        let e = entity("def f(n):\n    for i in range(n):\n        pass\n");
        let rewritten = ProceduralVariant::OffByOneLoopBound.rewrite(&e).unwrap();
        assert!(rewritten.contains("range(n + 1)"));
    }

    #[test]
    fn no_op_rewrite_returns_none() {
        let e = entity("def f():\n    pass\n");
        assert!(ProceduralVariant::NegateBooleanTest.rewrite(&e).is_none());
    }

    #[test]
    fn generator_respects_max_bugs_zero() {
        let e = entity("def f():\n    return True\n");
        let patches = ProceduralGenerator.generate(&[e], 0).unwrap();
        assert!(patches.is_empty());
    }

    #[test]
    fn generator_emits_at_most_max_bugs() {
        let entities: Vec<CodeEntity> = (0..5)
            .map(|i| {
                let mut e = entity("def f():\n    return True\n");
                e.name = format!("f{i}");
                e
            })
            .collect();
        let patches = ProceduralGenerator.generate(&entities, 2).unwrap();
        assert!(patches.len() <= 2);
    }
}
