//! JavaScript/TypeScript entity extraction via brace-depth scanning (§9 open
//! question: same heuristic rationale as the Python adapter — brace matching
//! over a full parser). Handles named function declarations, class methods,
//! and const-bound arrow/function expressions; never type-only declarations
//! (`interface`/`type` aliases are skipped per §4.2).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::entity::{CodeEntity, EntityKind};
use crate::errors::SmithError;

pub struct JavaScriptAdapter;

impl JavaScriptAdapter {
    pub fn entities_in_file(&self, path: &Path, file_contents: &Arc<str>) -> Result<Vec<CodeEntity>, SmithError> {
        let contents: &str = file_contents.as_ref();
        let function_re = Regex::new(r"^\s*(?:export\s+)?function\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*\(").unwrap();
        let arrow_re = Regex::new(
            r"^\s*(?:export\s+)?const\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s*)?(?:\(.*?\)|[A-Za-z_$][A-Za-z0-9_$]*)\s*=>",
        )
        .unwrap();
        let class_re = Regex::new(r"^\s*(?:export\s+)?class\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)").unwrap();
        let method_re = Regex::new(r"^\s*(?:static\s+|async\s+)*(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*\([^)]*\)\s*\{").unwrap();

        let mut entities = Vec::new();
        let mut class_name: Option<(usize, String)> = None; // (brace depth at class open, name)
        let mut depth = 0i64;

        let mut pos = 0usize;
        for line in contents.split_inclusive('\n') {
            let trimmed = line.trim_end_matches('\n');

            if let Some(caps) = class_re.captures(trimmed) {
                let name = caps["name"].to_string();
                if let Some(end) = find_matching_brace(contents, pos) {
                    entities.push(CodeEntity {
                        file: PathBuf::from(path),
                        lo: pos,
                        hi: end,
                        kind: EntityKind::ClassBody,
                        name: name.clone(),
                        src_code: contents[pos..end].to_string(),
                        file_contents: file_contents.clone(),
                    });
                    class_name = Some((depth, name));
                }
            } else if let Some(caps) = function_re.captures(trimmed) {
                if let Some(end) = find_matching_brace(contents, pos) {
                    entities.push(CodeEntity {
                        file: PathBuf::from(path),
                        lo: pos,
                        hi: end,
                        kind: EntityKind::Function,
                        name: caps["name"].to_string(),
                        src_code: contents[pos..end].to_string(),
                        file_contents: file_contents.clone(),
                    });
                }
            } else if let Some(caps) = arrow_re.captures(trimmed) {
                if let Some(end) = find_matching_brace(contents, pos).or_else(|| find_statement_end(contents, pos)) {
                    entities.push(CodeEntity {
                        file: PathBuf::from(path),
                        lo: pos,
                        hi: end,
                        kind: EntityKind::Function,
                        name: caps["name"].to_string(),
                        src_code: contents[pos..end].to_string(),
                        file_contents: file_contents.clone(),
                    });
                }
            } else if class_name.is_some() {
                if let Some(caps) = method_re.captures(trimmed) {
                    if let Some(end) = find_matching_brace(contents, pos) {
                        let qualified = format!("{}.{}", class_name.as_ref().unwrap().1, &caps["name"]);
                        entities.push(CodeEntity {
                            file: PathBuf::from(path),
                            lo: pos,
                            hi: end,
                            kind: EntityKind::Method,
                            name: qualified,
                            src_code: contents[pos..end].to_string(),
                            file_contents: file_contents.clone(),
                        });
                    }
                }
            }

            for ch in trimmed.chars() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if class_name.as_ref().is_some_and(|(d, _)| depth <= *d) {
                            class_name = None;
                        }
                    }
                    _ => {}
                }
            }
            pos += line.len();
        }
        Ok(entities)
    }
}

/// Finds the index just past the `{`...`}` block opening at or after `from`.
fn find_matching_brace(contents: &str, from: usize) -> Option<usize> {
    let bytes = contents.as_bytes();
    let open = bytes[from..].iter().position(|&b| b == b'{')? + from;
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fallback for concise arrow bodies with no braces (`const f = x => x + 1;`):
/// ends at the first top-level semicolon or newline.
fn find_statement_end(contents: &str, from: usize) -> Option<usize> {
    let rest = &contents[from..];
    let end = rest.find(['\n', ';'])?;
    Some(from + end + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_named_function() {
        let src = "function add(a, b) {\n  return a + b;\n}\n";
        let entities = JavaScriptAdapter.entities_in_file(Path::new("m.js"), &Arc::from(src)).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "add");
    }

    #[test]
    fn extracts_class_and_method() {
        let src = "class Widget {\n  spin() {\n    return true;\n  }\n}\n";
        let entities = JavaScriptAdapter.entities_in_file(Path::new("m.js"), &Arc::from(src)).unwrap();
        assert!(entities.iter().any(|e| e.kind == EntityKind::ClassBody && e.name == "Widget"));
        assert!(entities.iter().any(|e| e.kind == EntityKind::Method && e.name == "Widget.spin"));
    }

    #[test]
    fn extracts_const_arrow_function() {
        let src = "const add = (a, b) => {\n  return a + b;\n};\n";
        let entities = JavaScriptAdapter.entities_in_file(Path::new("m.js"), &Arc::from(src)).unwrap();
        assert!(entities.iter().any(|e| e.name == "add"));
    }

    #[test]
    fn entity_span_round_trips_byte_exact() {
        let src = "function add(a, b) {\n  return a + b;\n}\nconst x = 1;\n";
        let entities = JavaScriptAdapter.entities_in_file(Path::new("m.js"), &Arc::from(src)).unwrap();
        let e = &entities[0];
        let rebuilt = format!("{}{}{}", &src[..e.lo], e.src_code, &src[e.hi..]);
        assert_eq!(rebuilt, src);
    }
}
