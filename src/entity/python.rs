//! Python entity extraction via indentation scanning (§9 open-question
//! resolution: no tree-sitter-class dependency appears anywhere in the
//! retrieved corpus, so this adapter tracks block boundaries by indentation
//! depth rather than embedding a full grammar). Spans remain byte-exact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::entity::{CodeEntity, EntityKind};
use crate::errors::SmithError;

pub struct PythonAdapter;

impl PythonAdapter {
    pub fn entities_in_file(&self, path: &Path, contents: &Arc<str>) -> Result<Vec<CodeEntity>, SmithError> {
        let text: &str = contents.as_ref();
        let def_re = Regex::new(r"^(?P<indent>[ \t]*)(?P<kind>def|class)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)")
            .unwrap();
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut offsets = Vec::with_capacity(lines.len() + 1);
        let mut acc = 0usize;
        for line in &lines {
            offsets.push(acc);
            acc += line.len();
        }
        offsets.push(text.len());

        let mut entities = Vec::new();
        let mut class_stack: Vec<(usize, String)> = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = def_re.captures(line.trim_end_matches('\n')) else {
                continue;
            };
            let indent = caps["indent"].len();
            let name = caps["name"].to_string();
            let is_class = &caps["kind"] == "class";

            while class_stack.last().is_some_and(|(depth, _)| *depth >= indent) {
                class_stack.pop();
            }

            let qualified_name = if is_class {
                name.clone()
            } else if let Some((_, class_name)) = class_stack.last() {
                format!("{class_name}.{name}")
            } else {
                name.clone()
            };

            let end_line = find_block_end(&lines, i, indent);
            let lo = offsets[i];
            let hi = offsets[end_line];

            entities.push(CodeEntity {
                file: PathBuf::from(path),
                lo,
                hi,
                kind: if is_class {
                    EntityKind::ClassBody
                } else if class_stack.last().is_some() {
                    EntityKind::Method
                } else {
                    EntityKind::Function
                },
                name: qualified_name,
                src_code: text[lo..hi].to_string(),
                file_contents: contents.clone(),
            });

            if is_class {
                class_stack.push((indent, name));
            }
        }
        Ok(entities)
    }
}

/// Scans forward from `start` (the `def`/`class` line) until a non-blank line
/// at an indentation `<= def_indent` is found, or end of file.
fn find_block_end(lines: &[&str], start: usize, def_indent: usize) -> usize {
    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }
        let this_indent = line.len() - line.trim_start().len();
        if this_indent <= def_indent {
            break;
        }
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_top_level_function() {
        let src = "def add(a, b):\n    return a + b\n\ndef sub(a, b):\n    return a - b\n";
        let entities = PythonAdapter.entities_in_file(Path::new("m.py"), &Arc::from(src)).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "add");
        assert_eq!(entities[0].kind, EntityKind::Function);
    }

    #[test]
    fn extracts_method_qualified_by_class() {
        let src = "class Widget:\n    def spin(self):\n        return True\n";
        let entities = PythonAdapter.entities_in_file(Path::new("m.py"), &Arc::from(src)).unwrap();
        let method = entities.iter().find(|e| e.kind == EntityKind::Method).unwrap();
        assert_eq!(method.name, "Widget.spin");
    }

    #[test]
    fn entity_span_round_trips_byte_exact() {
        let src = "def add(a, b):\n    return a + b\n\nx = 1\n";
        let entities = PythonAdapter.entities_in_file(Path::new("m.py"), &Arc::from(src)).unwrap();
        let e = &entities[0];
        let rebuilt = format!("{}{}{}", &src[..e.lo], e.src_code, &src[e.hi..]);
        assert_eq!(rebuilt, src);
    }
}
