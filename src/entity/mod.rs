//! Language Adapter (§4.2): parses a source tree into a flat sequence of code
//! entities with byte-exact spans. A sum type of adapters, one per language,
//! chosen by the profile's language tag — no runtime plugin registry (§9).

pub mod javascript;
pub mod python;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::errors::SmithError;
use crate::profile::{Language, RepoProfile};

/// Kind of syntactic unit an entity represents (§3 Code Entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Function,
    Method,
    ClassBody,
}

/// A syntactic unit with an executable body: function, method, or class body.
/// `src_code` is byte-exact over `[lo, hi)` in `file_contents`; re-inserting it
/// at that span reproduces the file byte-for-byte (§4.2, §8.5). `file_contents`
/// is the full text of `file` at extraction time, shared (not copied) across
/// every entity extracted from the same file.
#[derive(Debug, Clone)]
pub struct CodeEntity {
    pub file: PathBuf,
    pub lo: usize,
    pub hi: usize,
    pub kind: EntityKind,
    pub name: String,
    pub src_code: String,
    pub file_contents: Arc<str>,
}

impl CodeEntity {
    /// Splices `new_body` in place of this entity's span within `file_contents`,
    /// returning the full rewritten file. Used by every bug generator to turn a
    /// mutated body back into a whole-file diff target (§4.4).
    pub fn splice(&self, file_contents: &str, new_body: &str) -> String {
        let mut out = String::with_capacity(file_contents.len());
        out.push_str(&file_contents[..self.lo]);
        out.push_str(new_body);
        out.push_str(&file_contents[self.hi..]);
        out
    }
}

/// One file's path plus its full contents, gathered under the profile's globs.
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Walks `root` under `profile.source_globs() \ exclude_globs()`, reading every
/// matching file (§4.2: "walk every file under source_globs minus exclude_globs").
pub fn gather_source_tree(root: &Path, profile: &RepoProfile) -> Result<Vec<SourceFile>, SmithError> {
    let include = profile.source_globset()?;
    let exclude = profile.exclude_globset()?;
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !include.is_match(rel) || exclude.is_match(rel) {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path())?;
        files.push(SourceFile {
            path: rel.to_path_buf(),
            contents,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Sum type of language-specific entity extractors (§9 design note: extend the
/// sum type to add a language, never register a plugin at runtime).
pub enum LanguageAdapter {
    Python(python::PythonAdapter),
    JavaScript(javascript::JavaScriptAdapter),
}

impl LanguageAdapter {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Python => LanguageAdapter::Python(python::PythonAdapter),
            Language::JavaScript => LanguageAdapter::JavaScript(javascript::JavaScriptAdapter),
        }
    }

    /// Parses every file's entities, skipping files of a different language
    /// than this adapter understands (not an error — §4.2).
    pub fn entities_of(&self, files: &[SourceFile]) -> Result<Vec<CodeEntity>, SmithError> {
        let mut out = Vec::new();
        for file in files {
            let contents: Arc<str> = Arc::from(file.contents.as_str());
            let entities = match self {
                LanguageAdapter::Python(a) => a.entities_in_file(&file.path, &contents)?,
                LanguageAdapter::JavaScript(a) => a.entities_in_file(&file.path, &contents)?,
            };
            out.extend(entities);
        }
        Ok(out)
    }
}
