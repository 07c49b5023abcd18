//! In-memory index over a set of source files
//!
//! Good enough to drive the suggester from the command line and in tests: each
//! document contributes a lowercased `full` field and a `path` field built from
//! its relative path.

use crate::reader::{DocId, IndexReader, Posting, TermEntry};
use crate::tokenizer::Tokenizer;
use crate::{IndexError, IndexResult};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Full-text field
pub const FULL_FIELD: &str = "full";

/// Path components field
pub const PATH_FIELD: &str = "path";

type FieldPostings = BTreeMap<String, Vec<Posting>>;

/// Immutable index snapshot implementing [`IndexReader`]
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    fields: BTreeMap<String, FieldPostings>,
    documents: Vec<String>,
    generation: i64,
}

impl MemoryIndex {
    pub fn builder() -> MemoryIndexBuilder {
        MemoryIndexBuilder::default()
    }

    /// Name the document was added under
    pub fn document_name(&self, doc: DocId) -> Option<&str> {
        usize::try_from(doc)
            .ok()
            .and_then(|i| self.documents.get(i))
            .map(String::as_str)
    }
}

impl IndexReader for MemoryIndex {
    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn num_docs(&self) -> u32 {
        u32::try_from(self.documents.len()).unwrap_or(u32::MAX)
    }

    fn commit_generation(&self) -> i64 {
        self.generation
    }

    fn terms(&self, field: &str) -> IndexResult<Vec<TermEntry>> {
        let postings = self
            .fields
            .get(field)
            .ok_or_else(|| IndexError::UnknownField(field.to_string()))?;

        Ok(postings
            .iter()
            .map(|(text, postings)| TermEntry {
                text: text.clone(),
                doc_freq: u32::try_from(postings.len()).unwrap_or(u32::MAX),
            })
            .collect())
    }

    fn postings(&self, field: &str, term: &str) -> IndexResult<Vec<Posting>> {
        Ok(self
            .fields
            .get(field)
            .and_then(|postings| postings.get(term))
            .cloned()
            .unwrap_or_default())
    }

    fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

/// Accumulates documents into a [`MemoryIndex`]
#[derive(Debug, Default)]
pub struct MemoryIndexBuilder {
    index: MemoryIndex,
}

impl MemoryIndexBuilder {
    /// Set the commit generation reported by the built index
    #[must_use]
    pub const fn commit_generation(mut self, generation: i64) -> Self {
        self.index.generation = generation;
        self
    }

    /// Add a document from pre-tokenized fields; token order gives positions
    pub fn add_document<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        fields: &[(&str, Vec<S>)],
    ) -> DocId {
        let doc = u32::try_from(self.index.documents.len()).unwrap_or(u32::MAX);
        self.index.documents.push(name.into());

        for (field, tokens) in fields {
            let mut positions: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
            for (position, token) in (0_u32..).zip(tokens) {
                positions.entry(token.as_ref()).or_default().push(position);
            }

            let field_postings = self.index.fields.entry((*field).to_string()).or_default();
            for (term, positions) in positions {
                field_postings
                    .entry(term.to_string())
                    .or_default()
                    .push(Posting { doc, positions });
            }
        }

        doc
    }

    /// Add a source file under its relative `name`
    pub fn add_source(&mut self, name: &str, content: &str) -> DocId {
        let full = Tokenizer::lowercasing().tokenize(content);
        let path = Tokenizer::new().tokenize_path(name);
        self.add_document(name, &[(FULL_FIELD, full), (PATH_FIELD, path)])
    }

    /// Add every UTF-8 file below `root`, skipping hidden entries
    ///
    /// Returns the number of files added.
    ///
    /// # Errors
    /// Returns `IndexError::Io` if `root` is not a readable directory
    pub fn add_directory(&mut self, root: &Path) -> IndexResult<usize> {
        if !root.is_dir() {
            return Err(IndexError::Io(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let files: Vec<_> = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .collect();

        let mut added = 0_usize;
        for path in files {
            let Ok(content) = std::fs::read_to_string(&path) else {
                tracing::debug!(path = %path.display(), "Skipping unreadable or non-UTF-8 file");
                continue;
            };
            let name = path
                .strip_prefix(root)
                .unwrap_or(path.as_path())
                .to_string_lossy()
                .replace('\\', "/");
            self.add_source(&name, &content);
            added = added.saturating_add(1);
        }

        tracing::info!(root = %root.display(), files = added, "Indexed directory");
        Ok(added)
    }

    pub fn build(self) -> MemoryIndex {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryIndex {
        let mut builder = MemoryIndex::builder().commit_generation(7);
        builder.add_source("src/a.rs", "fn apple() { apply(apple) }");
        builder.add_source("src/b.rs", "fn april() {}");
        builder.build()
    }

    #[test]
    fn test_terms_are_sorted_with_doc_freq() {
        let index = sample();
        let terms = index.terms(FULL_FIELD).unwrap();
        let texts: Vec<_> = terms.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["apple", "apply", "april", "fn"]);

        let fn_entry = terms.iter().find(|t| t.text == "fn").unwrap();
        assert_eq!(fn_entry.doc_freq, 2);
    }

    #[test]
    fn test_postings_record_positions() {
        let index = sample();
        let postings = index.postings(FULL_FIELD, "apple").unwrap();
        assert_eq!(
            postings,
            vec![Posting {
                doc: 0,
                positions: vec![1, 3]
            }]
        );
        assert!(index.postings(FULL_FIELD, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let index = sample();
        assert!(matches!(
            index.terms("defs"),
            Err(IndexError::UnknownField(_))
        ));
        assert!(index.postings("defs", "x").unwrap().is_empty());
    }

    #[test]
    fn test_metadata() {
        let index = sample();
        assert_eq!(index.num_docs(), 2);
        assert_eq!(index.commit_generation(), 7);
        assert_eq!(index.fields(), vec![FULL_FIELD, PATH_FIELD]);
        assert_eq!(index.document_name(1), Some("src/b.rs"));
    }

    #[test]
    fn test_add_directory_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "hidden").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let mut builder = MemoryIndex::builder();
        let added = builder.add_directory(dir.path()).unwrap();
        let index = builder.build();

        assert_eq!(added, 1);
        assert_eq!(index.document_name(0), Some("main.rs"));
        assert!(index.postings(FULL_FIELD, "hidden").unwrap().is_empty());
    }
}
