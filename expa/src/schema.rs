//! Schema registry: external descriptors resolving row structures.
//!
//! A dialect's descriptor directory is anchored by `structure.json`, a
//! mapping of source-path regex to schema document. A document maps table
//! names (exact first, then as anchored regexes) to ordered field lists.
//! Missing directories or documents resolve to the empty schema; only
//! malformed documents are errors.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{ExpaError, Result};
use crate::types::{EntryType, StructureEntry};

/// Name of the top-level index inside a descriptor directory.
const INDEX_FILE: &str = "structure.json";

pub struct SchemaRegistry {
    root: PathBuf,
}

impl SchemaRegistry {
    /// A registry rooted at a dialect's descriptor directory, e.g.
    /// `structures/dscs`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the schema for `table_name` within the container at
    /// `source_path`. Empty when nothing matches.
    pub fn resolve(&self, source_path: &str, table_name: &str) -> Result<Vec<StructureEntry>> {
        let index_path = self.root.join(INDEX_FILE);
        if !self.root.is_dir() || !index_path.is_file() {
            return Ok(Vec::new());
        }

        let index = load_object(&index_path)?;
        let mut document = None;
        for (pattern, value) in &index {
            let Some(file_name) = value.as_str() else {
                warn!("index entry {pattern:?} does not name a file, skipping");
                continue;
            };
            match Regex::new(pattern) {
                Ok(re) if re.is_match(source_path) => {
                    document = Some(file_name.to_string());
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!("unusable index pattern {pattern:?}: {e}"),
            }
        }

        let Some(document) = document else {
            return Ok(Vec::new());
        };
        debug!("schema document for {source_path}: {document}");

        let doc = load_object(&self.root.join(&document))?;

        // Exact table name wins; otherwise the first entry whose name,
        // anchored, matches as a regex.
        let mut fields = doc.get(table_name);
        if fields.is_none() {
            for (pattern, value) in &doc {
                match Regex::new(&anchor(pattern)) {
                    Ok(re) if re.is_match(table_name) => {
                        fields = Some(value);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("unusable table pattern {pattern:?}: {e}"),
                }
            }
        }

        let Some(fields) = fields else {
            return Ok(Vec::new());
        };
        let Some(fields) = fields.as_object() else {
            return Err(ExpaError::Descriptor {
                path: document,
                detail: format!("entry for {table_name:?} is not an object"),
            });
        };

        Ok(fields
            .iter()
            .map(|(name, ty)| {
                let ty = ty.as_str().map_or(EntryType::Empty, EntryType::from_name);
                StructureEntry::new(name.clone(), ty)
            })
            .collect())
    }
}

fn load_object(path: &Path) -> Result<serde_json::Map<String, JsonValue>> {
    let text = fs::read_to_string(path)?;
    let value: JsonValue = serde_json::from_str(&text).map_err(|e| ExpaError::Descriptor {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    match value {
        JsonValue::Object(map) => Ok(map),
        _ => Err(ExpaError::Descriptor {
            path: path.display().to_string(),
            detail: "top level is not an object".into(),
        }),
    }
}

/// Anchor a table pattern so it must match the whole name.
fn anchor(pattern: &str) -> String {
    format!("^(?:{pattern})$")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn registry_with(index: &str, documents: &[(&str, &str)]) -> (tempfile::TempDir, SchemaRegistry) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("structure.json"), index).unwrap();
        for (name, body) in documents {
            fs::write(dir.path().join(name), body).unwrap();
        }
        let registry = SchemaRegistry::new(dir.path());
        (dir, registry)
    }

    #[test]
    fn resolves_by_path_then_exact_table_name() {
        let (_dir, registry) = registry_with(
            r#"{ "text": "text.json", ".*": "fallback.json" }"#,
            &[
                (
                    "text.json",
                    r#"{ "quest_names": { "id": "int32", "label": "string" } }"#,
                ),
                ("fallback.json", r#"{ "quest_names": { "id": "int8" } }"#),
            ],
        );

        let fields = registry.resolve("data/text/quest.mbe", "quest_names").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "id");
        assert_eq!(fields[0].ty, EntryType::Int32);
        assert_eq!(fields[1].ty, EntryType::String);
    }

    #[test]
    fn table_names_fall_back_to_anchored_regexes() {
        let (_dir, registry) = registry_with(
            r#"{ ".*": "doc.json" }"#,
            &[(
                "doc.json",
                r#"{ "chapter[0-9]+": { "n": "int32" }, "chapter1": { "n": "float" } }"#,
            )],
        );

        // Regex match takes the first entry; exact lookup beats it.
        let by_regex = registry.resolve("any", "chapter42").unwrap();
        assert_eq!(by_regex[0].ty, EntryType::Int32);

        let exact = registry.resolve("any", "chapter1").unwrap();
        assert_eq!(exact[0].ty, EntryType::Float);
    }

    #[test]
    fn anchoring_prevents_substring_matches() {
        let (_dir, registry) = registry_with(
            r#"{ ".*": "doc.json" }"#,
            &[("doc.json", r#"{ "item": { "n": "int32" } }"#)],
        );

        assert!(registry.resolve("any", "item_extra").unwrap().is_empty());
    }

    #[test]
    fn missing_registry_resolves_empty() {
        let registry = SchemaRegistry::new("does/not/exist");
        assert!(registry.resolve("x", "y").unwrap().is_empty());
    }

    #[test]
    fn unknown_type_names_become_empty() {
        let (_dir, registry) = registry_with(
            r#"{ ".*": "doc.json" }"#,
            &[("doc.json", r#"{ "t": { "a": "int32", "b": "mystery" } }"#)],
        );
        let fields = registry.resolve("x", "t").unwrap();
        assert_eq!(fields[1].ty, EntryType::Empty);
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let (_dir, registry) = registry_with(
            r#"{ ".*": "doc.json" }"#,
            &[(
                "doc.json",
                r#"{ "t": { "a": "byte", "b": "short", "c": "int" } }"#,
            )],
        );
        let fields = registry.resolve("x", "t").unwrap();
        assert_eq!(fields[0].ty, EntryType::Int8);
        assert_eq!(fields[1].ty, EntryType::Int16);
        assert_eq!(fields[2].ty, EntryType::Int32);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let (_dir, registry) = registry_with(r#"{ ".*": "doc.json" }"#, &[("doc.json", "not json")]);
        assert!(registry.resolve("x", "t").is_err());
    }
}
