use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::EdiError;
use crate::schema::node::{
    CodeListRef, DataType, ElementNode, ElementSchema, SchemaNode, SegmentSchema,
};

/// Frozen registry of transaction-set schemas, keyed by transaction-set id
/// (the schema file's basename, e.g. "810" or "ST").
///
/// Built once by [`SchemaRegistryBuilder`]; immutable afterwards, so it can
/// be shared read-only across any number of concurrent encode, decode, and
/// validate operations. After the build no `placeholder` nodes remain and
/// every `ID` element's code-list reference has been resolved to its map.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    formats: HashMap<String, Vec<SchemaNode>>,
    code_lists: HashMap<String, BTreeMap<String, String>>,
}

impl SchemaRegistry {
    pub fn get(&self, set_id: &str) -> Option<&[SchemaNode]> {
        self.formats.get(set_id).map(Vec::as_slice)
    }

    pub fn contains(&self, set_id: &str) -> bool {
        self.formats.contains_key(set_id)
    }

    pub fn set_ids(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    pub fn code_list(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.code_lists.get(name)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Mutable builder that drains schema JSON files, resolves placeholder and
/// code-list references in two passes, and freezes into a [`SchemaRegistry`].
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    formats: HashMap<String, Vec<SchemaNode>>,
    code_lists: HashMap<String, BTreeMap<String, String>>,
}

impl SchemaRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` under `formats_dir` as a transaction-set schema
    /// and every `*.json` under `formats_dir/codes` as a code list, then
    /// resolves references and freezes the registry.
    pub fn load_dir(formats_dir: impl AsRef<Path>) -> Result<SchemaRegistry, EdiError> {
        let formats_dir = formats_dir.as_ref();
        let mut builder = Self::new();

        let codes_dir = formats_dir.join("codes");
        if codes_dir.is_dir() {
            for (name, contents) in read_json_files(&codes_dir)? {
                builder.add_code_list_json(&name, &contents)?;
            }
        }

        for (name, contents) in read_json_files(formats_dir)? {
            builder.add_format_json(&name, &contents)?;
        }

        builder.build()
    }

    /// Registers one transaction-set schema from its JSON text. The
    /// top-level JSON value must be a list of schema nodes.
    pub fn add_format_json(&mut self, name: &str, json: &str) -> Result<&mut Self, EdiError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_array() {
            return Err(EdiError::InvalidSchema(format!(
                "imported definition '{}' is not a list of segments",
                name
            )));
        }
        let nodes: Vec<SchemaNode> = serde_json::from_value(value)?;
        self.add_format(name, nodes);
        Ok(self)
    }

    /// Registers one code list from its JSON text. The top-level JSON value
    /// must be a map from code to label.
    pub fn add_code_list_json(&mut self, name: &str, json: &str) -> Result<&mut Self, EdiError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(EdiError::InvalidSchema(format!(
                "imported code list '{}' is not an id map",
                name
            )));
        }
        let codes: BTreeMap<String, String> = serde_json::from_value(value)?;
        self.add_code_list(name, codes);
        Ok(self)
    }

    pub fn add_format(&mut self, name: &str, nodes: Vec<SchemaNode>) -> &mut Self {
        self.formats.insert(name.to_string(), nodes);
        self
    }

    pub fn add_code_list(&mut self, name: &str, codes: BTreeMap<String, String>) -> &mut Self {
        self.code_lists.insert(name.to_string(), codes);
        self
    }

    /// Runs both resolution passes and freezes the registry. Resolution is
    /// idempotent: building from an already-resolved node tree changes
    /// nothing.
    pub fn build(mut self) -> Result<SchemaRegistry, EdiError> {
        self.resolve_placeholders()?;
        self.resolve_code_lists()?;
        debug!(
            formats = self.formats.len(),
            code_lists = self.code_lists.len(),
            "schema registry built"
        );
        Ok(SchemaRegistry {
            formats: self.formats,
            code_lists: self.code_lists,
        })
    }

    /// Pass A: substitute every `placeholder` node with a deep copy of the
    /// referenced registry entry, applying the placeholder's overrides.
    fn resolve_placeholders(&mut self) -> Result<(), EdiError> {
        // The pristine map is the lookup source, so resolution order over
        // formats cannot change the result.
        let source = self.formats.clone();
        for (name, nodes) in self.formats.iter_mut() {
            resolve_placeholder_nodes(name, nodes, &source)?;
        }
        Ok(())
    }

    /// Pass B: attach resolved code maps to every `ID` element that still
    /// references its code list by name.
    fn resolve_code_lists(&mut self) -> Result<(), EdiError> {
        for nodes in self.formats.values_mut() {
            resolve_code_list_nodes(nodes, &self.code_lists)?;
        }
        Ok(())
    }
}

fn read_json_files(dir: &Path) -> Result<Vec<(String, String)>, EdiError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let contents = fs::read_to_string(&path)?;
        files.push((name.to_string(), contents));
    }
    Ok(files)
}

fn resolve_placeholder_nodes(
    format: &str,
    nodes: &mut [SchemaNode],
    source: &HashMap<String, Vec<SchemaNode>>,
) -> Result<(), EdiError> {
    for node in nodes.iter_mut() {
        match node {
            SchemaNode::Placeholder(placeholder) => {
                let replacement_id = placeholder
                    .replacement
                    .clone()
                    .unwrap_or_else(|| placeholder.id.clone());
                let unresolved = || EdiError::PlaceholderUnresolved {
                    format: format.to_string(),
                    placeholder: placeholder.id.clone(),
                    replacement: replacement_id.clone(),
                };

                // The referenced entry is a one-node list whose head must
                // carry the placeholder's own id.
                let head = source
                    .get(&replacement_id)
                    .and_then(|nodes| nodes.first())
                    .ok_or_else(unresolved)?;
                if head.id() != placeholder.id {
                    return Err(unresolved());
                }

                let mut replacement = head.clone();
                match &mut replacement {
                    SchemaNode::Segment(segment) => {
                        if let Some(req) = placeholder.req {
                            segment.req = req;
                        }
                        if let Some(max_uses) = placeholder.max_uses {
                            segment.max_uses = max_uses;
                        }
                    }
                    SchemaNode::Loop(lp) => {
                        if let Some(req) = placeholder.req {
                            lp.req = req;
                        }
                        if let Some(repeat) = placeholder.repeat {
                            lp.repeat = repeat;
                        }
                        resolve_placeholder_nodes(format, &mut lp.segments, source)?;
                    }
                    SchemaNode::Placeholder(_) => return Err(unresolved()),
                }
                *node = replacement;
            }
            SchemaNode::Loop(lp) => {
                resolve_placeholder_nodes(format, &mut lp.segments, source)?;
            }
            SchemaNode::Segment(_) => {}
        }
    }
    Ok(())
}

fn resolve_code_list_nodes(
    nodes: &mut [SchemaNode],
    code_lists: &HashMap<String, BTreeMap<String, String>>,
) -> Result<(), EdiError> {
    for node in nodes.iter_mut() {
        match node {
            SchemaNode::Loop(lp) => resolve_code_list_nodes(&mut lp.segments, code_lists)?,
            SchemaNode::Segment(segment) => resolve_segment_code_lists(segment, code_lists)?,
            SchemaNode::Placeholder(placeholder) => {
                return Err(EdiError::PlaceholderUnresolved {
                    format: String::new(),
                    placeholder: placeholder.id.clone(),
                    replacement: placeholder
                        .replacement
                        .clone()
                        .unwrap_or_else(|| placeholder.id.clone()),
                })
            }
        }
    }
    Ok(())
}

fn resolve_segment_code_lists(
    segment: &mut SegmentSchema,
    code_lists: &HashMap<String, BTreeMap<String, String>>,
) -> Result<(), EdiError> {
    let segment_id = segment.id.clone();
    for element in segment.elements.iter_mut() {
        match element {
            ElementNode::Element(e) => {
                resolve_element_code_list(&segment_id, e, code_lists)?;
            }
            ElementNode::Composite(c) => {
                for sub in c.elements.iter_mut() {
                    resolve_element_code_list(&segment_id, sub, code_lists)?;
                }
            }
        }
    }
    Ok(())
}

fn resolve_element_code_list(
    segment_id: &str,
    element: &mut ElementSchema,
    code_lists: &HashMap<String, BTreeMap<String, String>>,
) -> Result<(), EdiError> {
    if element.data_type != DataType::ID {
        return Ok(());
    }
    if let Some(CodeListRef::Name(name)) = &element.data_type_ids {
        let codes = code_lists
            .get(name)
            .ok_or_else(|| EdiError::CodeListUnresolved {
                segment: segment_id.to_string(),
                element: element.id.clone(),
                code_list: name.clone(),
            })?;
        element.data_type_ids = Some(CodeListRef::Codes(codes.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn st_format() -> &'static str {
        r#"[
            {"type": "segment", "id": "ST", "name": "Transaction Set Header",
             "req": "M", "max_uses": 1, "elements": [
                {"type": "element", "id": "ST01", "name": "Transaction Set Identifier Code",
                 "req": "M", "data_type": "ID", "length": {"min": 3, "max": 3},
                 "data_type_ids": "transaction_set_id"},
                {"type": "element", "id": "ST02", "name": "Transaction Set Control Number",
                 "req": "M", "data_type": "AN", "length": {"min": 4, "max": 9}}
            ]}
        ]"#
    }

    #[test]
    fn test_placeholder_resolution() {
        let mut builder = SchemaRegistryBuilder::new();
        builder
            .add_format_json("ST", st_format())
            .unwrap()
            .add_format_json(
                "810",
                r#"[{"type": "placeholder", "id": "ST", "req": "O"}]"#,
            )
            .unwrap()
            .add_code_list_json("transaction_set_id", r#"{"810": "Invoice"}"#)
            .unwrap();
        let registry = builder.build().unwrap();

        let nodes = registry.get("810").unwrap();
        let SchemaNode::Segment(segment) = &nodes[0] else {
            panic!("placeholder was not replaced by a segment");
        };
        assert_eq!(segment.id, "ST");
        // the placeholder overrode the replacement's requirement
        assert_eq!(segment.req, crate::schema::Requirement::Optional);
        assert_eq!(segment.elements.len(), 2);
    }

    #[test]
    fn test_placeholder_missing_target() {
        let mut builder = SchemaRegistryBuilder::new();
        builder
            .add_format_json("810", r#"[{"type": "placeholder", "id": "GS"}]"#)
            .unwrap();
        assert_matches!(
            builder.build(),
            Err(EdiError::PlaceholderUnresolved { placeholder, .. }) if placeholder == "GS"
        );
    }

    #[test]
    fn test_placeholder_head_id_mismatch() {
        let mut builder = SchemaRegistryBuilder::new();
        builder
            .add_format_json("ST", st_format())
            .unwrap()
            .add_format_json(
                "810",
                r#"[{"type": "placeholder", "id": "SE", "replacement": "ST"}]"#,
            )
            .unwrap();
        assert_matches!(
            builder.build(),
            Err(EdiError::PlaceholderUnresolved { placeholder, .. }) if placeholder == "SE"
        );
    }

    #[test]
    fn test_code_list_resolution() {
        let mut builder = SchemaRegistryBuilder::new();
        builder
            .add_format_json("ST", st_format())
            .unwrap()
            .add_code_list_json("transaction_set_id", r#"{"810": "Invoice", "850": "Purchase Order"}"#)
            .unwrap();
        let registry = builder.build().unwrap();

        let SchemaNode::Segment(st) = &registry.get("ST").unwrap()[0] else {
            panic!("expected a segment");
        };
        let crate::schema::ElementNode::Element(st01) = &st.elements[0] else {
            panic!("expected an element");
        };
        let Some(CodeListRef::Codes(codes)) = &st01.data_type_ids else {
            panic!("code list was not resolved");
        };
        assert_eq!(codes.get("810").map(String::as_str), Some("Invoice"));
    }

    #[test]
    fn test_missing_code_list_fails() {
        let mut builder = SchemaRegistryBuilder::new();
        builder.add_format_json("ST", st_format()).unwrap();
        assert_matches!(
            builder.build(),
            Err(EdiError::CodeListUnresolved { code_list, .. }) if code_list == "transaction_set_id"
        );
    }

    #[test]
    fn test_wrong_top_level_shapes() {
        let mut builder = SchemaRegistryBuilder::new();
        assert_matches!(
            builder.add_format_json("810", r#"{"type": "segment"}"#),
            Err(EdiError::InvalidSchema(_))
        );
        assert_matches!(
            builder.add_code_list_json("codes", r#"["A", "B"]"#),
            Err(EdiError::InvalidSchema(_))
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut builder = SchemaRegistryBuilder::new();
        builder
            .add_format_json("ST", st_format())
            .unwrap()
            .add_format_json("810", r#"[{"type": "placeholder", "id": "ST"}]"#)
            .unwrap()
            .add_code_list_json("transaction_set_id", r#"{"810": "Invoice"}"#)
            .unwrap();
        let first = builder.build().unwrap();

        // feed the resolved tree through a second build
        let mut again = SchemaRegistryBuilder::new();
        for set_id in first.set_ids() {
            again.add_format(set_id, first.get(set_id).unwrap().to_vec());
        }
        again.add_code_list(
            "transaction_set_id",
            first.code_list("transaction_set_id").unwrap().clone(),
        );
        let second = again.build().unwrap();

        assert_eq!(first.get("810"), second.get("810"));
        assert_eq!(first.get("ST"), second.get("ST"));
    }
}
