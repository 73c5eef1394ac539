//! Naming, shape-conversion, and counting helpers shared by the codec and
//! validator.

use indexmap::IndexMap;

use crate::error::EdiError;
use crate::models::EdiValue;
use crate::schema::{SchemaNode, SegmentSchema};

/// Positional element name: `SSSnn` (e.g. `BIG01`).
pub fn element_name(seg_id: &str, idx: usize) -> String {
    format!("{}{:02}", seg_id, idx)
}

/// Composite sub-element name: `SSSnn-mm` (e.g. `DTM02-01`).
pub fn composite_element_name(seg_id: &str, idx: usize, sub_idx: usize) -> String {
    format!("{}{:02}-{:02}", seg_id, idx, sub_idx)
}

/// Bounded loop id for a head segment: `L_<seg>`.
pub fn loop_name(seg_id: &str) -> String {
    format!("L_{}", seg_id)
}

/// Set id for a head segment: `S_<seg>`.
pub fn set_name(seg_id: &str) -> String {
    format!("S_{}", seg_id)
}

/// True when `loop_id` is the loop or set name of `seg_id`.
pub fn is_loop_of(loop_id: &str, seg_id: &str) -> bool {
    loop_id == loop_name(seg_id) || loop_id == set_name(seg_id)
}

/// Finds a schema node by id within a node list.
pub fn find_schema<'a>(schemas: &'a [SchemaNode], id: &str) -> Option<&'a SchemaNode> {
    schemas.iter().find(|node| node.id() == id)
}

/// True when the node may occur more than once: segments by `max_uses`,
/// loops always (bounded by `repeat` instead).
pub fn allows_multiples(node: &SchemaNode) -> bool {
    match node {
        SchemaNode::Segment(segment) => segment.allows_multiples(),
        _ => true,
    }
}

/// True when `id` names a schema segment that may repeat.
pub fn segment_repeats(schemas: &[SchemaNode], id: &str) -> bool {
    find_schema(schemas, id).map_or(false, allows_multiples)
}

/// Mandatory, single-use segment nodes are the ones worth pre-creating in
/// a fresh document.
pub fn is_required_single_segment(node: &SchemaNode) -> bool {
    matches!(node, SchemaNode::Segment(segment)
        if segment.req.is_mandatory() && !segment.allows_multiples())
}

/// A fresh segment map with every element present and null.
pub fn create_segment(segment: &SegmentSchema) -> EdiValue {
    let map: IndexMap<String, EdiValue> = (0..segment.elements.len())
        .map(|index| (element_name(&segment.id, index + 1), EdiValue::Null))
        .collect();
    EdiValue::Map(map)
}

/// Scaffolds a document from a schema: required single-use segments get a
/// null-element map, everything else a null entry.
pub fn create_segments(
    data: &mut IndexMap<String, EdiValue>,
    schemas: &[SchemaNode],
    create_required: bool,
) {
    for node in schemas {
        let value = match node {
            SchemaNode::Segment(segment)
                if create_required && is_required_single_segment(node) =>
            {
                create_segment(segment)
            }
            _ => EdiValue::Null,
        };
        data.insert(node.id().to_string(), value);
    }
}

/// Drops empty top-level loops and segments. Not recursive, so empty
/// elements inside populated segments survive.
pub fn remove_empty_data(data: &mut IndexMap<String, EdiValue>) {
    data.retain(|_, value| !value.is_empty());
}

/// Counts how many segments-worth of data a subtree represents. Used to
/// fill SE01/GE01-style count fields.
pub fn entry_count(value: &EdiValue) -> usize {
    match value {
        EdiValue::Map(map) => {
            let mut count = 0;
            for entry in map.values() {
                match entry {
                    EdiValue::Map(_) => count += 1,
                    EdiValue::List(items) => {
                        for each in items {
                            count += entry_count(each);
                        }
                    }
                    scalar => {
                        // first scalar means this map is itself a segment
                        return usize::from(!scalar.is_empty());
                    }
                }
            }
            count
        }
        EdiValue::List(items) => items.iter().map(entry_count).sum(),
        _ => 0,
    }
}

/// Counts segments between two top-level ids, both ends inclusive.
pub fn get_count_between(
    data: &IndexMap<String, EdiValue>,
    seg_id_start: &str,
    seg_id_end: &str,
) -> usize {
    let mut count = 0;
    let mut started = false;
    for (seg_id, entry) in data {
        if seg_id == seg_id_start {
            started = true;
        }
        if started {
            count += entry_count(entry);
        }
        if seg_id == seg_id_end {
            break;
        }
    }
    count
}

/// Folds an arbitrarily large counter into a control number of at most
/// `max_places` digits via integer-divide plus modulo.
pub fn create_control_number(value: u64, max_places: u32) -> u64 {
    let modulus = 10u64.pow(max_places);
    value / modulus + value % modulus
}

/// Converts segment payloads between the positional shape (elements as an
/// ordered list, used for encoding) and the named shape (elements keyed by
/// `SSSnn`, produced by decoding).
pub struct EdiConverter;

impl EdiConverter {
    /// Reduces every segment map in a document to a positional list of its
    /// element values. Loops and repeating segments recurse per item. A map
    /// that itself holds scalars is a single segment and converts directly
    /// to a list.
    pub fn to_element_list(input: &EdiValue) -> Result<EdiValue, EdiError> {
        let EdiValue::Map(map) = input else {
            return Err(EdiError::MalformedDocument(format!(
                "cannot convert {} to element lists",
                input.type_name()
            )));
        };

        let mut output: IndexMap<String, EdiValue> = IndexMap::new();
        for (key, data) in map {
            match data {
                EdiValue::Map(segment) => {
                    output.insert(
                        key.clone(),
                        EdiValue::List(segment.values().cloned().collect()),
                    );
                }
                EdiValue::List(items) => {
                    let converted: Result<Vec<EdiValue>, EdiError> =
                        items.iter().map(Self::to_element_list).collect();
                    output.insert(key.clone(), EdiValue::List(converted?));
                }
                scalar if !scalar.is_empty() => {
                    // the input map is a single segment keyed by element name
                    return Ok(EdiValue::List(map.values().cloned().collect()));
                }
                _ => {}
            }
        }
        Ok(EdiValue::Map(output))
    }

    /// Inverse of [`to_element_list`](Self::to_element_list): positional
    /// lists become maps keyed by `SSSnn` element names.
    pub fn to_element_dict(input: &EdiValue) -> Result<EdiValue, EdiError> {
        Self::to_element_dict_named(input, None)
    }

    fn to_element_dict_named(input: &EdiValue, name: Option<&str>) -> Result<EdiValue, EdiError> {
        match input {
            EdiValue::Map(map) => {
                let mut output: IndexMap<String, EdiValue> = IndexMap::new();
                for (key, data) in map {
                    output.insert(key.clone(), Self::to_element_dict_named(data, Some(key))?);
                }
                Ok(EdiValue::Map(output))
            }
            EdiValue::List(items) => {
                if items.is_empty() {
                    return Ok(EdiValue::List(vec![]));
                }
                if items[0].is_scalar() {
                    let seg_id = name.ok_or_else(|| {
                        EdiError::MalformedDocument(
                            "positional list has no segment name".to_string(),
                        )
                    })?;
                    let map: IndexMap<String, EdiValue> = items
                        .iter()
                        .enumerate()
                        .map(|(index, value)| (element_name(seg_id, index + 1), value.clone()))
                        .collect();
                    Ok(EdiValue::Map(map))
                } else {
                    // repeating segments or loop iterations
                    let converted: Result<Vec<EdiValue>, EdiError> = items
                        .iter()
                        .map(|each| Self::to_element_dict_named(each, name))
                        .collect();
                    Ok(EdiValue::List(converted?))
                }
            }
            scalar => Err(EdiError::MalformedDocument(format!(
                "cannot convert {} to element names",
                scalar.type_name()
            ))),
        }
    }
}
