use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use tracing::warn;

use crate::error::EdiError;
use crate::models::{Delimiters, EdiValue};
use crate::schema::{
    DataType, ElementNode, ElementSchema, LoopSchema, SchemaNode, SchemaRegistry, SegmentSchema,
};
use crate::utils::is_loop_of;

/// Delimiters and version discovered from an ISA header. Fixed for the
/// rest of the stream once read.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeInfo {
    pub delimiters: Delimiters,
    /// Interchange control version (ISA12), when present.
    pub version: Option<String>,
}

/// Decodes X12 text into the named document shape by walking the
/// transaction-set schema.
///
/// Structural violations fail fast; segments the schema does not know are
/// logged and skipped so vendor extensions do not abort the parse.
#[derive(Debug, Clone)]
pub struct X12Decoder<'a> {
    registry: &'a SchemaRegistry,
    delimiters: Delimiters,
    transaction_set: Option<String>,
}

impl<'a> X12Decoder<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            delimiters: Delimiters::default(),
            transaction_set: None,
        }
    }

    /// Preselects the transaction set instead of reading it from ST01.
    pub fn with_transaction_set(mut self, set_id: impl Into<String>) -> Self {
        self.transaction_set = Some(set_id.into());
        self
    }

    /// Replaces the fallback delimiters used before (or without) an ISA
    /// header.
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Reads delimiters and the interchange version from the fixed-width
    /// ISA header. The element separator is the 4th byte; ISA16's first
    /// character is the component separator, its second the segment
    /// terminator, extended by any CR/LF bytes that follow.
    pub fn read_envelope(&self, data: &str) -> Result<EnvelopeInfo, EdiError> {
        if !data.starts_with("ISA") {
            return Err(EdiError::BadEnvelope(preview(data)));
        }
        let element = data
            .chars()
            .nth(3)
            .ok_or_else(|| EdiError::BadEnvelope(preview(data)))?;

        let mut delimiters = self.delimiters.clone();
        delimiters.element = element;
        let mut version = None;

        for (index, field) in data.split(element).enumerate() {
            match index {
                11 => {
                    if let Some(c) = field.chars().next() {
                        delimiters.repetition = c;
                    }
                }
                12 => version = Some(field.to_string()),
                16 => {
                    let mut chars = field.chars();
                    if let Some(component) = chars.next() {
                        delimiters.component = component;
                    }
                    if let Some(terminator) = chars.next() {
                        let mut segment = String::from(terminator);
                        // CR/LF bytes after the declared terminator extend it
                        segment.extend(chars.take(2).filter(|c| matches!(c, '\r' | '\n')));
                        delimiters.segment = segment;
                    }
                    break;
                }
                _ => {}
            }
        }

        Ok(EnvelopeInfo {
            delimiters,
            version,
        })
    }

    /// Parses a full interchange: envelope pre-processing, the required
    /// envelope check, then the schema walk. Returns the first-seen
    /// segment order alongside the document map.
    pub fn parse(&self, data: &str) -> Result<(Vec<String>, EdiValue), EdiError> {
        let envelope = self.read_envelope(data)?;
        let segments: Vec<&str> = data.split(envelope.delimiters.segment.as_str()).collect();
        self.parse_segments(&segments, &envelope.delimiters)
    }

    /// Parses a bare transaction body (no ISA/IEA required) with the
    /// configured delimiters. ST must still be present so the transaction
    /// set can be identified.
    pub fn parse_transaction(&self, data: &str) -> Result<(Vec<String>, EdiValue), EdiError> {
        let segments: Vec<&str> = data.split(self.delimiters.segment.as_str()).collect();
        let set_id = self.transaction_set_for(&segments, &self.delimiters)?;
        self.walk_segments(&segments, &self.delimiters, &set_id)
    }

    /// Parses an envelope holding multiple ST/SE pairs coordinated by
    /// GS/GE. Each pair is re-parsed inside a synthetic sub-stream that
    /// keeps the envelope context around it.
    pub fn parse_set_group(&self, data: &str) -> Result<Vec<(Vec<String>, EdiValue)>, EdiError> {
        let envelope = self.read_envelope(data)?;
        let delimiters = &envelope.delimiters;
        let segments: Vec<&str> = data.split(delimiters.segment.as_str()).collect();

        let declared = self.read_group_count(&segments, delimiters)?;
        let pairs = st_se_pairs(&segments, delimiters);
        if pairs.is_empty() {
            return Err(EdiError::MissingSt);
        }
        if let Some(declared) = declared {
            if pairs.len() != declared {
                return Err(EdiError::MissingEnvelopeTrailer(format!(
                    "ST/SE segment pairs found: {}, does not match count in GE: {}",
                    pairs.len(),
                    declared
                )));
            }
        }

        let first_st = pairs[0].0;
        let last_se = pairs[pairs.len() - 1].1;

        let mut sets = Vec::with_capacity(pairs.len());
        for (st_index, se_index) in pairs {
            let mut sub_stream: Vec<&str> = Vec::new();
            sub_stream.extend(&segments[..first_st]);
            if st_index <= se_index {
                sub_stream.extend(&segments[st_index..=se_index]);
            }
            sub_stream.extend(&segments[last_se + 1..]);
            sets.push(self.parse_segments(&sub_stream, delimiters)?);
        }
        Ok(sets)
    }

    /// The envelope check plus the walk: ST is required (and names the
    /// transaction set unless preselected), and IEA/SE must both be
    /// present.
    fn parse_segments(
        &self,
        segments: &[&str],
        delimiters: &Delimiters,
    ) -> Result<(Vec<String>, EdiValue), EdiError> {
        let by_id: HashMap<&str, &str> = segments
            .iter()
            .map(|segment| (head_of(segment, delimiters), *segment))
            .collect();
        if !by_id.contains_key("ST") {
            return Err(EdiError::MissingSt);
        }
        let set_id = self.transaction_set_for(segments, delimiters)?;

        for trailer in ["IEA", "SE"] {
            if !by_id.contains_key(trailer) {
                return Err(EdiError::MissingEnvelopeTrailer(format!(
                    "EDI data missing required segment '{}'",
                    trailer
                )));
            }
        }

        self.walk_segments(segments, delimiters, &set_id)
    }

    /// Resolves the transaction-set id: the preselected one, or ST01.
    fn transaction_set_for(
        &self,
        segments: &[&str],
        delimiters: &Delimiters,
    ) -> Result<String, EdiError> {
        if let Some(set_id) = &self.transaction_set {
            return Ok(set_id.clone());
        }
        let st = segments
            .iter()
            .find(|segment| head_of(segment, delimiters) == "ST")
            .ok_or(EdiError::MissingSt)?;
        st.split(delimiters.element)
            .nth(1)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(EdiError::MissingSt)
    }

    /// Scans for the GS/GE pair and returns GE01, the declared ST/SE pair
    /// count. GE without a preceding GS is a broken envelope.
    fn read_group_count(
        &self,
        segments: &[&str],
        delimiters: &Delimiters,
    ) -> Result<Option<usize>, EdiError> {
        let mut gs_found = false;
        for segment in segments {
            let mut fields = segment.split(delimiters.element);
            match fields.next() {
                Some("GS") => gs_found = true,
                Some("GE") => {
                    if !gs_found {
                        return Err(EdiError::BadEnvelope(
                            "EDI data contains GE segment with no matching GS".to_string(),
                        ));
                    }
                    let count = fields
                        .next()
                        .and_then(|raw| raw.trim().parse::<usize>().ok())
                        .ok_or_else(|| {
                            EdiError::BadEnvelope(
                                "GE segment has no parsable set count".to_string(),
                            )
                        })?;
                    return Ok(Some(count));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Consumes segments left-to-right against the schema. Each head
    /// segment is matched as a single segment, a repeating segment, or the
    /// start of a loop; anything else is skipped with a warning.
    fn walk_segments(
        &self,
        segments: &[&str],
        delimiters: &Delimiters,
        set_id: &str,
    ) -> Result<(Vec<String>, EdiValue), EdiError> {
        let schema = self
            .registry
            .get(set_id)
            .ok_or_else(|| EdiError::UnknownTransactionSet(set_id.to_string()))?;

        let mut order: Vec<String> = Vec::new();
        let mut document: IndexMap<String, EdiValue> = IndexMap::new();
        let mut rest = segments;

        while let Some(&segment) = rest.first() {
            if segment.is_empty() {
                rest = &rest[1..];
                continue;
            }
            let head = head_of(segment, delimiters);

            let mut matched: Option<(String, EdiValue)> = None;
            for node in schema {
                match node {
                    SchemaNode::Segment(seg) if seg.id == head && !seg.allows_multiples() => {
                        matched =
                            Some((seg.id.clone(), self.parse_segment(segment, seg, delimiters)?));
                        rest = &rest[1..];
                        break;
                    }
                    SchemaNode::Segment(seg) if seg.id == head => {
                        let (value, remaining) =
                            self.parse_repeating_segment(rest, seg, delimiters)?;
                        matched = Some((seg.id.clone(), value));
                        rest = remaining;
                        break;
                    }
                    SchemaNode::Loop(lp) if is_loop_of(&lp.id, head) => {
                        let (value, remaining) = self.parse_loop(rest, lp, delimiters)?;
                        matched = Some((lp.id.clone(), value));
                        rest = remaining;
                        break;
                    }
                    _ => {}
                }
            }

            let Some((name, value)) = matched else {
                warn!(segment = %segment, "unrecognized segment, skipping");
                rest = &rest[1..];
                continue;
            };

            if let Some(existing) = document.get_mut(&name) {
                // tolerant decoding: promote to a list and append; the
                // validator reports the cardinality violation separately
                if !matches!(existing, EdiValue::List(_)) {
                    let previous = std::mem::replace(existing, EdiValue::List(Vec::new()));
                    if let EdiValue::List(items) = existing {
                        items.push(previous);
                    }
                }
                if let EdiValue::List(items) = existing {
                    match value {
                        EdiValue::List(new_items) => items.extend(new_items),
                        other => items.push(other),
                    }
                }
            } else {
                order.push(name.clone());
                document.insert(name, value);
            }
        }

        Ok((order, EdiValue::Map(document)))
    }

    /// Parses one segment into a map keyed by element id.
    fn parse_segment(
        &self,
        segment: &str,
        schema: &SegmentSchema,
        delimiters: &Delimiters,
    ) -> Result<EdiValue, EdiError> {
        let fields: Vec<&str> = segment.split(delimiters.element).collect();
        if fields[0] != schema.id {
            return Err(EdiError::SegmentMismatch {
                found: fields[0].to_string(),
                expected: schema.id.clone(),
            });
        }
        if fields.len() - 1 > schema.elements.len() {
            return Err(EdiError::TooManyElements {
                segment: schema.id.clone(),
                expected: schema.elements.len(),
                found: fields.len() - 1,
            });
        }

        let mut parsed: IndexMap<String, EdiValue> = IndexMap::new();
        for (field, element) in fields[1..].iter().zip(&schema.elements) {
            match element {
                ElementNode::Element(e) => {
                    parsed.insert(e.id.clone(), self.parse_element(field, e)?);
                }
                ElementNode::Composite(composite) => {
                    let mut sub_elements: IndexMap<String, EdiValue> = IndexMap::new();
                    for (sub_field, sub_schema) in
                        field.split(delimiters.component).zip(&composite.elements)
                    {
                        sub_elements.insert(
                            sub_schema.id.clone(),
                            self.parse_element(sub_field, sub_schema)?,
                        );
                    }
                    parsed.insert(composite.id.clone(), EdiValue::Map(sub_elements));
                }
            }
        }
        Ok(EdiValue::Map(parsed))
    }

    /// Converts one payload field per its declared data type.
    fn parse_element(&self, field: &str, element: &ElementSchema) -> Result<EdiValue, EdiError> {
        let convert_error = || EdiError::UnknownDataType {
            value: field.to_string(),
            data_type: element.data_type.to_string(),
        };

        let value = match element.data_type {
            DataType::DT => match field.len() {
                8 => EdiValue::Date(
                    NaiveDate::parse_from_str(field, "%Y%m%d").map_err(|_| convert_error())?,
                ),
                6 => EdiValue::Date(
                    NaiveDate::parse_from_str(field, "%y%m%d").map_err(|_| convert_error())?,
                ),
                0 => EdiValue::Null,
                _ => EdiValue::Str(field.to_string()),
            },
            DataType::TM => match field.len() {
                4 => EdiValue::Time(
                    NaiveTime::parse_from_str(field, "%H%M").map_err(|_| convert_error())?,
                ),
                6 => EdiValue::Time(
                    NaiveTime::parse_from_str(field, "%H%M%S").map_err(|_| convert_error())?,
                ),
                _ => EdiValue::Null,
            },
            DataType::N(places) => {
                if field.is_empty() {
                    EdiValue::Null
                } else if places == 0 {
                    EdiValue::Int(field.parse().map_err(|_| convert_error())?)
                } else if field.contains('.') {
                    // N-type wire form carries an implicit decimal; an
                    // explicit point would silently mis-scale the value
                    return Err(convert_error());
                } else {
                    let raw: i64 = field.parse().map_err(|_| convert_error())?;
                    EdiValue::Real(raw as f64 / 10f64.powi(places as i32))
                }
            }
            DataType::R => {
                if field.is_empty() {
                    EdiValue::Null
                } else {
                    EdiValue::Real(field.parse().map_err(|_| convert_error())?)
                }
            }
            DataType::AN | DataType::ID => {
                if field.is_empty() {
                    EdiValue::Null
                } else {
                    EdiValue::Str(field.to_string())
                }
            }
            DataType::Empty => EdiValue::Str(field.to_string()),
        };
        Ok(value)
    }

    /// Consumes every consecutive occurrence of one segment id.
    fn parse_repeating_segment<'s>(
        &self,
        segments: &'s [&'s str],
        schema: &SegmentSchema,
        delimiters: &Delimiters,
    ) -> Result<(EdiValue, &'s [&'s str]), EdiError> {
        let mut parsed = Vec::new();
        let mut rest = segments;
        while let Some(&segment) = rest.first() {
            if head_of(segment, delimiters) != schema.id {
                break;
            }
            parsed.push(self.parse_segment(segment, schema, delimiters)?);
            rest = &rest[1..];
        }
        Ok((EdiValue::List(parsed), rest))
    }

    /// Accumulates loop iterations. A new iteration begins when the head
    /// segment matches the loop's first child and the current accumulator
    /// already holds data; the loop ends at the first segment no child
    /// matches, returning the unconsumed remainder to the caller.
    fn parse_loop<'s>(
        &self,
        segments: &'s [&'s str],
        schema: &LoopSchema,
        delimiters: &Delimiters,
    ) -> Result<(EdiValue, &'s [&'s str]), EdiError> {
        let first_child_id = schema
            .segments
            .first()
            .map(SchemaNode::id)
            .ok_or_else(|| {
                EdiError::InvalidSchema(format!("loop '{}' has no segments", schema.id))
            })?;

        let mut iterations: Vec<EdiValue> = Vec::new();
        let mut current: IndexMap<String, EdiValue> = IndexMap::new();
        let mut rest = segments;

        while let Some(&segment) = rest.first() {
            let head = head_of(segment, delimiters);

            let mut matched: Option<(String, EdiValue)> = None;
            for child in &schema.segments {
                match child {
                    SchemaNode::Segment(seg) if seg.id == head && !seg.allows_multiples() => {
                        matched =
                            Some((seg.id.clone(), self.parse_segment(segment, seg, delimiters)?));
                        rest = &rest[1..];
                        break;
                    }
                    SchemaNode::Segment(seg) if seg.id == head => {
                        let (value, remaining) =
                            self.parse_repeating_segment(rest, seg, delimiters)?;
                        matched = Some((seg.id.clone(), value));
                        rest = remaining;
                        break;
                    }
                    SchemaNode::Loop(nested) if is_loop_of(&nested.id, head) => {
                        let (value, remaining) = self.parse_loop(rest, nested, delimiters)?;
                        matched = Some((nested.id.clone(), value));
                        rest = remaining;
                        break;
                    }
                    _ => {}
                }
            }

            let Some((name, value)) = matched else {
                // no child matches: the loop is over
                break;
            };

            if name == first_child_id && !current.is_empty() {
                iterations.push(EdiValue::Map(std::mem::take(&mut current)));
            }
            current.insert(name, value);
        }

        if !current.is_empty() {
            iterations.push(EdiValue::Map(current));
        }
        Ok((EdiValue::List(iterations), rest))
    }
}

fn head_of<'s>(segment: &'s str, delimiters: &Delimiters) -> &'s str {
    segment.split(delimiters.element).next().unwrap_or("")
}

/// Collects `(st_index, se_index)` pairs in stream order.
fn st_se_pairs(segments: &[&str], delimiters: &Delimiters) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut st_index: Option<usize> = None;
    let mut se_index: Option<usize> = None;
    for (index, segment) in segments.iter().enumerate() {
        match head_of(segment, delimiters) {
            "ST" => st_index = Some(index),
            "SE" => se_index = Some(index),
            _ => {}
        }
        if let (Some(st), Some(se)) = (st_index, se_index) {
            pairs.push((st, se));
            st_index = None;
            se_index = None;
        }
    }
    pairs
}

fn preview(data: &str) -> String {
    data.chars().take(24).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistryBuilder;
    use assert_matches::assert_matches;

    fn minimal_registry() -> SchemaRegistry {
        let mut builder = SchemaRegistryBuilder::new();
        builder
            .add_format_json(
                "810",
                r#"[
                    {"type": "segment", "id": "ST", "req": "M", "max_uses": 1, "elements": [
                        {"type": "element", "id": "ST01", "req": "M", "data_type": "ID",
                         "length": {"min": 3, "max": 3}},
                        {"type": "element", "id": "ST02", "req": "M", "data_type": "AN",
                         "length": {"min": 4, "max": 9}}
                    ]},
                    {"type": "segment", "id": "BIG", "req": "M", "max_uses": 1, "elements": [
                        {"type": "element", "id": "BIG01", "req": "M", "data_type": "DT",
                         "length": {"min": 8, "max": 8}},
                        {"type": "element", "id": "BIG02", "req": "M", "data_type": "AN",
                         "length": {"min": 1, "max": 22}}
                    ]},
                    {"type": "segment", "id": "SE", "req": "M", "max_uses": 1, "elements": [
                        {"type": "element", "id": "SE01", "req": "M", "data_type": "N0",
                         "length": {"min": 1, "max": 10}},
                        {"type": "element", "id": "SE02", "req": "M", "data_type": "AN",
                         "length": {"min": 4, "max": 9}}
                    ]}
                ]"#,
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_parse_transaction_body() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        let (order, document) = decoder
            .parse_transaction("ST^810^000000001\nBIG^20200101^INV001\nSE^2^000000001\n")
            .unwrap();

        assert_eq!(order, vec!["ST", "BIG", "SE"]);
        let map = document.as_map().unwrap();
        let st = map.get("ST").unwrap().as_map().unwrap();
        assert_eq!(st.get("ST01"), Some(&EdiValue::Str("810".into())));
        let big = map.get("BIG").unwrap().as_map().unwrap();
        assert_eq!(
            big.get("BIG01"),
            Some(&EdiValue::Date(
                NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
            ))
        );
        let se = map.get("SE").unwrap().as_map().unwrap();
        assert_eq!(se.get("SE01"), Some(&EdiValue::Int(2)));
    }

    #[test]
    fn test_parse_transaction_requires_st() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        let result = decoder.parse_transaction("BIG^20200101^INV001\n");
        assert_matches!(result, Err(EdiError::MissingSt));
    }

    #[test]
    fn test_bad_envelope() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        assert_matches!(
            decoder.parse("INVALID^DATA^HERE~"),
            Err(EdiError::BadEnvelope(_))
        );
    }

    #[test]
    fn test_read_envelope_delimiters() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        let isa = "ISA*00*          *00*          *01*SENDERID     *01*RECEIVERID   *230101*1253*U*00401*000000001*0*T*:~GS*IN*S*R*20230101*1253*1*X*004010~";
        let envelope = decoder.read_envelope(isa).unwrap();
        assert_eq!(envelope.delimiters.element, '*');
        assert_eq!(envelope.delimiters.component, ':');
        assert_eq!(envelope.delimiters.segment, "~");
        assert_eq!(envelope.version.as_deref(), Some("00401"));
    }

    #[test]
    fn test_read_envelope_crlf_terminator() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        let isa = "ISA*00*          *00*          *01*SENDERID     *01*RECEIVERID   *230101*1253*U*00401*000000001*0*T*:~\r\nGS*IN*S*R~\r\n";
        let envelope = decoder.read_envelope(isa).unwrap();
        assert_eq!(envelope.delimiters.segment, "~\r\n");
    }

    #[test]
    fn test_unknown_segments_are_skipped() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        let (order, _) = decoder
            .parse_transaction(
                "ST^810^000000001\nZZZ^vendor^extension\nBIG^20200101^INV001\nSE^2^000000001\n",
            )
            .unwrap();
        assert_eq!(order, vec!["ST", "BIG", "SE"]);
    }

    #[test]
    fn test_segment_with_too_many_elements() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        let result = decoder
            .parse_transaction("ST^810^000000001\nBIG^20200101^INV001^X^Y^Z\nSE^2^000000001\n");
        assert_matches!(
            result,
            Err(EdiError::TooManyElements { segment, expected: 2, found: 5 }) if segment == "BIG"
        );
    }

    #[test]
    fn test_n_type_rejects_explicit_decimal_point() {
        let mut builder = SchemaRegistryBuilder::new();
        builder
            .add_format_json(
                "810",
                r#"[
                    {"type": "segment", "id": "ST", "req": "M", "max_uses": 1, "elements": [
                        {"type": "element", "id": "ST01", "req": "M", "data_type": "AN",
                         "length": {"min": 3, "max": 3}}
                    ]},
                    {"type": "segment", "id": "TDS", "req": "M", "max_uses": 1, "elements": [
                        {"type": "element", "id": "TDS01", "req": "M", "data_type": "N2",
                         "length": {"min": 1, "max": 10}}
                    ]}
                ]"#,
            )
            .unwrap();
        let registry = builder.build().unwrap();
        let decoder = X12Decoder::new(&registry).with_transaction_set("810");

        let (_, document) = decoder.parse_transaction("ST^810\nTDS^1050\n").unwrap();
        let tds = document.as_map().unwrap().get("TDS").unwrap().as_map().unwrap();
        assert_eq!(tds.get("TDS01"), Some(&EdiValue::Real(10.5)));

        let result = decoder.parse_transaction("ST^810\nTDS^10.50\n");
        assert_matches!(result, Err(EdiError::UnknownDataType { .. }));
    }

    #[test]
    fn test_same_id_collision_promotes_to_list() {
        let registry = minimal_registry();
        let decoder = X12Decoder::new(&registry);
        let (order, document) = decoder
            .parse_transaction(
                "ST^810^000000001\nBIG^20200101^INV001\nZZZ^x\nBIG^20200102^INV002\nSE^2^000000001\n",
            )
            .unwrap();
        // first-seen order is preserved; the second BIG merges into the first
        assert_eq!(order, vec!["ST", "BIG", "SE"]);
        let big = document.as_map().unwrap().get("BIG").unwrap();
        let items = big.as_list().unwrap();
        assert_eq!(items.len(), 2);
    }
}
