use indexmap::IndexMap;

use crate::models::EdiValue;
use crate::schema::{
    CodeListRef, CompositeSchema, DataType, ElementNode, ElementSchema, LoopSchema, SchemaNode,
    SegmentSchema, SyntaxRule, SyntaxRuleKind,
};
use crate::utils::{element_name, find_schema};
use crate::validation::{ValidationError, ValidationErrorKind};

const REQUIRED_ENVELOPE_SEGMENTS: [&str; 4] = ["ISA", "ST", "SE", "IEA"];

/// Checks an already-decoded document against a transaction-set schema.
///
/// Unlike the codec, the validator never aborts: it walks the whole tree
/// and returns every finding, so a caller can report all problems in one
/// round trip.
#[derive(Debug, Default)]
pub struct EdiValidator;

impl EdiValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, document: &EdiValue, schema: &[SchemaNode]) -> Vec<ValidationError> {
        let mut session = Session::default();

        if let EdiValue::Map(map) = document {
            for required in REQUIRED_ENVELOPE_SEGMENTS {
                if !map.contains_key(required) {
                    session.add(
                        ValidationErrorKind::MissingRequiredSegment,
                        required,
                        Some(required),
                        "required segment not found",
                    );
                }
            }
        }

        session.validate_children(document, schema);
        session.errors
    }
}

#[derive(Default)]
struct Session {
    errors: Vec<ValidationError>,
}

impl Session {
    fn add(
        &mut self,
        kind: ValidationErrorKind,
        name: &str,
        segment: Option<&str>,
        message: impl Into<String>,
    ) {
        self.errors.push(ValidationError {
            kind,
            name: name.to_string(),
            segment: segment.map(str::to_string),
            message: message.into(),
        });
    }

    /// Walks a map of segment/loop entries (the document top level or one
    /// loop iteration) against a schema node list.
    fn validate_children(&mut self, children: &EdiValue, schemas: &[SchemaNode]) {
        match children {
            EdiValue::Map(map) => {
                self.validate_required(map, schemas);
                for (name, data) in map {
                    match find_schema(schemas, name) {
                        Some(SchemaNode::Segment(segment)) => {
                            self.validate_segment(name, data, segment);
                        }
                        Some(SchemaNode::Loop(lp)) => {
                            self.validate_loop(name, data, lp);
                            self.validate_children(data, &lp.segments);
                        }
                        Some(SchemaNode::Placeholder(_)) => {
                            self.add(
                                ValidationErrorKind::MalformedDocument,
                                name,
                                None,
                                "schema still contains an unresolved placeholder",
                            );
                        }
                        None => {
                            if !data.is_empty() {
                                self.add(
                                    ValidationErrorKind::UnexpectedChild,
                                    name,
                                    None,
                                    "found unexpected child for schema list",
                                );
                            }
                        }
                    }
                }
            }
            EdiValue::List(items) => {
                for each in items {
                    self.validate_children(each, schemas);
                }
            }
            other => {
                self.add(
                    ValidationErrorKind::MalformedDocument,
                    other.type_name(),
                    None,
                    "children must be a map or a list",
                );
            }
        }
    }

    /// Every mandatory segment or loop in the schema list must be present.
    fn validate_required(&mut self, children: &IndexMap<String, EdiValue>, schemas: &[SchemaNode]) {
        for node in schemas {
            let mandatory = match node {
                SchemaNode::Segment(segment) => segment.req.is_mandatory(),
                SchemaNode::Loop(lp) => lp.req.is_mandatory(),
                SchemaNode::Placeholder(_) => false,
            };
            if mandatory && !children.contains_key(node.id()) {
                let kind = match node {
                    SchemaNode::Loop(_) => ValidationErrorKind::MissingRequiredLoop,
                    _ => ValidationErrorKind::MissingRequiredSegment,
                };
                self.add(
                    kind,
                    node.id(),
                    None,
                    format!("missing required {}", match node {
                        SchemaNode::Loop(_) => "loop",
                        _ => "segment",
                    }),
                );
            }
        }
    }

    fn validate_loop(&mut self, loop_id: &str, data: &EdiValue, schema: &LoopSchema) {
        let EdiValue::List(iterations) = data else {
            self.add(
                ValidationErrorKind::MalformedDocument,
                loop_id,
                None,
                format!("loop data must be a list, found {}", data.type_name()),
            );
            return;
        };
        if schema.repeat > -1 && iterations.len() > schema.repeat as usize {
            self.add(
                ValidationErrorKind::TooManyRepetitions,
                loop_id,
                None,
                format!(
                    "loop repeats {} times, max allowed is {}",
                    iterations.len(),
                    schema.repeat
                ),
            );
        }
    }

    fn validate_segment(&mut self, seg_id: &str, data: &EdiValue, schema: &SegmentSchema) {
        match data {
            EdiValue::List(occurrences) => {
                if schema.max_uses > -1 && occurrences.len() > schema.max_uses as usize {
                    self.add(
                        ValidationErrorKind::TooManyRepetitions,
                        seg_id,
                        Some(seg_id),
                        format!(
                            "segment repeats {} times, max allowed is {}",
                            occurrences.len(),
                            schema.max_uses
                        ),
                    );
                }
                for occurrence in occurrences {
                    self.validate_single_segment(seg_id, occurrence, schema);
                }
            }
            _ => self.validate_single_segment(seg_id, data, schema),
        }
    }

    fn validate_single_segment(&mut self, seg_id: &str, data: &EdiValue, schema: &SegmentSchema) {
        let EdiValue::Map(elements) = data else {
            self.add(
                ValidationErrorKind::MalformedDocument,
                seg_id,
                Some(seg_id),
                format!("segment data must be a map, found {}", data.type_name()),
            );
            return;
        };

        if elements.len() > schema.elements.len() {
            self.add(
                ValidationErrorKind::TooManyElements,
                seg_id,
                Some(seg_id),
                format!(
                    "segment contains more elements than definition; defined: {}, found: {}",
                    schema.elements.len(),
                    elements.len()
                ),
            );
        }

        for rule in &schema.syntax {
            self.validate_syntax_rule(seg_id, elements, rule);
        }

        for (name, value) in elements {
            match schema.find_element(name) {
                Some(ElementNode::Element(element)) => {
                    self.validate_element(Some(seg_id), name, value, element);
                }
                Some(ElementNode::Composite(composite)) => {
                    self.validate_composite(seg_id, name, value, composite);
                }
                None => {
                    self.add(
                        ValidationErrorKind::UnexpectedChild,
                        name,
                        Some(seg_id),
                        "element not defined in segment",
                    );
                }
            }
        }
    }

    /// Syntax rules address one-based element slots by their `SSSnn` name
    /// in the map-shaped segment.
    fn validate_syntax_rule(
        &mut self,
        seg_id: &str,
        elements: &IndexMap<String, EdiValue>,
        rule: &SyntaxRule,
    ) {
        let filled = |idx: usize| {
            elements
                .get(&element_name(seg_id, idx))
                .map_or(false, |value| !value.is_empty())
        };
        let criteria_names = || {
            rule.criteria
                .iter()
                .map(|&idx| element_name(seg_id, idx))
                .collect::<Vec<_>>()
                .join(", ")
        };

        match rule.rule {
            SyntaxRuleKind::AtLeastOne => {
                if !rule.criteria.iter().any(|&idx| filled(idx)) {
                    self.add(
                        ValidationErrorKind::SyntaxViolation,
                        seg_id,
                        Some(seg_id),
                        format!("at least one of {} is required", criteria_names()),
                    );
                }
            }
            SyntaxRuleKind::AllOrNone => {
                let found = rule.criteria.iter().filter(|&&idx| filled(idx)).count();
                if found > 0 && found < rule.criteria.len() {
                    self.add(
                        ValidationErrorKind::SyntaxViolation,
                        seg_id,
                        Some(seg_id),
                        format!("if one of {} is present, all are required", criteria_names()),
                    );
                }
            }
            SyntaxRuleKind::IfAtLeastOne => {
                let Some(&first) = rule.criteria.first() else {
                    return;
                };
                if filled(first) && !rule.criteria[1..].iter().any(|&idx| filled(idx)) {
                    self.add(
                        ValidationErrorKind::SyntaxViolation,
                        seg_id,
                        Some(seg_id),
                        format!(
                            "if {} is present, at least one of {} is required",
                            element_name(seg_id, first),
                            criteria_names()
                        ),
                    );
                }
            }
        }
    }

    fn validate_composite(
        &mut self,
        seg_id: &str,
        name: &str,
        value: &EdiValue,
        composite: &CompositeSchema,
    ) {
        let EdiValue::Map(sub_elements) = value else {
            if !value.is_empty() {
                self.add(
                    ValidationErrorKind::MalformedDocument,
                    name,
                    Some(seg_id),
                    format!("composite data must be a map, found {}", value.type_name()),
                );
            }
            return;
        };
        for (sub_name, sub_value) in sub_elements {
            match composite.elements.iter().find(|e| &e.id == sub_name) {
                Some(sub_schema) => {
                    self.validate_element(Some(seg_id), sub_name, sub_value, sub_schema);
                }
                None => {
                    self.add(
                        ValidationErrorKind::UnexpectedChild,
                        sub_name,
                        Some(seg_id),
                        "sub-element not defined in composite",
                    );
                }
            }
        }
    }

    fn validate_element(
        &mut self,
        seg_id: Option<&str>,
        name: &str,
        value: &EdiValue,
        schema: &ElementSchema,
    ) {
        if value.is_null() {
            if schema.req.is_mandatory() {
                self.add(
                    ValidationErrorKind::MissingRequiredElement,
                    name,
                    seg_id,
                    "element is mandatory",
                );
            }
            return;
        }

        let min_len = schema.length.min;
        let max_len = schema.length.max;

        match schema.data_type {
            DataType::DT => {
                if !matches!(max_len, 6 | 8) {
                    self.add(
                        ValidationErrorKind::InvalidLength,
                        name,
                        seg_id,
                        format!("invalid length ({}) for date field", max_len),
                    );
                }
                if !matches!(value, EdiValue::Date(_)) {
                    self.add(
                        ValidationErrorKind::InvalidDataType,
                        name,
                        seg_id,
                        format!("invalid data type ({}) for date field", value.type_name()),
                    );
                }
            }
            DataType::TM => {
                if !matches!(max_len, 4 | 6 | 7 | 8) {
                    self.add(
                        ValidationErrorKind::InvalidLength,
                        name,
                        seg_id,
                        format!("invalid length ({}) for time field", max_len),
                    );
                }
                if !matches!(value, EdiValue::Time(_)) {
                    self.add(
                        ValidationErrorKind::InvalidDataType,
                        name,
                        seg_id,
                        format!("invalid data type ({}) for time field", value.type_name()),
                    );
                }
            }
            DataType::R => {
                if !matches!(value, EdiValue::Real(_)) {
                    self.add(
                        ValidationErrorKind::InvalidDataType,
                        name,
                        seg_id,
                        format!("invalid data type ({}) for decimal field", value.type_name()),
                    );
                }
            }
            DataType::N(_) => {
                if !matches!(value, EdiValue::Int(_) | EdiValue::Real(_)) {
                    self.add(
                        ValidationErrorKind::InvalidDataType,
                        name,
                        seg_id,
                        format!("invalid data type ({}) for number field", value.type_name()),
                    );
                }
            }
            DataType::ID => {
                if let Some(CodeListRef::Codes(codes)) = &schema.data_type_ids {
                    // some id fields have no associated lookup table
                    if !codes.is_empty() && !codes.contains_key(&value.display()) {
                        self.add(
                            ValidationErrorKind::InvalidCodeValue,
                            name,
                            seg_id,
                            format!("invalid data value '{}' for id field", value.display()),
                        );
                    }
                }
            }
            DataType::AN | DataType::Empty => {}
        }

        // date/time types carry their length in the declared format
        if !matches!(schema.data_type, DataType::DT | DataType::TM) {
            let data_len = value.display().chars().count();
            if matches!(schema.data_type, DataType::N(_)) {
                // numeric data is left zero-padded, so only the max applies
                if data_len > max_len {
                    self.add(
                        ValidationErrorKind::InvalidLength,
                        name,
                        seg_id,
                        format!("element data length {} greater than {}", data_len, max_len),
                    );
                }
            } else if data_len < min_len || data_len > max_len {
                self.add(
                    ValidationErrorKind::InvalidLength,
                    name,
                    seg_id,
                    format!(
                        "element data length {} outside range of {} to {}",
                        data_len, min_len, max_len
                    ),
                );
            }
        }
    }
}
