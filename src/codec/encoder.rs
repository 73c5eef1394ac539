use indexmap::IndexMap;

use crate::error::EdiError;
use crate::models::{Delimiters, EdiValue};
use crate::schema::{
    CompositeSchema, DataType, ElementNode, ElementSchema, LoopSchema, Requirement, SchemaNode,
    SchemaRegistry, SegmentSchema, SyntaxRule, SyntaxRuleKind,
};
use crate::utils::element_name;

/// Compiles a positional-shape document into an X12 message.
///
/// The walk is fail-fast: the first structural or schema violation aborts
/// with an [`EdiError`] naming the offending segment and, where it applies,
/// the originating element.
#[derive(Debug, Clone)]
pub struct X12Encoder<'a> {
    registry: &'a SchemaRegistry,
    delimiters: Delimiters,
}

impl<'a> X12Encoder<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            delimiters: Delimiters::default(),
        }
    }

    /// Replaces the default delimiters. The component separator may still
    /// be overridden mid-build by an ISA16 element.
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Compiles a transaction set into an EDI message. The transaction-set
    /// id is read from the first positional value of the document's `ST`
    /// entry and must name a registered schema.
    pub fn build(&self, document: &EdiValue) -> Result<String, EdiError> {
        self.delimiters.validate()?;

        let data = document.as_map().ok_or_else(|| {
            EdiError::MalformedDocument(format!(
                "document must be a map of segments, found {}",
                document.type_name()
            ))
        })?;

        let set_id = transaction_set_id(data)?;
        let schema = self
            .registry
            .get(&set_id)
            .ok_or_else(|| EdiError::UnknownTransactionSet(set_id.clone()))?;

        let mut state = EncodeState {
            delimiters: self.delimiters.clone(),
            segments: Vec::new(),
        };

        for node in schema {
            match node {
                SchemaNode::Segment(segment) => match present(data, &segment.id) {
                    Some(value) => state.build_segment_list(segment, value)?,
                    None if segment.req.is_mandatory() => {
                        return Err(EdiError::MissingMandatorySegment(segment.id.clone()))
                    }
                    None => continue,
                },
                SchemaNode::Loop(lp) => state.build_loop(lp, data)?,
                SchemaNode::Placeholder(placeholder) => {
                    return Err(EdiError::PlaceholderUnresolved {
                        format: set_id.clone(),
                        placeholder: placeholder.id.clone(),
                        replacement: placeholder
                            .replacement
                            .clone()
                            .unwrap_or_else(|| placeholder.id.clone()),
                    })
                }
            }
        }

        let mut output = state.segments.join(&state.delimiters.segment);
        output.push_str(&state.delimiters.segment);
        Ok(output)
    }
}

/// Reads the transaction-set id from the document's `ST` entry.
fn transaction_set_id(data: &IndexMap<String, EdiValue>) -> Result<String, EdiError> {
    let st = present(data, "ST")
        .ok_or_else(|| EdiError::MissingMandatorySegment("ST".to_string()))?;
    let elements = st.as_list().ok_or_else(|| {
        EdiError::MalformedDocument("segment 'ST' payload must be a positional list".to_string())
    })?;
    match elements.first() {
        Some(value) if !value.is_empty() => Ok(value.display()),
        _ => Err(EdiError::MissingMandatoryElement {
            element: "ST01".to_string(),
            name: "Transaction Set Identifier Code".to_string(),
        }),
    }
}

/// A document entry counts as present only when it holds data; null and
/// empty placeholders created by scaffolding are treated as absent.
fn present<'v>(data: &'v IndexMap<String, EdiValue>, id: &str) -> Option<&'v EdiValue> {
    data.get(id).filter(|value| !value.is_empty())
}

/// Per-build mutable state: emitted lines plus the working delimiters,
/// which ISA16 may update while the envelope is being written.
struct EncodeState {
    delimiters: Delimiters,
    segments: Vec<String>,
}

impl EncodeState {
    /// Emits one or more occurrences of a segment. A single occurrence is a
    /// list of scalars; repetition is a list of such lists bounded by
    /// `max_uses`.
    fn build_segment_list(
        &mut self,
        segment: &SegmentSchema,
        data: &EdiValue,
    ) -> Result<(), EdiError> {
        let items = data.as_list().ok_or_else(|| {
            EdiError::MalformedDocument(format!(
                "segment '{}' payload must be a positional list",
                segment.id
            ))
        })?;

        let repeated = matches!(items.first(), Some(EdiValue::List(_)));
        if !repeated {
            return self.build_segment(segment, items);
        }

        if segment.max_uses > -1 && items.len() > segment.max_uses as usize {
            return Err(EdiError::TooManyRepetitions {
                id: segment.id.clone(),
                max: segment.max_uses,
                found: items.len(),
            });
        }
        for entry in items {
            let elements = entry.as_list().ok_or_else(|| {
                EdiError::MalformedDocument(format!(
                    "repeated segment '{}' must have elements in a list, found {}",
                    segment.id,
                    entry.type_name()
                ))
            })?;
            self.build_segment(segment, elements)?;
        }
        Ok(())
    }

    /// Emits every iteration of a loop. A missing loop is only an error
    /// when one of its direct children is mandatory.
    fn build_loop(
        &mut self,
        lp: &LoopSchema,
        data: &IndexMap<String, EdiValue>,
    ) -> Result<(), EdiError> {
        let Some(loop_data) = present(data, &lp.id) else {
            let mandatory: Vec<&str> = lp
                .segments
                .iter()
                .filter(|child| child.req().is_mandatory())
                .map(|child| child.id())
                .collect();
            if mandatory.is_empty() {
                return Ok(());
            }
            return Err(EdiError::MissingMandatoryLoop {
                loop_id: lp.id.clone(),
                segments: mandatory.join(", "),
            });
        };

        let iterations = loop_data.as_list().ok_or_else(|| {
            EdiError::MalformedDocument(format!(
                "loop '{}' payload must be a list of iterations",
                lp.id
            ))
        })?;
        if lp.repeat > -1 && iterations.len() > lp.repeat as usize {
            return Err(EdiError::TooManyRepetitions {
                id: lp.id.clone(),
                max: lp.repeat,
                found: iterations.len(),
            });
        }

        for iteration in iterations {
            let iteration = iteration.as_map().ok_or_else(|| {
                EdiError::MalformedDocument(format!(
                    "iteration of loop '{}' must be a map of segments",
                    lp.id
                ))
            })?;
            for child in &lp.segments {
                match child {
                    SchemaNode::Loop(nested) => self.build_loop(nested, iteration)?,
                    SchemaNode::Segment(segment) => match present(iteration, &segment.id) {
                        Some(value) => self.build_segment_list(segment, value)?,
                        None if segment.req.is_mandatory() => {
                            return Err(EdiError::MissingMandatorySegment(segment.id.clone()))
                        }
                        None => continue,
                    },
                    SchemaNode::Placeholder(placeholder) => {
                        return Err(EdiError::PlaceholderUnresolved {
                            format: lp.id.clone(),
                            placeholder: placeholder.id.clone(),
                            replacement: placeholder
                                .replacement
                                .clone()
                                .unwrap_or_else(|| placeholder.id.clone()),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Lays out one segment line: id, formatted elements, syntax checks,
    /// then the trailing-empty trim. Syntax rules run before the trim so a
    /// rule naming a trailing optional slot still sees it.
    fn build_segment(
        &mut self,
        segment: &SegmentSchema,
        data: &[EdiValue],
    ) -> Result<(), EdiError> {
        // Slot 0 carries the segment id, so one-based syntax criteria
        // address element slots directly.
        let mut output: Vec<String> = vec![segment.id.clone()];
        for (value, element) in data.iter().zip(&segment.elements) {
            let formatted = self
                .build_element_entry(element, value)
                .map_err(|e| EdiError::in_segment(&segment.id, e))?;
            output.push(formatted);
        }

        for rule in &segment.syntax {
            enforce_syntax_rule(&segment.id, rule, &output)?;
        }

        while output.last().map_or(false, String::is_empty) {
            output.pop();
        }

        self.segments
            .push(output.join(&self.delimiters.element.to_string()));
        Ok(())
    }

    fn build_element_entry(
        &mut self,
        node: &ElementNode,
        data: &EdiValue,
    ) -> Result<String, EdiError> {
        match node {
            ElementNode::Element(element) => self.build_element(element, data),
            ElementNode::Composite(composite) => self.build_composite(composite, data),
        }
    }

    /// Formats a composite slot: sub-elements formatted individually, then
    /// joined with the component separator. The payload is a sub-element
    /// list, a map holding that list under the composite id, or the
    /// decoder's named map of sub-elements.
    fn build_composite(
        &mut self,
        composite: &CompositeSchema,
        data: &EdiValue,
    ) -> Result<String, EdiError> {
        let named: Vec<EdiValue>;
        let sub_values: &[EdiValue] = match data {
            EdiValue::List(items) => items.as_slice(),
            EdiValue::Map(map) => match map.get(&composite.id).and_then(EdiValue::as_list) {
                Some(items) => items,
                None => {
                    named = map.values().cloned().collect();
                    &named
                }
            },
            EdiValue::Null => &[],
            other => {
                return Err(EdiError::MalformedDocument(format!(
                    "composite '{}' payload must be a list, found {}",
                    composite.id,
                    other.type_name()
                )))
            }
        };

        let mut parts = Vec::with_capacity(composite.elements.len());
        for (value, element) in sub_values.iter().zip(&composite.elements) {
            parts.push(self.build_element(element, value)?);
        }
        Ok(parts.join(&self.delimiters.component.to_string()))
    }

    /// Formats one scalar element per its declared data type, then pads to
    /// the minimum width and truncates to the maximum.
    fn build_element(
        &mut self,
        element: &ElementSchema,
        data: &EdiValue,
    ) -> Result<String, EdiError> {
        if data.is_null() {
            return match element.req {
                Requirement::Mandatory => Err(EdiError::MissingMandatoryElement {
                    element: element.id.clone(),
                    name: element.name.clone(),
                }),
                Requirement::Optional | Requirement::Conditional => Ok(String::new()),
            };
        }

        let convert_error = || EdiError::UnknownDataType {
            value: data.display(),
            data_type: element.data_type.to_string(),
        };

        let formatted = match element.data_type {
            DataType::AN => self.delimiters.scrub(&data.display()),
            // code-list membership is advisory at encode time
            DataType::ID => self.delimiters.scrub(&data.display()),
            DataType::DT => match data {
                EdiValue::Date(date) => match element.length.max {
                    8 => date.format("%Y%m%d").to_string(),
                    6 => date.format("%y%m%d").to_string(),
                    other => {
                        return Err(EdiError::InvalidLength {
                            element: element.id.clone(),
                            length: other,
                            message: "date fields must declare max length 6 or 8".to_string(),
                        })
                    }
                },
                // pre-formatted payloads pass through untouched
                EdiValue::Str(s) => s.clone(),
                _ => return Err(convert_error()),
            },
            DataType::TM => match data {
                EdiValue::Time(time) => {
                    if matches!(element.length.max, 4 | 6 | 7 | 8) {
                        time.format("%H%M").to_string()
                    } else {
                        return Err(EdiError::InvalidLength {
                            element: element.id.clone(),
                            length: element.length.max,
                            message: "time fields must declare max length 4, 6, 7 or 8"
                                .to_string(),
                        });
                    }
                }
                EdiValue::Str(s) => s.clone(),
                _ => return Err(convert_error()),
            },
            DataType::R => {
                let value = data.as_f64().ok_or_else(convert_error)?;
                value.to_string()
            }
            DataType::N(places) => {
                let value = data.as_f64().ok_or_else(convert_error)?;
                let scaled = (value * 10f64.powi(places as i32)).round() as i64;
                format!("{:0width$}", scaled, width = element.length.min)
            }
            DataType::Empty => {
                if element.id == "ISA16" {
                    let value = data.display();
                    // the payload is the component element separator
                    if let Some(separator) = value.chars().next() {
                        self.delimiters.component = separator;
                    }
                    value
                } else {
                    return Err(convert_error());
                }
            }
        };

        Ok(pad_and_truncate(formatted, element.length.min, element.length.max))
    }
}

/// Right-pads with spaces to `min`, then truncates to `max` characters.
fn pad_and_truncate(mut value: String, min: usize, max: usize) -> String {
    let width = value.chars().count();
    if width < min {
        value.extend(std::iter::repeat(' ').take(min - width));
    } else if width > max {
        value = value.chars().take(max).collect();
    }
    value
}

/// Evaluates one syntax rule over the laid-out element slots. Criteria
/// indexes are one-based; slot 0 holds the segment id.
fn enforce_syntax_rule(
    segment_id: &str,
    rule: &SyntaxRule,
    output: &[String],
) -> Result<(), EdiError> {
    let filled = |idx: usize| idx < output.len() && !output[idx].is_empty();
    let criteria_names = || {
        rule.criteria
            .iter()
            .map(|&idx| element_name(segment_id, idx))
            .collect::<Vec<_>>()
            .join(", ")
    };

    match rule.rule {
        SyntaxRuleKind::AtLeastOne => {
            if !rule.criteria.iter().any(|&idx| filled(idx)) {
                return Err(EdiError::SyntaxRuleViolation {
                    segment: segment_id.to_string(),
                    message: format!("at least one of {} is required", criteria_names()),
                });
            }
        }
        SyntaxRuleKind::AllOrNone => {
            let found = rule.criteria.iter().filter(|&&idx| filled(idx)).count();
            if found > 0 && found < rule.criteria.len() {
                return Err(EdiError::SyntaxRuleViolation {
                    segment: segment_id.to_string(),
                    message: format!(
                        "if one of {} is present, all are required",
                        criteria_names()
                    ),
                });
            }
        }
        SyntaxRuleKind::IfAtLeastOne => {
            let Some(&first) = rule.criteria.first() else {
                return Ok(());
            };
            if filled(first) && !rule.criteria[1..].iter().any(|&idx| filled(idx)) {
                return Err(EdiError::SyntaxRuleViolation {
                    segment: segment_id.to_string(),
                    message: format!(
                        "if {} is present, at least one of {} is required",
                        element_name(segment_id, first),
                        criteria_names()
                    ),
                });
            }
        }
    }
    Ok(())
}
