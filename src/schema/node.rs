use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Requirement designator for segments, loops, and elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Requirement {
    /// M - Mandatory
    #[serde(rename = "M")]
    Mandatory,
    /// O - Optional
    #[default]
    #[serde(rename = "O")]
    Optional,
    /// C - Conditional
    #[serde(rename = "C")]
    Conditional,
}

impl Requirement {
    pub fn is_mandatory(self) -> bool {
        matches!(self, Requirement::Mandatory)
    }
}

/// X12 element data types as they appear in schema JSON.
///
/// `N0`..`N9` are implicit-decimal integers with the digit giving the
/// number of decimal places. The empty data type is only legal on ISA16,
/// whose payload is the component element separator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Alphanumeric string
    AN,
    /// Identifier (coded value)
    ID,
    /// Date
    DT,
    /// Time
    TM,
    /// Decimal number
    R,
    /// Implicit-decimal integer with `k` decimal places
    N(u8),
    /// Unset; legal only on ISA16
    Empty,
}

impl DataType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AN" => Some(DataType::AN),
            "ID" => Some(DataType::ID),
            "DT" => Some(DataType::DT),
            "TM" => Some(DataType::TM),
            "R" => Some(DataType::R),
            "" => Some(DataType::Empty),
            other => {
                let digits = other.strip_prefix('N')?;
                let places: u8 = digits.parse().ok()?;
                if places <= 9 {
                    Some(DataType::N(places))
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::AN => write!(f, "AN"),
            DataType::ID => write!(f, "ID"),
            DataType::DT => write!(f, "DT"),
            DataType::TM => write!(f, "TM"),
            DataType::R => write!(f, "R"),
            DataType::N(places) => write!(f, "N{}", places),
            DataType::Empty => Ok(()),
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DataType::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("unknown data type '{}'", raw)))
    }
}

/// Declared payload length bounds for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    #[serde(default)]
    pub min: usize,
    #[serde(default = "LengthRange::unbounded_max")]
    pub max: usize,
}

impl LengthRange {
    fn unbounded_max() -> usize {
        usize::MAX
    }
}

impl Default for LengthRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
        }
    }
}

/// An `ID` element's code list: either a by-name reference into the code
/// registry (the on-disk form) or the resolved code-to-label map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeListRef {
    Codes(BTreeMap<String, String>),
    Name(String),
}

/// Segment-level cross-element constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxRule {
    pub rule: SyntaxRuleKind,
    /// One-based element positions within the segment.
    pub criteria: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntaxRuleKind {
    /// At least one of the criteria slots must be non-empty.
    #[serde(rename = "ATLEASTONE")]
    AtLeastOne,
    /// Either all criteria slots are non-empty, or none of them are.
    #[serde(rename = "ALLORNONE")]
    AllOrNone,
    /// If the first criteria slot is non-empty, at least one of the rest
    /// must be too.
    #[serde(rename = "IFATLEASTONE")]
    IfAtLeastOne,
}

/// Scalar element definition (`SSSnn`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSchema {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub req: Requirement,
    pub data_type: DataType,
    #[serde(default)]
    pub length: LengthRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type_ids: Option<CodeListRef>,
}

/// Composite element: sub-elements sharing one element slot, joined by the
/// component separator on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSchema {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub req: Requirement,
    pub elements: Vec<ElementSchema>,
}

/// One slot in a segment's ordered element list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementNode {
    Element(ElementSchema),
    Composite(CompositeSchema),
}

impl ElementNode {
    pub fn id(&self) -> &str {
        match self {
            ElementNode::Element(e) => &e.id,
            ElementNode::Composite(c) => &c.id,
        }
    }
}

/// Segment definition: one output line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSchema {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub req: Requirement,
    /// Maximum consecutive uses; `-1` means unbounded.
    #[serde(default = "unbounded")]
    pub max_uses: i32,
    #[serde(default)]
    pub elements: Vec<ElementNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syntax: Vec<SyntaxRule>,
}

impl SegmentSchema {
    /// True when the segment may appear more than once in a row.
    pub fn allows_multiples(&self) -> bool {
        self.max_uses == -1 || self.max_uses > 1
    }

    pub fn find_element(&self, id: &str) -> Option<&ElementNode> {
        self.elements.iter().find(|e| e.id() == id)
    }
}

/// Ordered, repeatable group of segments. Loop ids use the `L_*` (bounded
/// loop) or `S_*` (set) prefix over the id of their first segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSchema {
    pub id: String,
    #[serde(default)]
    pub req: Requirement,
    /// Maximum iterations; `-1` means unbounded.
    #[serde(default = "unbounded")]
    pub repeat: i32,
    pub segments: Vec<SchemaNode>,
}

/// Load-time reference to a segment or loop defined in another schema
/// file. Resolved (and gone) once the registry is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderSchema {
    pub id: String,
    /// Registry key to import from; defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<i32>,
}

/// One node of a transaction-set schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaNode {
    Segment(SegmentSchema),
    Loop(LoopSchema),
    Placeholder(PlaceholderSchema),
}

impl SchemaNode {
    pub fn id(&self) -> &str {
        match self {
            SchemaNode::Segment(s) => &s.id,
            SchemaNode::Loop(l) => &l.id,
            SchemaNode::Placeholder(p) => &p.id,
        }
    }

    pub fn req(&self) -> Requirement {
        match self {
            SchemaNode::Segment(s) => s.req,
            SchemaNode::Loop(l) => l.req,
            SchemaNode::Placeholder(p) => p.req.unwrap_or_default(),
        }
    }
}

fn unbounded() -> i32 {
    -1
}
