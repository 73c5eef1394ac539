use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;

/// A dynamically-shaped X12 document tree.
///
/// Decoded documents are maps from segment/loop id to segment maps, lists
/// of segment maps (repeating segments), or lists of iteration maps
/// (loops). Encoder input uses the positional shape instead: a segment is a
/// list of scalars, a repeating segment a list of such lists. The
/// [`crate::utils::EdiConverter`] converts between the two shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum EdiValue {
    Null,
    Str(String),
    Int(i64),
    Real(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    List(Vec<EdiValue>),
    Map(IndexMap<String, EdiValue>),
}

impl EdiValue {
    /// An empty, insertion-ordered map.
    pub fn map() -> Self {
        EdiValue::Map(IndexMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EdiValue::Null)
    }

    /// True for `Null`, the empty string, and empty lists/maps. Emptiness
    /// is what syntax rules and empty-branch pruning test for.
    pub fn is_empty(&self) -> bool {
        match self {
            EdiValue::Null => true,
            EdiValue::Str(s) => s.is_empty(),
            EdiValue::List(items) => items.is_empty(),
            EdiValue::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, EdiValue::List(_) | EdiValue::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EdiValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[EdiValue]> {
        match self {
            EdiValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, EdiValue>> {
        match self {
            EdiValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, EdiValue>> {
        match self {
            EdiValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Numeric view of a scalar. Numeric strings are accepted so callers
    /// may supply pre-formatted payloads.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EdiValue::Int(i) => Some(*i as f64),
            EdiValue::Real(r) => Some(*r),
            EdiValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Renders a scalar the way it would appear inside an element payload.
    /// Lists and maps render empty; they are never emitted directly.
    pub fn display(&self) -> String {
        match self {
            EdiValue::Null => String::new(),
            EdiValue::Str(s) => s.clone(),
            EdiValue::Int(i) => i.to_string(),
            EdiValue::Real(r) => r.to_string(),
            EdiValue::Date(d) => d.format("%Y%m%d").to_string(),
            EdiValue::Time(t) => t.format("%H%M%S").to_string(),
            EdiValue::List(_) | EdiValue::Map(_) => String::new(),
        }
    }

    /// Short type tag used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            EdiValue::Null => "null",
            EdiValue::Str(_) => "string",
            EdiValue::Int(_) => "integer",
            EdiValue::Real(_) => "real",
            EdiValue::Date(_) => "date",
            EdiValue::Time(_) => "time",
            EdiValue::List(_) => "list",
            EdiValue::Map(_) => "map",
        }
    }
}

impl From<&str> for EdiValue {
    fn from(value: &str) -> Self {
        EdiValue::Str(value.to_string())
    }
}

impl From<String> for EdiValue {
    fn from(value: String) -> Self {
        EdiValue::Str(value)
    }
}

impl From<i64> for EdiValue {
    fn from(value: i64) -> Self {
        EdiValue::Int(value)
    }
}

impl From<f64> for EdiValue {
    fn from(value: f64) -> Self {
        EdiValue::Real(value)
    }
}

impl From<NaiveDate> for EdiValue {
    fn from(value: NaiveDate) -> Self {
        EdiValue::Date(value)
    }
}

impl From<NaiveTime> for EdiValue {
    fn from(value: NaiveTime) -> Self {
        EdiValue::Time(value)
    }
}

impl From<Vec<EdiValue>> for EdiValue {
    fn from(value: Vec<EdiValue>) -> Self {
        EdiValue::List(value)
    }
}

impl From<IndexMap<String, EdiValue>> for EdiValue {
    fn from(value: IndexMap<String, EdiValue>) -> Self {
        EdiValue::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emptiness() {
        assert!(EdiValue::Null.is_empty());
        assert!(EdiValue::Str(String::new()).is_empty());
        assert!(EdiValue::List(vec![]).is_empty());
        assert!(!EdiValue::Int(0).is_empty());
        assert!(!EdiValue::Str("X".to_string()).is_empty());
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(EdiValue::Str("INV001".into()).display(), "INV001");
        assert_eq!(EdiValue::Int(42).display(), "42");
        assert_eq!(EdiValue::Real(2.5).display(), "2.5");
        assert_eq!(EdiValue::Null.display(), "");
    }

    #[test]
    fn test_as_f64_accepts_numeric_strings() {
        assert_eq!(EdiValue::Str("10.5".into()).as_f64(), Some(10.5));
        assert_eq!(EdiValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(EdiValue::Str("abc".into()).as_f64(), None);
    }
}
