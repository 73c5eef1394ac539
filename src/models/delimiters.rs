use lazy_static::lazy_static;
use regex::Regex;

use crate::error::EdiError;

lazy_static! {
    static ref EXTRA_WHITESPACE: Regex = Regex::new(r"\s{2,}").unwrap();
}

/// The four X12 delimiters.
///
/// The segment terminator is a string rather than a single character because
/// trailing CR/LF bytes after the terminator declared in ISA16 are folded
/// into it (`~\r\n` is a three-byte terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    /// Segment terminator (default: `\n`).
    pub segment: String,
    /// Element separator (default: `^`).
    pub element: char,
    /// Repetition / data separator (default: `` ` ``).
    pub repetition: char,
    /// Component (sub-element) separator (default: `:`).
    pub component: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            segment: "\n".to_string(),
            element: '^',
            repetition: '`',
            component: ':',
        }
    }
}

impl Delimiters {
    pub fn new(
        segment: impl Into<String>,
        element: char,
        repetition: char,
        component: char,
    ) -> Self {
        Self {
            segment: segment.into(),
            element,
            repetition,
            component,
        }
    }

    /// All four delimiters, segment terminator first.
    pub fn list(&self) -> Vec<String> {
        vec![
            self.segment.clone(),
            self.element.to_string(),
            self.repetition.to_string(),
            self.component.to_string(),
        ]
    }

    /// Checks that no two delimiters collide. A payload character that is
    /// also a delimiter would corrupt the wire form.
    pub fn validate(&self) -> Result<(), EdiError> {
        let chars = [self.element, self.repetition, self.component];
        for (i, a) in chars.iter().enumerate() {
            for b in chars.iter().skip(i + 1) {
                if a == b {
                    return Err(EdiError::InvalidDelimiters(format!(
                        "separator '{}' is used twice",
                        a
                    )));
                }
            }
            if self.segment.contains(*a) {
                return Err(EdiError::InvalidDelimiters(format!(
                    "separator '{}' appears in the segment terminator",
                    a
                )));
            }
        }
        if self.segment.is_empty() {
            return Err(EdiError::InvalidDelimiters(
                "segment terminator is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Strips all delimiters from a payload value and collapses runs of
    /// whitespace to a single space.
    pub fn scrub(&self, value: &str) -> String {
        let mut formatted = value.to_string();
        for delimiter in self.list() {
            if !delimiter.is_empty() {
                formatted = formatted.replace(&delimiter, "");
            }
        }
        EXTRA_WHITESPACE.replace_all(&formatted, " ").into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_delimiters() {
        let d = Delimiters::default();
        assert_eq!(d.segment, "\n");
        assert_eq!(d.element, '^');
        assert_eq!(d.repetition, '`');
        assert_eq!(d.component, ':');
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let d = Delimiters::new("\n", '*', '*', ':');
        assert_matches!(d.validate(), Err(EdiError::InvalidDelimiters(_)));
    }

    #[test]
    fn test_validate_rejects_separator_in_terminator() {
        let d = Delimiters::new("^\n", '^', '`', ':');
        assert_matches!(d.validate(), Err(EdiError::InvalidDelimiters(_)));
    }

    #[test]
    fn test_scrub_removes_delimiters() {
        let d = Delimiters::default();
        assert_eq!(d.scrub("AC^ME: CO`RP"), "ACME CORP");
    }

    #[test]
    fn test_scrub_collapses_whitespace() {
        let d = Delimiters::default();
        assert_eq!(d.scrub("ACME   SUPPLY  CO"), "ACME SUPPLY CO");
    }
}
