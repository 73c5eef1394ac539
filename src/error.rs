use thiserror::Error;

/// Errors raised by the fail-fast paths of the codec: schema loading,
/// encoding, and decoding. Validation never returns these; it accumulates
/// [`crate::validation::ValidationError`] records instead.
#[derive(Error, Debug)]
pub enum EdiError {
    #[error("EDI data must start with 'ISA': {0}")]
    BadEnvelope(String),

    #[error("EDI data missing required segment 'ST'")]
    MissingSt,

    #[error("missing envelope trailer: {0}")]
    MissingEnvelopeTrailer(String),

    #[error("EDI data is missing mandatory segment '{0}'")]
    MissingMandatorySegment(String),

    #[error("EDI data is missing loop '{loop_id}' with mandatory segment(s) {segments}")]
    MissingMandatoryLoop { loop_id: String, segments: String },

    #[error("element {element} ({name}) is mandatory")]
    MissingMandatoryElement { element: String, name: String },

    #[error("'{id}' may not repeat more than {max} time(s), found: {found}")]
    TooManyRepetitions { id: String, max: i32, found: usize },

    #[error("segment '{segment}' has more elements than segment definition; expected {expected}, found {found}")]
    TooManyElements {
        segment: String,
        expected: usize,
        found: usize,
    },

    #[error("segment '{found}' does not match provided segment format '{expected}'")]
    SegmentMismatch { found: String, expected: String },

    #[error("transaction set type '{0}' is not supported")]
    UnknownTransactionSet(String),

    #[error("cannot convert '{value}' to data type '{data_type}'")]
    UnknownDataType { value: String, data_type: String },

    #[error("invalid length ({length}) for {element}: {message}")]
    InvalidLength {
        element: String,
        length: usize,
        message: String,
    },

    #[error("syntax error in segment {segment}: {message}")]
    SyntaxRuleViolation { segment: String, message: String },

    #[error("missing code list '{code_list}' for element '{element}' of segment '{segment}'")]
    CodeListUnresolved {
        segment: String,
        element: String,
        code_list: String,
    },

    #[error("missing segment data '{replacement}' for placeholder '{placeholder}' in format '{format}'")]
    PlaceholderUnresolved {
        format: String,
        placeholder: String,
        replacement: String,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("delimiters must be distinct: {0}")]
    InvalidDelimiters(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// An element-level error annotated with the segment it occurred in.
    #[error("{source}, in segment: {segment}")]
    SegmentContext {
        segment: String,
        #[source]
        source: Box<EdiError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EdiError {
    /// Wraps an element-level error with the id of the segment being
    /// processed, preserving the inner error as the source.
    pub fn in_segment(segment: &str, source: EdiError) -> Self {
        EdiError::SegmentContext {
            segment: segment.to_string(),
            source: Box::new(source),
        }
    }
}
