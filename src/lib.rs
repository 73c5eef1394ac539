//! # x12-codec
//!
//! A schema-driven bidirectional codec and validator for X12 EDI business
//! documents (810 Invoice, 850 Purchase Order, and custom transaction
//! sets), written in Rust.
//!
//! ## Features
//!
//! - ✅ **Schema-Driven**: Transaction sets are described by JSON schema files, not code
//! - ✅ **Bidirectional**: Byte-exact encoding and tolerant, loop-aware decoding
//! - ✅ **Placeholder Resolution**: Schema files compose via segment placeholders and shared code lists
//! - ✅ **Delimiter Discovery**: Decoding reads all four delimiters from the ISA envelope
//! - ✅ **Syntax Rules**: ATLEASTONE / ALLORNONE / IFATLEASTONE enforced on both directions
//! - ✅ **Accumulating Validation**: The validator reports every finding instead of stopping at the first
//! - ✅ **Envelope Grouping**: Multiple ST/SE pairs per ISA/IEA via GS/GE coordination
//!
//! ## Quick Start
//!
//! ```rust
//! use x12_codec::{SchemaRegistryBuilder, X12Decoder, X12Encoder};
//! use x12_codec::utils::EdiConverter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = SchemaRegistryBuilder::new();
//! builder.add_format_json(
//!     "810",
//!     r#"[
//!         {"type": "segment", "id": "ST", "req": "M", "max_uses": 1, "elements": [
//!             {"type": "element", "id": "ST01", "req": "M", "data_type": "ID", "length": {"min": 3, "max": 3}},
//!             {"type": "element", "id": "ST02", "req": "M", "data_type": "AN", "length": {"min": 4, "max": 9}}
//!         ]},
//!         {"type": "segment", "id": "BIG", "req": "M", "max_uses": 1, "elements": [
//!             {"type": "element", "id": "BIG01", "req": "M", "data_type": "DT", "length": {"min": 8, "max": 8}},
//!             {"type": "element", "id": "BIG02", "req": "M", "data_type": "AN", "length": {"min": 1, "max": 22}}
//!         ]},
//!         {"type": "segment", "id": "SE", "req": "M", "max_uses": 1, "elements": [
//!             {"type": "element", "id": "SE01", "req": "M", "data_type": "N0", "length": {"min": 1, "max": 10}},
//!             {"type": "element", "id": "SE02", "req": "M", "data_type": "AN", "length": {"min": 4, "max": 9}}
//!         ]}
//!     ]"#,
//! )?;
//! let registry = builder.build()?;
//!
//! // Decode a bare transaction body into the named document shape
//! let decoder = X12Decoder::new(&registry);
//! let (order, document) =
//!     decoder.parse_transaction("ST^810^000000001\nBIG^20200101^INV001\nSE^2^000000001\n")?;
//! assert_eq!(order, vec!["ST", "BIG", "SE"]);
//!
//! // Convert to the positional shape and encode it back
//! let positional = EdiConverter::to_element_list(&document)?;
//! let output = X12Encoder::new(&registry).build(&positional)?;
//! assert_eq!(output, "ST^810^000000001\nBIG^20200101^INV001\nSE^2^000000001\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Loading schemas from disk
//!
//! Production deployments keep one JSON file per transaction set under a
//! `formats/` directory, with code lists under `formats/codes/`:
//!
//! ```rust,no_run
//! use x12_codec::SchemaRegistryBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistryBuilder::load_dir("formats")?;
//! assert!(registry.contains("810"));
//! # Ok(())
//! # }
//! ```
//!
//! The registry is built once and immutable afterwards, so it can be
//! shared read-only across any number of concurrent encode, decode, and
//! validate operations.
//!
//! ## Error Handling
//!
//! Encoding and decoding are fail-fast and return [`EdiError`] naming the
//! offending segment (and element, where one applies). Validation is
//! accumulating and returns every
//! [`ValidationError`](validation::ValidationError) it finds.

pub mod codec;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;
pub mod validation;

// Re-export the main types for easier access
pub use codec::{EnvelopeInfo, X12Decoder, X12Encoder};
pub use error::EdiError;
pub use models::{Delimiters, EdiValue};
pub use schema::{
    CodeListRef, DataType, ElementNode, ElementSchema, LengthRange, LoopSchema, Requirement,
    SchemaNode, SchemaRegistry, SchemaRegistryBuilder, SegmentSchema, SyntaxRule, SyntaxRuleKind,
};
pub use validation::{EdiValidator, ValidationError, ValidationErrorKind};
