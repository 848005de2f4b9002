//! Protocol document model.
//!
//! A protocol is a structured guidance document: a hierarchy of titles,
//! themes, outcome levels and prompts. This module provides the typed
//! tree, deterministic protocol-ID derivation, the ordered section
//! sequence consumed by the chunker, and the structural validation gate.

pub mod ident;
pub mod model;
pub mod sections;
#[cfg(test)]
pub(crate) mod testutil;
pub mod validate;

pub use ident::{derive_protocol_id, is_clean_stable_slug, to_snake_slug};
pub use model::{
    OutcomeLevel, OverallOutcomes, Protocol, ProtocolMetadata, Stone, Theme, ThemeOutcomes,
};
pub use sections::{Section, SectionOptions, section_sequence};
pub use validate::{normalize_protocol_value, validate_protocol_value};
