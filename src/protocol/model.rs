//! Typed protocol tree.
//!
//! Protocol JSON uses capitalised field names ("Title", "Overall Purpose",
//! "30-90 day system effect", ...); serde aliases map them onto the
//! snake_case fields below. Documents are immutable after load.

use serde::{Deserialize, Serialize};

/// A single outcome level (Poor, Expected, Excellent, Transcendent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLevel {
    /// What is observably happening now.
    #[serde(alias = "Present pattern")]
    pub present_pattern: String,

    /// The immediate cost of the pattern.
    #[serde(alias = "Immediate cost")]
    pub immediate_cost: String,

    /// The 30-90 day system effect.
    #[serde(alias = "30-90 day system effect")]
    pub system_effect_30_90: String,

    /// Signals that this level applies.
    #[serde(alias = "Signals")]
    pub signals: String,

    /// The edge condition for this level.
    #[serde(alias = "Edge condition")]
    pub edge_condition: String,

    /// Example moves at this level.
    #[serde(alias = "Example moves")]
    pub example_moves: String,

    /// The longer-term future effect.
    #[serde(alias = "Future effect")]
    pub future_effect: String,
}

/// Outcomes for a theme across all four levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeOutcomes {
    /// Poor outcome.
    #[serde(alias = "Poor")]
    pub poor: OutcomeLevel,
    /// Expected outcome.
    #[serde(alias = "Expected")]
    pub expected: OutcomeLevel,
    /// Excellent outcome.
    #[serde(alias = "Excellent")]
    pub excellent: OutcomeLevel,
    /// Transcendent outcome.
    #[serde(alias = "Transcendent")]
    pub transcendent: OutcomeLevel,
}

impl ThemeOutcomes {
    /// Outcome levels in canonical order, with their display names.
    #[must_use]
    pub fn levels(&self) -> [(&'static str, &OutcomeLevel); 4] {
        [
            ("Poor", &self.poor),
            ("Expected", &self.expected),
            ("Excellent", &self.excellent),
            ("Transcendent", &self.transcendent),
        ]
    }
}

/// A named sub-section of a protocol with four outcome levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Theme name.
    #[serde(alias = "Name")]
    pub name: String,

    /// Purpose of this theme.
    #[serde(alias = "Purpose of This Theme")]
    pub purpose: String,

    /// Why this theme matters.
    #[serde(alias = "Why This Matters")]
    pub why_matters: String,

    /// Outcome levels.
    #[serde(alias = "Outcomes")]
    pub outcomes: ThemeOutcomes,

    /// Ordered guiding questions.
    #[serde(alias = "Guiding Questions", default)]
    pub guiding_questions: Vec<String>,
}

/// Overall outcomes for the whole protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallOutcomes {
    /// Poor overall outcome.
    #[serde(alias = "Poor")]
    pub poor: String,
    /// Expected overall outcome.
    #[serde(alias = "Expected")]
    pub expected: String,
    /// Excellent overall outcome.
    #[serde(alias = "Excellent")]
    pub excellent: String,
    /// Transcendent overall outcome.
    #[serde(alias = "Transcendent")]
    pub transcendent: String,
}

/// A principle ("stone") tagging a protocol's value alignment.
///
/// The corpus carries stones either as bare slugs or as objects with
/// `slug`/`name` fields; [`Stone::slug`] is the single normaliser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stone {
    /// Bare slug form, e.g. `"stewardship"`.
    Slug(String),
    /// Object form with a slug and an optional display name.
    Named {
        /// Principle slug.
        #[serde(default)]
        slug: Option<String>,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
}

impl Stone {
    /// Normalised slug: lower-cased, trimmed, internal whitespace
    /// collapsed to hyphens. Object forms fall back from `slug` to `name`.
    #[must_use]
    pub fn slug(&self) -> String {
        let raw = match self {
            Self::Slug(s) => s.as_str(),
            Self::Named { slug, name } => slug
                .as_deref()
                .or(name.as_deref())
                .unwrap_or_default(),
        };
        raw.trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Optional protocol metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMetadata {
    /// Complexity rating.
    #[serde(alias = "Complexity", default)]
    pub complexity: Option<i64>,

    /// Readiness stage.
    #[serde(alias = "Readiness Stage", default)]
    pub readiness_stage: Option<String>,

    /// Modes this protocol can run in.
    #[serde(alias = "Modes", default)]
    pub modes: Vec<String>,

    /// Estimated time to complete.
    #[serde(alias = "Estimated Time", default)]
    pub estimated_time: Option<String>,

    /// Tone markers.
    #[serde(alias = "Tone Markers", default)]
    pub tone_markers: Vec<String>,

    /// Primary scenarios.
    #[serde(alias = "Primary Scenarios", default)]
    pub primary_scenarios: Vec<String>,

    /// Related protocol identifiers.
    #[serde(alias = "Related Protocols", default)]
    pub related_protocols: Vec<String>,

    /// Free-form tags.
    #[serde(alias = "Tags", default)]
    pub tags: Vec<String>,

    /// Principle slugs tagging the protocol's value alignment.
    #[serde(alias = "Stones", default)]
    pub stones: Vec<Stone>,

    /// Field identifiers.
    #[serde(alias = "Fields", default)]
    pub fields: Vec<String>,

    /// Bridge identifiers.
    #[serde(alias = "Bridges", default)]
    pub bridges: Vec<String>,
}

/// Complete protocol structure: the unit of ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    /// Full title.
    #[serde(alias = "Title")]
    pub title: String,

    /// Short title.
    #[serde(alias = "Short Title")]
    pub short_title: String,

    /// Overall purpose.
    #[serde(alias = "Overall Purpose")]
    pub overall_purpose: String,

    /// Why this protocol matters.
    #[serde(alias = "Why This Matters")]
    pub why_matters: String,

    /// When to use this protocol.
    #[serde(alias = "When To Use This Protocol")]
    pub when_to_use: String,

    /// Overall outcomes.
    #[serde(alias = "Overall Outcomes")]
    pub overall_outcomes: OverallOutcomes,

    /// Ordered themes.
    #[serde(alias = "Themes")]
    pub themes: Vec<Theme>,

    /// Completion prompts.
    #[serde(alias = "Completion Prompts", default)]
    pub completion_prompts: Vec<String>,

    /// Document version.
    #[serde(alias = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Creation timestamp carried by the document.
    #[serde(alias = "Created At", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Explicit protocol identifier, when the document carries one.
    #[serde(alias = "Protocol ID", default, skip_serializing_if = "Option::is_none")]
    pub protocol_id: Option<String>,

    /// Document category.
    #[serde(alias = "Category", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Optional metadata block.
    #[serde(alias = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProtocolMetadata>,
}

impl Protocol {
    /// Normalised stone slugs from the metadata block, in order.
    #[must_use]
    pub fn stone_slugs(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .map(|m| m.stones.iter().map(Stone::slug).collect())
            .unwrap_or_default()
    }

    /// Tags from the metadata block.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        self.metadata.as_ref().map_or(&[], |m| m.tags.as_slice())
    }

    /// Fields from the metadata block.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        self.metadata.as_ref().map_or(&[], |m| m.fields.as_slice())
    }

    /// Bridges from the metadata block.
    #[must_use]
    pub fn bridges(&self) -> &[String] {
        self.metadata.as_ref().map_or(&[], |m| m.bridges.as_slice())
    }
}
