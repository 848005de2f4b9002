//! Ordered section sequence for a protocol.
//!
//! The chunker consumes a flat, ordered list of named sections. The
//! sequence is a pure function of the protocol: Title, Short Title,
//! Overall Purpose, Why This Matters, When To Use This Protocol, Overall
//! Outcomes, one section per theme, Completion Prompts, then optional
//! Stones and Tags sections. Sections whose underlying content is empty
//! are skipped entirely.

use std::fmt::Write as _;

use crate::protocol::model::{Protocol, Theme};

/// A named section of serialised protocol text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name, e.g. `"Overall Purpose"` or `"Theme 1: Naming the Edge"`.
    pub name: String,
    /// Serialised section body.
    pub body: String,
}

/// Presentation toggles for section serialisation.
#[derive(Debug, Clone, Copy)]
pub struct SectionOptions {
    /// Put the seven outcome fields of a theme level on a single line
    /// instead of an indented block (speed profile).
    pub flatten_fields: bool,
    /// Leave body text exactly as authored; when off, line endings are
    /// normalised and trailing whitespace per line is dropped.
    pub minimal_normalization: bool,
}

impl Default for SectionOptions {
    fn default() -> Self {
        Self {
            flatten_fields: false,
            minimal_normalization: false,
        }
    }
}

/// Builds the ordered section sequence for a protocol.
#[must_use]
pub fn section_sequence(protocol: &Protocol, opts: SectionOptions) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut push = |name: &str, body: String| {
        if !body_is_empty(&body) {
            let body = if opts.minimal_normalization {
                body
            } else {
                normalise_body(&body)
            };
            sections.push(Section {
                name: name.to_string(),
                body,
            });
        }
    };

    push("Title", labelled("Title", &protocol.title));
    push("Short Title", labelled("Short Title", &protocol.short_title));
    push(
        "Overall Purpose",
        labelled("Overall Purpose", &protocol.overall_purpose),
    );
    push(
        "Why This Matters",
        labelled("Why This Matters", &protocol.why_matters),
    );
    push(
        "When To Use This Protocol",
        labelled("When To Use This Protocol", &protocol.when_to_use),
    );

    let outcomes = &protocol.overall_outcomes;
    push(
        "Overall Outcomes",
        format!(
            "Overall Outcomes:\nPoor: {}\nExpected: {}\nExcellent: {}\nTranscendent: {}",
            outcomes.poor, outcomes.expected, outcomes.excellent, outcomes.transcendent
        ),
    );

    for (i, theme) in protocol.themes.iter().enumerate() {
        push(
            &format!("Theme {}: {}", i + 1, theme.name),
            format_theme(theme, opts.flatten_fields),
        );
    }

    if !protocol.completion_prompts.is_empty() {
        let mut body = "Completion Prompts:".to_string();
        for prompt in &protocol.completion_prompts {
            let _ = write!(body, "\n- {prompt}");
        }
        push("Completion Prompts", body);
    }

    let stones = protocol.stone_slugs();
    if !stones.is_empty() {
        let mut body = "Stones:".to_string();
        for stone in &stones {
            let _ = write!(body, "\n- {stone}");
        }
        push("Stones", body);
    }

    let tags = protocol.tags();
    if !tags.is_empty() {
        let mut body = "Tags:".to_string();
        for tag in tags {
            let _ = write!(body, "\n- {tag}");
        }
        push("Tags", body);
    }

    sections
}

/// `"Label: value"`, or empty when the value is blank (so the section is
/// skipped).
fn labelled(label: &str, value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else {
        format!("{label}: {value}")
    }
}

fn body_is_empty(body: &str) -> bool {
    body.trim().is_empty()
}

/// Normalises line endings and strips trailing whitespace per line.
fn normalise_body(body: &str) -> String {
    body.replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_theme(theme: &Theme, flatten_fields: bool) -> String {
    let mut text = format!(
        "Theme: {}\nPurpose: {}\nWhy This Matters: {}\n\nOutcomes:\n",
        theme.name, theme.purpose, theme.why_matters
    );

    for (level, outcome) in theme.outcomes.levels() {
        if flatten_fields {
            let _ = write!(
                text,
                "{level}: Present pattern: {}; Immediate cost: {}; 30-90 day system effect: {}; Signals: {}; Edge condition: {}; Example moves: {}; Future effect: {}\n",
                outcome.present_pattern,
                outcome.immediate_cost,
                outcome.system_effect_30_90,
                outcome.signals,
                outcome.edge_condition,
                outcome.example_moves,
                outcome.future_effect,
            );
        } else {
            let _ = write!(
                text,
                "{level}:\n  Present pattern: {}\n  Immediate cost: {}\n  30-90 day system effect: {}\n  Signals: {}\n  Edge condition: {}\n  Example moves: {}\n  Future effect: {}\n\n",
                outcome.present_pattern,
                outcome.immediate_cost,
                outcome.system_effect_30_90,
                outcome.signals,
                outcome.edge_condition,
                outcome.example_moves,
                outcome.future_effect,
            );
        }
    }

    text.push_str("Guiding Questions:\n");
    for (i, question) in theme.guiding_questions.iter().enumerate() {
        let _ = writeln!(text, "{}. {question}", i + 1);
    }

    text
}
