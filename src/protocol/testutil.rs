//! Shared test fixtures for protocol documents.

use serde_json::{Value, json};

use crate::protocol::model::Protocol;

/// One fully-populated outcome level.
pub(crate) fn outcome_json(tag: &str) -> Value {
    json!({
        "Present pattern": format!("{tag} pattern"),
        "Immediate cost": format!("{tag} cost"),
        "30-90 day system effect": format!("{tag} effect"),
        "Signals": format!("{tag} signals"),
        "Edge condition": format!("{tag} edge"),
        "Example moves": format!("{tag} moves"),
        "Future effect": format!("{tag} future"),
    })
}

/// A complete, valid protocol document in wire format.
pub(crate) fn sample_protocol_json() -> Value {
    json!({
        "Title": "Clean Edges",
        "Short Title": "Edges",
        "Overall Purpose": "Keep boundaries clean.",
        "Why This Matters": "Boundaries drift without care.",
        "When To Use This Protocol": "When scope creeps past the agreement.",
        "Overall Outcomes": {
            "Poor": "Drift continues unnoticed.",
            "Expected": "Edges hold under pressure.",
            "Excellent": "Edges self-maintain.",
            "Transcendent": "Edges teach others to hold their own."
        },
        "Themes": [{
            "Name": "Naming the Edge",
            "Purpose of This Theme": "Make the boundary explicit.",
            "Why This Matters": "Implicit edges erode first.",
            "Outcomes": {
                "Poor": outcome_json("poor"),
                "Expected": outcome_json("expected"),
                "Excellent": outcome_json("excellent"),
                "Transcendent": outcome_json("transcendent")
            },
            "Guiding Questions": ["Where does this end?", "Who owns the edge?"]
        }],
        "Completion Prompts": ["What edge did you name?"],
        "Protocol ID": "clean_edges",
        "Metadata": {
            "Stones": ["stewardship", "clarity"],
            "Tags": ["boundaries", "pace"],
            "Fields": ["scope"],
            "Bridges": []
        }
    })
}

/// The sample document parsed into the typed tree.
pub(crate) fn sample_protocol() -> Protocol {
    serde_json::from_value(sample_protocol_json()).unwrap()
}

/// A protocol whose Overall Purpose is `n_sentences` short sentences,
/// for exercising multi-chunk splitting.
pub(crate) fn long_purpose_protocol(n_sentences: usize) -> Protocol {
    let mut protocol = sample_protocol();
    protocol.overall_purpose = (0..n_sentences)
        .map(|i| format!("Sentence number {i} keeps the boundary language fresh and clear."))
        .collect::<Vec<_>>()
        .join(" ");
    protocol
}
