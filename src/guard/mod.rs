//! Grounding, refusal, and lane escalation policy.
//!
//! Pure policy functions: a 1..5 grounding score, its normalisation, the
//! deterministic stones-alignment baseline, the ordered guardrails that
//! turn weak support into a refusal payload, and the fast-to-accurate
//! escalation decision.

use serde::{Deserialize, Serialize};

use crate::core::Lane;

/// Refusal text returned by both guardrails.
pub const REFUSAL_TEXT: &str = "Cannot answer confidently: insufficient grounding.";

/// Default refusal threshold on the normalised grounding score.
pub const DEFAULT_MIN_GROUNDING: f32 = 0.25;

/// Default escalation threshold on the normalised grounding score.
pub const DEFAULT_GROUNDING_THRESHOLD: f32 = 0.65;

/// Default escalation threshold on query complexity.
pub const DEFAULT_COMPLEXITY_THRESHOLD: f32 = 0.7;

/// Analytic phrasing that marks a complex query.
const COMPLEXITY_PATTERNS: [&str; 10] = [
    "compare",
    "evaluate",
    "pros and cons",
    "step by step",
    "analyze",
    "analyse",
    "trade-off",
    "tradeoff",
    "similarities",
    "differences",
];

/// Caller-declared intents that always escalate.
const HIGH_RISK_INTENTS: [&str; 3] = ["decision", "commitment", "irreversible"];

/// Guardrail outcome for a synthesised answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Support is sufficient; return the payload.
    Pass,
    /// Refuse with the given reason.
    Refuse(RefusalReason),
}

/// Why an answer was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    /// Normalised grounding fell below the configured minimum.
    LowGrounding,
    /// The answer carries no citations.
    NoCitations,
}

impl RefusalReason {
    /// Reason slug used in payloads and log flags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LowGrounding => "low_grounding",
            Self::NoCitations => "no_citations",
        }
    }
}

/// Why retrieval escalated from the fast lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Grounding below the escalation threshold.
    LowGrounding,
    /// No citations after the fast pass.
    NoCitations,
    /// Query complexity above threshold.
    HighComplexity,
    /// Caller-declared high-risk intent.
    HighRiskIntent,
}

impl EscalationReason {
    /// Reason slug for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LowGrounding => "low_grounding",
            Self::NoCitations => "no_citations",
            Self::HighComplexity => "high_complexity",
            Self::HighRiskIntent => "high_risk_intent",
        }
    }
}

/// Integer grounding score in 1..=5.
///
/// Base 1, +1 for at least one citation, +1 for stones alignment above
/// 0.5, +1 above 0.7, +1 for zero hallucinations.
#[must_use]
pub fn grounding_score_1to5(citation_count: usize, stones_alignment: f32, hallucinations: u32) -> u8 {
    let mut score = 1u8;
    if citation_count > 0 {
        score += 1;
    }
    if stones_alignment > 0.5 {
        score += 1;
    }
    if stones_alignment > 0.7 {
        score += 1;
    }
    if hallucinations == 0 {
        score += 1;
    }
    score
}

/// Normalises a 1..=5 grounding score to `[0, 1]`.
#[must_use]
pub fn normalize_grounding(score_1to5: u8) -> f32 {
    f32::from(score_1to5.clamp(1, 5) - 1) / 4.0
}

/// Deterministic stones-alignment baseline: the proportion of expected
/// stones whose slug (or any hyphen-split token of it) appears in the
/// lower-cased answer. Returns 1.0 when nothing is expected.
#[must_use]
pub fn stones_alignment(answer: &str, expected_stones: &[String]) -> f32 {
    if expected_stones.is_empty() {
        return 1.0;
    }

    let answer_lower = answer.to_lowercase();
    let matches = expected_stones
        .iter()
        .filter(|stone| {
            let slug = stone.to_lowercase();
            if answer_lower.contains(&slug) {
                return true;
            }
            slug.split(['-', ' '])
                .filter(|token| !token.is_empty())
                .any(|token| answer_lower.contains(token))
        })
        .count();

    #[allow(clippy::cast_precision_loss)]
    {
        matches as f32 / expected_stones.len() as f32
    }
}

/// Ordered guardrails: low grounding first, then missing citations.
#[must_use]
pub fn evaluate(grounding_normalized: f32, citation_count: usize, min_grounding: f32) -> Verdict {
    if grounding_normalized < min_grounding {
        return Verdict::Refuse(RefusalReason::LowGrounding);
    }
    if citation_count == 0 {
        return Verdict::Refuse(RefusalReason::NoCitations);
    }
    Verdict::Pass
}

/// Heuristic query complexity in `[0, 1]`: scaled word count plus
/// analytic phrasing. Empty queries score 0.
#[must_use]
pub fn query_complexity(query: &str) -> f32 {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let lowered = trimmed.to_lowercase();
    #[allow(clippy::cast_precision_loss)]
    let word_count = lowered.split_whitespace().count() as f32;
    let length_score = (word_count / 50.0).min(1.0);

    #[allow(clippy::cast_precision_loss)]
    let pattern_hits = COMPLEXITY_PATTERNS
        .iter()
        .filter(|p| lowered.contains(*p))
        .count() as f32;
    let pattern_score = (pattern_hits / 2.0).min(1.0);

    (0.6 * length_score + 0.6 * pattern_score).min(1.0)
}

/// Per-lane support thresholds: required stones alignment and tolerated
/// hallucination count.
#[must_use]
pub const fn lane_support_thresholds(lane: Lane) -> (f32, u32) {
    match lane {
        Lane::Fast => (0.70, 1),
        Lane::Accurate => (0.80, 1),
    }
}

/// Whether an answer has sufficient support under the lane's
/// thresholds.
#[must_use]
pub fn sufficient_support(lane: Lane, stones_alignment: f32, hallucinations: u32) -> bool {
    let (min_alignment, max_hallucinations) = lane_support_thresholds(lane);
    stones_alignment >= min_alignment && hallucinations <= max_hallucinations
}

/// Whether a fast-lane pass should escalate to the accurate lane.
///
/// Checked in order: grounding below `grounding_threshold`, missing
/// citations, complexity above `complexity_threshold`, high-risk intent.
/// Escalation is never recursive; the caller re-runs the accurate lane
/// at most once.
#[must_use]
pub fn should_escalate(
    query: &str,
    citation_count: usize,
    grounding_normalized: f32,
    user_intent: Option<&str>,
    grounding_threshold: f32,
    complexity_threshold: f32,
) -> Option<EscalationReason> {
    if grounding_normalized < grounding_threshold {
        return Some(EscalationReason::LowGrounding);
    }
    if citation_count == 0 {
        return Some(EscalationReason::NoCitations);
    }
    if query_complexity(query) > complexity_threshold {
        return Some(EscalationReason::HighComplexity);
    }
    if user_intent.is_some_and(|intent| HIGH_RISK_INTENTS.contains(&intent)) {
        return Some(EscalationReason::HighRiskIntent);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0.0, 1, 1; "nothing earns base score")]
    #[test_case(1, 0.0, 1, 2; "citations add one")]
    #[test_case(1, 0.6, 1, 3; "alignment above half adds one")]
    #[test_case(1, 0.8, 1, 4; "alignment above point seven adds two")]
    #[test_case(1, 0.8, 0, 5; "zero hallucinations completes the score")]
    fn test_grounding_score(citations: usize, alignment: f32, hallucinations: u32, expected: u8) {
        assert_eq!(
            grounding_score_1to5(citations, alignment, hallucinations),
            expected
        );
    }

    #[test]
    fn test_normalize_grounding() {
        assert!((normalize_grounding(1) - 0.0).abs() < 1e-6);
        assert!((normalize_grounding(3) - 0.5).abs() < 1e-6);
        assert!((normalize_grounding(5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stones_alignment_empty_expected() {
        assert!((stones_alignment("any text", &[]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stones_alignment_slug_and_tokens() {
        let expected = vec!["stewardship".to_string(), "the-pace-of-trust".to_string()];
        // "pace" is a hyphen-split token of the second slug.
        let alignment = stones_alignment("Stewardship means watching the pace.", &expected);
        assert!((alignment - 1.0).abs() < 1e-6);

        let partial = stones_alignment("Stewardship only.", &expected);
        assert!((partial - 0.5).abs() < 1e-6);

        assert_eq!(stones_alignment("nothing relevant", &expected), 0.0);
    }

    #[test]
    fn test_guardrails_low_grounding_first() {
        // Both guardrails would fire; low grounding wins the ordering.
        assert_eq!(
            evaluate(0.2, 0, 0.5),
            Verdict::Refuse(RefusalReason::LowGrounding)
        );
        assert_eq!(
            evaluate(0.2, 3, 0.5),
            Verdict::Refuse(RefusalReason::LowGrounding)
        );
    }

    #[test]
    fn test_guardrails_no_citations() {
        assert_eq!(
            evaluate(0.75, 0, 0.25),
            Verdict::Refuse(RefusalReason::NoCitations)
        );
    }

    #[test]
    fn test_guardrails_pass() {
        assert_eq!(evaluate(0.75, 2, 0.25), Verdict::Pass);
    }

    #[test]
    fn test_query_complexity() {
        assert_eq!(query_complexity(""), 0.0);
        assert!(query_complexity("simple query") < 0.5);
        assert!(
            query_complexity("Compare and evaluate the pros and cons step by step") > 0.5
        );
        let long_query = "word ".repeat(60);
        assert!(query_complexity(&long_query) > 0.5);
    }

    #[test]
    fn test_escalation_ordering() {
        // Low grounding.
        assert_eq!(
            should_escalate("q", 0, 0.5, None, 0.65, 0.7),
            Some(EscalationReason::LowGrounding)
        );
        // Citations missing, grounding fine.
        assert_eq!(
            should_escalate("q", 0, 0.8, None, 0.65, 0.7),
            Some(EscalationReason::NoCitations)
        );
        // Complexity.
        assert_eq!(
            should_escalate(
                "Compare and evaluate the pros and cons of different approaches step by step \
                 and analyze the similarities and differences",
                1,
                0.8,
                None,
                0.65,
                0.5
            ),
            Some(EscalationReason::HighComplexity)
        );
        // High-risk intent.
        assert_eq!(
            should_escalate("simple query", 1, 0.8, Some("decision"), 0.65, 0.7),
            Some(EscalationReason::HighRiskIntent)
        );
        // Nothing fires.
        assert_eq!(should_escalate("simple query", 1, 0.8, None, 0.65, 0.7), None);
    }

    #[test]
    fn test_sufficient_support_per_lane() {
        assert!(sufficient_support(Lane::Fast, 0.75, 0));
        assert!(!sufficient_support(Lane::Fast, 0.60, 0));
        assert!(sufficient_support(Lane::Accurate, 0.85, 1));
        assert!(!sufficient_support(Lane::Accurate, 0.75, 0));
        assert!(!sufficient_support(Lane::Fast, 0.75, 2));
    }

    #[test]
    fn test_refusal_reason_slugs() {
        assert_eq!(RefusalReason::LowGrounding.as_str(), "low_grounding");
        assert_eq!(RefusalReason::NoCitations.as_str(), "no_citations");
        assert_eq!(EscalationReason::HighComplexity.as_str(), "high_complexity");
    }
}
