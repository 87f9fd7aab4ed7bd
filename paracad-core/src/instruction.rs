//! Parametric edit instructions — the JSON contract between the language
//! model and the rest of the pipeline.
//!
//! The parser model is asked for flat objects of the form
//! `{part, feature, parameter, new_value | delta, unit, confidence}`.
//! Model output is messy in practice: fenced in Markdown, wrapped in arrays,
//! or interleaved with prose. [`extract_json`] digs the candidate objects out
//! of the raw response; [`Instruction::validate`] enforces the schema rules.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Feature names the parser model is allowed to emit, in prompt order.
pub const KNOWN_FEATURES: [&str; 14] = [
    "Extrude1", "Revolve1", "Cut1", "Fillet1", "Chamfer1", "Shell1", "Sweep1",
    "Loft1", "Mirror1", "Pattern1", "Draft1", "Hole1", "Thicken1", "Wrap1",
];

/// A single parametric edit: change one named parameter of one feature.
///
/// Exactly one of `new_value` (absolute target) and `delta` (relative change)
/// must be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instruction {
    pub part: String,
    pub feature: String,
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    pub unit: String,
    pub confidence: f64,
}

#[derive(Error, Debug, PartialEq)]
pub enum InstructionError {
    #[error("unit must be 'mm', got '{0}'")]
    UnsupportedUnit(String),

    #[error("confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("both 'new_value' and 'delta' present — only one is allowed")]
    BothValueAndDelta,

    #[error("either 'new_value' or 'delta' must be present")]
    MissingValueAndDelta,

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),
}

impl Instruction {
    /// Enforce the schema rules the parser prompt promises.
    pub fn validate(&self) -> Result<(), InstructionError> {
        if self.part.trim().is_empty() {
            return Err(InstructionError::EmptyField("part"));
        }
        if self.parameter.trim().is_empty() {
            return Err(InstructionError::EmptyField("parameter"));
        }
        if !self.unit.eq_ignore_ascii_case("mm") {
            return Err(InstructionError::UnsupportedUnit(self.unit.clone()));
        }
        if !(0.0..=1.0).contains(&self.confidence) || !self.confidence.is_finite() {
            return Err(InstructionError::ConfidenceOutOfRange(self.confidence));
        }
        match (self.new_value, self.delta) {
            (Some(_), Some(_)) => Err(InstructionError::BothValueAndDelta),
            (None, None) => Err(InstructionError::MissingValueAndDelta),
            _ => Ok(()),
        }
    }

    /// The value being applied, absolute or relative.
    pub fn value(&self) -> f64 {
        self.new_value.or(self.delta).unwrap_or_default()
    }
}

/// Extract JSON objects from a model response.
///
/// Strips Markdown code fences, then scans for `{...}` / `[...]` blocks
/// (non-greedy, dot-matches-newline). Each block that parses is kept; arrays
/// are flattened into their object elements; blocks that fail to parse are
/// skipped silently.
pub fn extract_json(text: &str) -> Vec<serde_json::Value> {
    let cleaned = text.trim().replace("```json", "").replace("```", "");

    let block_re = match Regex::new(r"(?s)(\{.*?\}|\[.*?\])") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut results = Vec::new();
    for m in block_re.find_iter(&cleaned) {
        match serde_json::from_str::<serde_json::Value>(m.as_str()) {
            Ok(serde_json::Value::Object(obj)) => {
                results.push(serde_json::Value::Object(obj));
            }
            Ok(serde_json::Value::Array(items)) => {
                results.extend(items.into_iter().filter(|v| v.is_object()));
            }
            _ => continue,
        }
    }
    results
}

/// Deserialize and validate extracted candidates.
///
/// Returns the valid instructions and the number of rejected candidates
/// (failed deserialization or failed [`Instruction::validate`]).
pub fn screen_candidates(candidates: Vec<serde_json::Value>) -> (Vec<Instruction>, usize) {
    let mut valid = Vec::new();
    let mut rejected = 0;

    for candidate in candidates {
        match serde_json::from_value::<Instruction>(candidate) {
            Ok(instruction) => match instruction.validate() {
                Ok(()) => valid.push(instruction),
                Err(e) => {
                    tracing::warn!(error = %e, "Instruction failed validation");
                    rejected += 1;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Candidate does not match instruction schema");
                rejected += 1;
            }
        }
    }

    (valid, rejected)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn base_instruction() -> Instruction {
        Instruction {
            part: "shaft".to_string(),
            feature: "Extrude1".to_string(),
            parameter: "Diameter".to_string(),
            new_value: Some(35.0),
            delta: None,
            unit: "mm".to_string(),
            confidence: 0.95,
        }
    }

    #[test]
    fn test_valid_instruction_passes() {
        assert_eq!(base_instruction().validate(), Ok(()));
    }

    #[test]
    fn test_unit_is_case_insensitive() {
        let mut instr = base_instruction();
        instr.unit = "MM".to_string();
        assert_eq!(instr.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_non_mm_unit() {
        let mut instr = base_instruction();
        instr.unit = "cm".to_string();
        assert_eq!(
            instr.validate(),
            Err(InstructionError::UnsupportedUnit("cm".to_string()))
        );
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let mut instr = base_instruction();
        instr.confidence = 1.5;
        assert_eq!(
            instr.validate(),
            Err(InstructionError::ConfidenceOutOfRange(1.5))
        );
    }

    #[test]
    fn test_rejects_both_value_and_delta() {
        let mut instr = base_instruction();
        instr.delta = Some(5.0);
        assert_eq!(instr.validate(), Err(InstructionError::BothValueAndDelta));
    }

    #[test]
    fn test_rejects_neither_value_nor_delta() {
        let mut instr = base_instruction();
        instr.new_value = None;
        assert_eq!(instr.validate(), Err(InstructionError::MissingValueAndDelta));
    }

    #[test]
    fn test_delta_only_is_valid() {
        let mut instr = base_instruction();
        instr.new_value = None;
        instr.delta = Some(-10.0);
        assert_eq!(instr.validate(), Ok(()));
        assert_eq!(instr.value(), -10.0);
    }

    #[test]
    fn test_extract_json_strips_markdown_fences() {
        let text = "```json\n{\"part\": \"shaft\", \"feature\": \"Extrude1\", \"parameter\": \"Diameter\", \"new_value\": 35, \"unit\": \"mm\", \"confidence\": 0.95}\n```";
        let values = extract_json(text);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["part"], "shaft");
    }

    #[test]
    fn test_extract_json_flattens_arrays() {
        let text = r#"[
            {"part": "flange", "feature": "Extrude1", "parameter": "Width", "new_value": 40, "unit": "mm", "confidence": 0.92},
            {"part": "flange", "feature": "Thicken1", "parameter": "Thickness", "new_value": 15, "unit": "mm", "confidence": 0.91}
        ]"#;
        let values = extract_json(text);
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["feature"], "Thicken1");
    }

    #[test]
    fn test_extract_json_skips_unparseable_blocks() {
        let text = "Here you go: {not json at all} and then {\"part\": \"hole\", \"feature\": \"Hole1\", \"parameter\": \"Diameter\", \"new_value\": 8, \"unit\": \"mm\", \"confidence\": 0.98}";
        let values = extract_json(text);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["part"], "hole");
    }

    #[test]
    fn test_extract_json_empty_on_prose_only() {
        assert!(extract_json("I cannot convert that instruction.").is_empty());
    }

    #[test]
    fn test_screen_candidates_counts_rejects() {
        let candidates = vec![
            serde_json::json!({"part": "shaft", "feature": "Extrude1", "parameter": "Diameter", "new_value": 35, "unit": "mm", "confidence": 0.95}),
            // wrong unit
            serde_json::json!({"part": "shaft", "feature": "Extrude1", "parameter": "Diameter", "new_value": 35, "unit": "in", "confidence": 0.95}),
            // error object from the model
            serde_json::json!({"error": "Invalid CAD instruction."}),
        ];
        let (valid, rejected) = screen_candidates(candidates);
        assert_eq!(valid.len(), 1);
        assert_eq!(rejected, 2);
    }

    #[test]
    fn test_instruction_roundtrips_without_null_fields() {
        let instr = base_instruction();
        let json = serde_json::to_value(&instr).unwrap();
        assert!(json.get("delta").is_none(), "absent delta must not serialize");
        assert_eq!(json["new_value"], 35.0);
    }
}
