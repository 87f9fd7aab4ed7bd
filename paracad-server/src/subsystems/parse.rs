//! Parse subsystem — free-text CAD edit requests to structured instructions
//!
//! This subsystem implements `ParacadRequest::Parse`:
//! - Wraps the request text in the fixed few-shot parser prompt
//! - Runs the parser model (non-streaming completion)
//! - Extracts JSON candidates from the response and screens them against the
//!   instruction schema
//!
//! The model is the only NLP here; everything on this side is extraction and
//! validation.

use anyhow::{bail, Result};
use paracad_core::completion::CompletionBackend;
use paracad_core::instruction::{extract_json, screen_candidates, Instruction, KNOWN_FEATURES};
use serde::{Deserialize, Serialize};

/// Outcome of one parse call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub instructions: Vec<Instruction>,
    /// Candidates dropped for schema violations.
    pub rejected: usize,
    pub model: String,
}

/// Build the parser prompt around the raw request text.
///
/// The schema block, rules, and worked examples are fixed; only the trailing
/// instruction line varies. The model is told to output nothing but JSON —
/// `extract_json` copes when it does anyway.
pub fn build_parser_prompt(text: &str) -> String {
    let features = KNOWN_FEATURES
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an assistant that converts CAD instructions into structured JSON.
If multiple changes are described, output a list of JSON objects.
Use ONLY this schema:

{{
  "part": "<string>",
  "feature": "<see allowed features below>",
  "parameter": "<Length, Width, Diameter, etc.>",
  "new_value": <optional_numeric_value>,
  "delta": <optional_numeric_value>,
  "unit": "mm",
  "confidence": <float between 0 and 1>
}}

RULES:
- Step 1: Assess if the instruction is valid and clearly refers to a CAD-related dimension or feature.
- Step 2: If valid, convert to the JSON schema above.
- Step 3: If invalid, return: {{"error": "Invalid CAD instruction."}}
- If the instruction includes terms like "increase by", "decrease by", "change by", "add", "reduce by", or "modify by", use only "delta" (a numeric difference). Do NOT output "new_value" in such cases.
- Only use "new_value" if a final absolute value is clearly specified (e.g., "set length to 100 mm").
- DO NOT INCLUDE both "new_value" and "delta" in the same output.
- Use only ONE value as "new_value" — the target value (e.g. 200 in 'from 100 mm to 200 mm').
- "parameter" is what is being modified (e.g. Length, Width, Diameter, Height, etc.).
- "confidence" is a float between 0 and 1, estimating how certain you are that the output correctly represents the instruction.
- "unit" must be 'mm'.
- "feature" must be one of the following:
{features}
- Do NOT output anything other than the final JSON.

Examples:

Instruction: "Change the shaft diameter to 35 mm."
Output:
{{"part": "shaft", "feature": "Extrude1", "parameter": "Diameter", "new_value": 35, "unit": "mm", "confidence": 0.95}}

Instruction: "Reduce the piston rod length from 150 mm to 125 mm."
Output:
{{"part": "piston rod", "feature": "Extrude1", "parameter": "Length", "new_value": 125, "unit": "mm", "confidence": 0.97}}

Instruction: "Make the flange 40 mm wide and 15 mm thick."
Output:
[
  {{"part": "flange", "feature": "Extrude1", "parameter": "Width", "new_value": 40, "unit": "mm", "confidence": 0.92}},
  {{"part": "flange", "feature": "Thicken1", "parameter": "Thickness", "new_value": 15, "unit": "mm", "confidence": 0.91}}
]

Instruction: "{text}"
Output:
"#
    )
}

/// Parse a free-text edit request into validated instructions.
///
/// # Constraints
/// * Empty input is rejected before any model call
/// * Responses with more than `max_instructions` candidates are treated as
///   runaway generation and rejected wholesale
/// * A response with zero valid instructions is an error, not an empty success
pub async fn parse_instructions(
    text: &str,
    backend: &dyn CompletionBackend,
    max_instructions: u32,
) -> Result<ParseOutcome> {
    let text = text.trim();
    if text.is_empty() {
        bail!("Instruction text cannot be empty");
    }

    let prompt = build_parser_prompt(text);
    let response = backend.complete(&prompt).await?;

    let candidates = extract_json(&response);
    if candidates.is_empty() {
        bail!("No JSON found in parser model response");
    }
    if candidates.len() > max_instructions as usize {
        bail!(
            "Parser model returned {} JSON objects (limit {}) — likely runaway generation",
            candidates.len(),
            max_instructions
        );
    }

    let (instructions, rejected) = screen_candidates(candidates);
    if instructions.is_empty() {
        bail!("Parser model produced no valid instructions ({} rejected)", rejected);
    }

    tracing::info!(
        count = instructions.len(),
        rejected,
        model = backend.model(),
        "Parsed instruction text"
    );

    Ok(ParseOutcome {
        instructions,
        rejected,
        model: backend.model().to_string(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use paracad_core::completion::{CompletionConfig, OllamaCompletionClient};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_backend(mock_server: &MockServer) -> OllamaCompletionClient {
        let config = CompletionConfig {
            base_url: mock_server.uri(),
            model: "gemma3:4b".to_string(),
            temperature: 0.1,
            num_predict: 512,
            timeout_seconds: 10,
            max_retries: 1,
            retry_delay_ms: 10,
        };
        OllamaCompletionClient::new(config).expect("Failed to create test client")
    }

    async fn mock_completion(mock_server: &MockServer, response_text: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": response_text,
                "done": true
            })))
            .mount(mock_server)
            .await;
    }

    #[tokio::test]
    async fn test_parse_single_instruction_from_fenced_json() {
        let mock_server = MockServer::start().await;
        mock_completion(
            &mock_server,
            "```json\n{\"part\": \"shaft\", \"feature\": \"Extrude1\", \"parameter\": \"Diameter\", \"new_value\": 35, \"unit\": \"mm\", \"confidence\": 0.95}\n```",
        )
        .await;

        let backend = test_backend(&mock_server);
        let outcome = parse_instructions("Change the shaft diameter to 35 mm", &backend, 20)
            .await
            .expect("parse should succeed");

        assert_eq!(outcome.instructions.len(), 1);
        assert_eq!(outcome.rejected, 0);
        assert_eq!(outcome.instructions[0].part, "shaft");
        assert_eq!(outcome.instructions[0].new_value, Some(35.0));
    }

    #[tokio::test]
    async fn test_parse_multiple_instructions_from_array() {
        let mock_server = MockServer::start().await;
        mock_completion(
            &mock_server,
            r#"[
                {"part": "flange", "feature": "Extrude1", "parameter": "Width", "new_value": 40, "unit": "mm", "confidence": 0.92},
                {"part": "flange", "feature": "Thicken1", "parameter": "Thickness", "new_value": 15, "unit": "mm", "confidence": 0.91}
            ]"#,
        )
        .await;

        let backend = test_backend(&mock_server);
        let outcome = parse_instructions("Make the flange 40 mm wide and 15 mm thick", &backend, 20)
            .await
            .expect("parse should succeed");

        assert_eq!(outcome.instructions.len(), 2);
        assert_eq!(outcome.instructions[1].parameter, "Thickness");
    }

    #[tokio::test]
    async fn test_parse_keeps_valid_drops_invalid() {
        let mock_server = MockServer::start().await;
        mock_completion(
            &mock_server,
            r#"[
                {"part": "tube", "feature": "Extrude1", "parameter": "Diameter", "new_value": 25, "unit": "mm", "confidence": 0.9},
                {"part": "tube", "feature": "Extrude1", "parameter": "Diameter", "new_value": 25, "delta": 5, "unit": "mm", "confidence": 0.9}
            ]"#,
        )
        .await;

        let backend = test_backend(&mock_server);
        let outcome = parse_instructions("modify the tube diameter to 25mm", &backend, 20)
            .await
            .expect("parse should succeed");

        assert_eq!(outcome.instructions.len(), 1);
        assert_eq!(outcome.rejected, 1);
    }

    #[tokio::test]
    async fn test_parse_rejects_empty_input_without_model_call() {
        let mock_server = MockServer::start().await;
        // No mock mounted — a request would 404 and surface as a different error.
        let backend = test_backend(&mock_server);

        let err = parse_instructions("   ", &backend, 20).await.unwrap_err();
        assert!(err.to_string().contains("empty"), "got: {err}");
    }

    #[tokio::test]
    async fn test_parse_rejects_prose_only_response() {
        let mock_server = MockServer::start().await;
        mock_completion(&mock_server, "Sorry, I cannot help with that.").await;

        let backend = test_backend(&mock_server);
        let err = parse_instructions("do something weird", &backend, 20)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No JSON"), "got: {err}");
    }

    #[tokio::test]
    async fn test_parse_rejects_runaway_generation() {
        let mock_server = MockServer::start().await;
        let object = r#"{"part": "x", "feature": "Extrude1", "parameter": "Length", "new_value": 1, "unit": "mm", "confidence": 0.5}"#;
        let runaway = format!("[{}]", vec![object; 25].join(","));
        mock_completion(&mock_server, &runaway).await;

        let backend = test_backend(&mock_server);
        let err = parse_instructions("make everything longer", &backend, 20)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("runaway"), "got: {err}");
    }

    #[test]
    fn test_prompt_contains_feature_list_and_text() {
        let prompt = build_parser_prompt("Change the shaft diameter to 35 mm.");
        assert!(prompt.contains("- Hole1"));
        assert!(prompt.contains("Instruction: \"Change the shaft diameter to 35 mm.\""));
        assert!(prompt.contains("\"unit\" must be 'mm'"));
    }
}
