//! Generate subsystem — CAD script generation from instructions + examples
//!
//! Builds the coder-model prompt out of the parsed instructions and the
//! retrieved snippets, runs the completion, and post-processes the raw model
//! output into a runnable Fusion script shape (fences stripped, mandatory
//! imports and `stop()` stub in place).

use anyhow::{bail, Result};
use paracad_core::completion::CompletionBackend;
use paracad_core::instruction::Instruction;

use crate::subsystems::store::SnippetMatch;

/// Fusion's internal length unit is cm; instruction values arrive in mm.
/// Scaling happens here so the model is never asked to do unit conversion.
const MM_TO_INTERNAL: f64 = 0.1;

/// Format retrieved snippets for inclusion in the prompt.
pub fn format_examples(matches: &[SnippetMatch]) -> String {
    if matches.is_empty() {
        return "No relevant examples found.".to_string();
    }

    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let tags = m
                .tags
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();

            format!(
                "\nExample {n}:\nTitle: {title}\nDescription: {description}\nCategory: {category}\nTags: {tags}\nScore: {score:.3}\n\nCode:\n```python\n{code}\n```\n",
                n = i + 1,
                title = m.title,
                description = m.description,
                category = m.category,
                score = m.score,
                code = m.code,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-line task summary: "Create <part> with Length: 100mm, Width: 30mm".
pub fn task_summary(instructions: &[Instruction]) -> String {
    let main_part = instructions
        .first()
        .map(|i| i.part.as_str())
        .unwrap_or("object");

    let dims = instructions
        .iter()
        .map(|i| format!("{}: {}{}", i.parameter, i.value(), i.unit))
        .collect::<Vec<_>>()
        .join(", ");

    format!("Create {main_part} with {dims}")
}

/// Build the coder-model prompt.
///
/// Values are pre-scaled to the CAD host's internal unit; the model is told
/// not to emit any unit-conversion code of its own.
pub fn build_codegen_prompt(instructions: &[Instruction], examples: &str) -> String {
    let summary = task_summary(instructions);

    let scaled_values = instructions
        .iter()
        .map(|i| {
            format!(
                "- {}: {}",
                i.parameter.to_lowercase(),
                i.value() * MM_TO_INTERNAL
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Generate Fusion 360 Python code for this task:

TASK: {summary}

DIMENSIONS TO USE (ALREADY SCALED FOR FUSION):
{scaled_values}

CRITICAL REQUIREMENTS:
- Use the EXACT values specified above (already scaled for Fusion)
- Do NOT ask user for any input - use hardcoded values
- Do NOT include any unit conversion code
- Do NOT set units manager or defaultLengthUnits

EXAMPLES FROM DATABASE:
{examples}

Generate working Fusion 360 Python code with:
- import adsk.core, adsk.fusion, traceback
- def run(context): with try/except
- def stop(context): pass
- NO units management code
- Use the exact scaled values shown above
- Create complete geometry as specified

Code only, no explanations:"#
    )
}

/// Clean the raw model output into a runnable script.
///
/// - Strips Markdown code fences (` ```python ` or bare ` ``` `)
/// - Prepends the adsk imports when the head of the script lacks them
/// - Appends a `def stop(context): pass` stub when absent
pub fn refine_code(raw: &str) -> String {
    let mut code = raw.to_string();

    if let Some(start) = code.find("```python") {
        let after = &code[start + "```python".len()..];
        code = match after.find("```") {
            Some(end) => after[..end].to_string(),
            None => after.to_string(),
        };
    } else if let Some(start) = code.find("```") {
        let after = &code[start + 3..];
        code = match after.find("```") {
            Some(end) => after[..end].to_string(),
            None => after.to_string(),
        };
    }

    let mut lines: Vec<String> = code.trim().lines().map(str::to_string).collect();

    let has_imports = lines
        .iter()
        .take(5)
        .any(|line| line.contains("import adsk"));
    if !has_imports {
        let mut with_imports =
            vec!["import adsk.core, adsk.fusion, traceback".to_string(), String::new()];
        with_imports.append(&mut lines);
        lines = with_imports;
    }

    let has_stop = lines.iter().any(|line| line.contains("def stop(context):"));
    if !has_stop {
        lines.push(String::new());
        lines.push("def stop(context):".to_string());
        lines.push("    pass".to_string());
    }

    lines.join("\n")
}

/// Generate and refine a script for the given instructions.
pub async fn generate_code(
    instructions: &[Instruction],
    matches: &[SnippetMatch],
    backend: &dyn CompletionBackend,
) -> Result<String> {
    if instructions.is_empty() {
        bail!("No instructions to generate code for");
    }

    let examples = format_examples(matches);
    let prompt = build_codegen_prompt(instructions, &examples);

    tracing::info!(
        model = backend.model(),
        instructions = instructions.len(),
        examples = matches.len(),
        "Generating CAD script"
    );

    let raw = backend.complete(&prompt).await?;
    let refined = refine_code(&raw);

    if refined.trim().is_empty() {
        bail!("Model produced an empty script");
    }

    tracing::info!(chars = refined.len(), "Script generation complete");
    Ok(refined)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn instruction(parameter: &str, new_value: f64) -> Instruction {
        Instruction {
            part: "cylinder".to_string(),
            feature: "Extrude1".to_string(),
            parameter: parameter.to_string(),
            new_value: Some(new_value),
            delta: None,
            unit: "mm".to_string(),
            confidence: 0.95,
        }
    }

    fn snippet_match(title: &str, code: &str, score: f64) -> SnippetMatch {
        SnippetMatch {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: "desc".to_string(),
            category: "extrude".to_string(),
            tags: serde_json::json!(["cylinder"]),
            parameters: serde_json::json!({}),
            code: code.to_string(),
            score,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_task_summary_joins_parameters() {
        let instructions = vec![instruction("Length", 100.0), instruction("Diameter", 30.0)];
        assert_eq!(
            task_summary(&instructions),
            "Create cylinder with Length: 100mm, Diameter: 30mm"
        );
    }

    #[test]
    fn test_prompt_scales_mm_to_internal_units() {
        let instructions = vec![instruction("Length", 100.0)];
        let prompt = build_codegen_prompt(&instructions, "No relevant examples found.");
        assert!(prompt.contains("- length: 10"), "100 mm must scale to 10: {prompt}");
        assert!(prompt.contains("Do NOT include any unit conversion code"));
    }

    #[test]
    fn test_format_examples_empty() {
        assert_eq!(format_examples(&[]), "No relevant examples found.");
    }

    #[test]
    fn test_format_examples_includes_metadata_and_code() {
        let matches = vec![snippet_match("Cylinder extrude", "import adsk.core", 0.87)];
        let formatted = format_examples(&matches);
        assert!(formatted.contains("Example 1:"));
        assert!(formatted.contains("Title: Cylinder extrude"));
        assert!(formatted.contains("Score: 0.870"));
        assert!(formatted.contains("```python\nimport adsk.core\n```"));
    }

    #[test]
    fn test_refine_strips_python_fence() {
        let raw = "Here is the code:\n```python\nimport adsk.core, adsk.fusion, traceback\ndef run(context):\n    pass\n```\nDone!";
        let refined = refine_code(raw);
        assert!(!refined.contains("```"));
        assert!(!refined.contains("Done!"));
        assert!(refined.starts_with("import adsk.core"));
    }

    #[test]
    fn test_refine_strips_bare_fence() {
        let raw = "```\nimport adsk.core, adsk.fusion, traceback\ndef run(context):\n    pass\n```";
        let refined = refine_code(raw);
        assert!(!refined.contains("```"));
        assert!(refined.contains("def run(context):"));
    }

    #[test]
    fn test_refine_prepends_missing_imports() {
        let raw = "def run(context):\n    pass\n\ndef stop(context):\n    pass";
        let refined = refine_code(raw);
        assert!(refined.starts_with("import adsk.core, adsk.fusion, traceback"));
    }

    #[test]
    fn test_refine_appends_missing_stop() {
        let raw = "import adsk.core, adsk.fusion, traceback\ndef run(context):\n    pass";
        let refined = refine_code(raw);
        assert!(refined.ends_with("def stop(context):\n    pass"));
    }

    #[test]
    fn test_refine_leaves_complete_script_structure_alone() {
        let raw = "import adsk.core, adsk.fusion, traceback\n\ndef run(context):\n    pass\n\ndef stop(context):\n    pass";
        let refined = refine_code(raw);
        assert_eq!(refined.matches("def stop(context):").count(), 1);
        assert_eq!(refined.matches("import adsk").count(), 1);
    }
}
