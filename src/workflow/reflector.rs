//! Critique of the V1 chart image and regeneration of refined code.

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::llm::CompletionService;
use crate::parser;
use crate::util;

use super::generator::SCRIPT_REFERENCE;

/// Sends the V1 image plus context to a vision-capable model and parses the
/// two-part response. Returns whatever the parser produces, including its
/// failure-fallback feedback string.
pub async fn reflect(
    completion: &dyn CompletionService,
    chart_path: &Path,
    instruction: &str,
    model: &str,
    out_path_v2: &Path,
    code_v1: &str,
    schema: &str,
) -> Result<(String, String)> {
    let (media_type, b64_image) = util::encode_image_b64(chart_path)?;
    let prompt = build_prompt(instruction, out_path_v2, code_v1, schema);
    debug!("sending reflection prompt");
    let content = completion
        .complete_with_image(model, &prompt, &media_type, &b64_image)
        .await?;
    debug!("received reflection response");
    Ok(parser::parse_reflection(&content))
}

pub(crate) fn build_prompt(
    instruction: &str,
    out_path_v2: &Path,
    code_v1: &str,
    schema: &str,
) -> String {
    let out_path_v2 = out_path_v2.display();
    format!(
        "You are a data visualization expert.
Your task is to critique the attached chart and then provide refined chart code.

You MUST return your response in this exact two-part format, with no extra text:

PART 1: A single-line, valid JSON object with a single key \"feedback\".
PART 2: After a newline, the script code wrapped in <execute_script> tags.

EXAMPLE of a perfect response:
{{\"feedback\": \"The legend overlaps the tallest bar; move it or rescale the y axis.\"}}
<execute_script>
let c = chart(\"Quarterly sales\");
// ... more code ...
c.save(\"{out_path_v2}\");
</execute_script>

Original code (for context):
{code_v1}

{SCRIPT_REFERENCE}

HARD CONSTRAINTS for the generated code:
- Use only styles from the whitelist: 'default', 'light', 'dark'.
- Assume the variable 'dataset' already exists; do not read from files.
- Save the new chart to '{out_path_v2}' on a 1200x800 canvas.
- Call save() exactly once, as the last step.
- Use only the documented API and the core language.

Schema (columns available in dataset):
{schema}

Instruction:
{instruction}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn prompt_embeds_original_code_and_v2_path() {
        let path = PathBuf::from("outputs/charts/chart_v2.png");
        let prompt = build_prompt(
            "Plot sales.",
            &path,
            "<execute_script>let c = chart(\"old\");</execute_script>",
            "- sales: integer",
        );
        assert!(prompt.contains("chart_v2.png"));
        assert!(prompt.contains("let c = chart(\"old\");"));
        assert!(prompt.contains("- sales: integer"));
        assert!(prompt.contains("\"feedback\""));
    }
}
