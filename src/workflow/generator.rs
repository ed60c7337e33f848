//! First-pass prompt construction and the V1 completion call.

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::llm::CompletionService;

/// Scripting-environment reference shared by both prompts. The model only
/// ever sees this surface; anything outside it fails at execution time.
pub(crate) const SCRIPT_REFERENCE: &str = "\
Scripting environment reference (Rhai):
- dataset[\"col\"] returns the column as an array; missing values are ().
- dataset[\"new_col\"] = <array> adds or replaces a column (same length as the dataset).
- dataset.nrows(), dataset.ncols(), dataset.columns() describe the dataset.
- Arrays support element-wise arithmetic with numbers and with equal-length
  arrays: dataset[\"a\"] * 2, dataset[\"a\"] + dataset[\"b\"].
- Helpers: sum(arr), mean(arr), unique(arr), group_sum(keys, values) returns
  a map from key to sum of the matching values.
- Charting:
  let c = chart(\"Title\");
  c.x_label(\"...\"); c.y_label(\"...\"); c.size(1200, 800);
  c.style(\"default\");  // whitelist: \"default\", \"light\", \"dark\"
  c.bar(\"name\", labels, values);
  c.line(\"name\", xs, ys);
  c.scatter(\"name\", xs, ys);
  c.save(\"path.png\");  // writes the chart as a PNG file";

/// Builds the V1 prompt and performs one completion call. The raw model
/// text is returned unmodified: no retry, no validation at this layer.
pub async fn generate(
    completion: &dyn CompletionService,
    instruction: &str,
    model: &str,
    out_path: &Path,
    schema: &str,
) -> Result<String> {
    let prompt = build_prompt(instruction, out_path, schema);
    debug!("sending generation prompt");
    let response = completion.complete(model, &prompt).await?;
    debug!("received generation response");
    Ok(response)
}

pub(crate) fn build_prompt(instruction: &str, out_path: &Path, schema: &str) -> String {
    let out_path = out_path.display();
    format!(
        "You are a data visualization expert.

Return your answer *strictly* in this format:

<execute_script>
// valid script code here
</execute_script>

Do not add explanations, only the tags and the code.

The code should create a visualization from a dataset that is already loaded.
This is the schema of the dataset (including data types):
{schema}

{SCRIPT_REFERENCE}

User instruction: {instruction}

Requirements for the code:
1. The dataset is already loaded and available in a variable named 'dataset'. Do NOT try to load any data.
2. Build exactly one chart using the chart() API described above.
3. Add a clear title, axis labels, and a legend if needed.
4. Save the figure as '{out_path}' on a 1200x800 canvas.
5. The environment is headless: save() is the only way to produce output.
6. Call save() exactly once, as the last step.
7. Use only the documented API and the core language.

Return ONLY the code wrapped in <execute_script> tags."
    )
}
