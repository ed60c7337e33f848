//! Restricted execution of extracted script code against the shared dataset.

mod bindings;

use rhai::{Engine, Scope};
use thiserror::Error;
use tracing::{debug, error};

use crate::data::FrameHandle;
use crate::parser::{self, Extraction};

/// Runtime failure inside generated code. Side effects made before the
/// failure (dataset mutation, file writes) are not rolled back.
#[derive(Debug, Error)]
#[error("script execution failed: {0}")]
pub struct ExecError(pub String);

/// Script engine with the fixed binding surface: the engine builtins, the
/// registered dataset/chart API, and a scope holding exactly one name,
/// `dataset`. No ambient process, filesystem or network access is exposed.
pub struct ScriptRunner {
    engine: Engine,
}

impl ScriptRunner {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        // Custom operator overloads (element-wise array arithmetic) must win
        // over built-ins like array concatenation.
        engine.set_fast_operators(false);
        engine.set_max_operations(10_000_000);
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_string_size(1_000_000);
        engine.set_max_array_size(1_000_000);
        engine.set_max_map_size(100_000);
        engine.on_print(|s| debug!(target: "vizflow::script", "{s}"));
        engine.on_debug(|s, _source, pos| debug!(target: "vizflow::script", "{pos:?} {s}"));
        bindings::register(&mut engine);
        Self { engine }
    }

    /// Evaluates `code` with the dataset bound as `dataset`. Any evaluation
    /// error is captured; nothing panics or propagates past this boundary.
    pub fn run(&self, code: &str, dataset: &FrameHandle) -> Result<(), ExecError> {
        let mut scope = Scope::new();
        scope.push("dataset", dataset.clone());
        self.engine
            .run_with_scope(&mut scope, code)
            .map_err(|e| ExecError(e.to_string()))
    }

    /// Extracts tagged code from raw model text and runs it. Missing or
    /// empty blocks and runtime failures all collapse to `false`; the error
    /// detail goes to the log, not to the caller.
    pub fn extract_and_run(&self, raw_text: &str, dataset: &FrameHandle) -> bool {
        let code = match parser::extract_code(raw_text) {
            Extraction::Code(code) => code,
            Extraction::EmptyBlock => {
                error!("the executable code block is empty");
                return false;
            }
            Extraction::NoTags => {
                error!(
                    "no executable code found between {}/{} tags",
                    parser::OPEN_TAG,
                    parser::CLOSE_TAG
                );
                return false;
            }
        };
        debug!("--- code to be executed ---\n{code}\n---------------------------");
        match self.run(&code, dataset) {
            Ok(()) => {
                debug!("script executed successfully");
                true
            }
            Err(e) => {
                error!("error during script execution: {e}");
                false
            }
        }
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, Frame, FrameHandle};

    fn dataset() -> FrameHandle {
        let mut frame = Frame::new();
        frame
            .set_column("a", Column::Int64(vec![Some(1), Some(2), Some(3)]))
            .expect("column");
        FrameHandle::new(frame)
    }

    #[test]
    fn undefined_name_fails_and_leaves_dataset_untouched() {
        let runner = ScriptRunner::new();
        let ds = dataset();
        let before = ds.lock().clone();
        assert!(runner.run("x[0] = 1;", &ds).is_err());
        assert_eq!(*ds.lock(), before);
    }

    #[test]
    fn script_can_derive_a_new_column() {
        let runner = ScriptRunner::new();
        let ds = dataset();
        runner
            .run(r#"dataset["new_col"] = dataset["a"] * 2;"#, &ds)
            .expect("run");
        assert_eq!(
            ds.lock().column("new_col"),
            Some(&Column::Float64(vec![Some(2.0), Some(4.0), Some(6.0)]))
        );
    }

    #[test]
    fn array_addition_is_element_wise() {
        let runner = ScriptRunner::new();
        let ds = dataset();
        runner
            .run(r#"dataset["b"] = dataset["a"] + dataset["a"];"#, &ds)
            .expect("run");
        assert_eq!(
            ds.lock().column("b"),
            Some(&Column::Float64(vec![Some(2.0), Some(4.0), Some(6.0)]))
        );
    }

    #[test]
    fn null_cells_propagate_through_arithmetic() {
        let mut frame = Frame::new();
        frame
            .set_column("a", Column::Int64(vec![Some(1), None, Some(3)]))
            .expect("column");
        let ds = FrameHandle::new(frame);
        let runner = ScriptRunner::new();
        runner
            .run(r#"dataset["b"] = dataset["a"] * 10;"#, &ds)
            .expect("run");
        assert_eq!(
            ds.lock().column("b"),
            Some(&Column::Float64(vec![Some(10.0), None, Some(30.0)]))
        );
    }

    #[test]
    fn unknown_column_is_a_runtime_error() {
        let runner = ScriptRunner::new();
        let err = runner
            .run(r#"let x = dataset["nope"];"#, &dataset())
            .expect_err("unknown column");
        assert!(err.to_string().contains("unknown column"));
    }

    #[test]
    fn extract_and_run_requires_tags() {
        let runner = ScriptRunner::new();
        assert!(!runner.extract_and_run("no code here", &dataset()));
    }

    #[test]
    fn extract_and_run_rejects_empty_block() {
        let runner = ScriptRunner::new();
        assert!(!runner.extract_and_run("<execute_script>  </execute_script>", &dataset()));
    }

    #[test]
    fn extract_and_run_executes_tagged_code() {
        let runner = ScriptRunner::new();
        let ds = dataset();
        let text = "Model prose.\n<execute_script>\ndataset[\"b\"] = dataset[\"a\"] + 10;\n</execute_script>";
        assert!(runner.extract_and_run(text, &ds));
        assert_eq!(
            ds.lock().column("b"),
            Some(&Column::Float64(vec![Some(11.0), Some(12.0), Some(13.0)]))
        );
    }

    #[test]
    fn runtime_error_inside_tagged_code_reports_false() {
        let runner = ScriptRunner::new();
        assert!(!runner.extract_and_run("<execute_script>boom()</execute_script>", &dataset()));
    }

    #[test]
    fn aggregation_helpers_are_registered() {
        let runner = ScriptRunner::new();
        let ds = dataset();
        runner
            .run(
                r#"
                let total = sum(dataset["a"]);
                if total != 6.0 { throw "bad sum"; }
                let avg = mean(dataset["a"]);
                if avg != 2.0 { throw "bad mean"; }
                let uniq = unique(["x", "y", "x"]);
                if uniq.len() != 2 { throw "bad unique"; }
                let grouped = group_sum(["a", "b", "a"], [1, 2, 3]);
                if grouped["a"] != 4.0 { throw "bad group_sum"; }
                "#,
                &ds,
            )
            .expect("helpers");
    }

    #[test]
    fn chart_api_writes_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.png");
        let runner = ScriptRunner::new();
        let script = format!(
            r#"
            let c = chart("Totals");
            c.x_label("Category");
            c.y_label("Value");
            c.bar("totals", ["a", "b"], [1.0, 2.0]);
            c.save("{}");
            "#,
            path.display()
        );
        runner.run(&script, &dataset()).expect("chart script");
        assert!(path.exists());
    }

    #[test]
    fn empty_chart_save_is_a_runtime_error() {
        let runner = ScriptRunner::new();
        let script = r#"
            let c = chart("nothing to draw");
            c.save("never.png");
        "#;
        let err = runner.run(script, &dataset()).expect_err("empty chart");
        assert!(err.to_string().contains("failed to save chart"));
    }

    #[test]
    fn unwritable_save_path_is_a_runtime_error() {
        let runner = ScriptRunner::new();
        let script = r#"
            let c = chart("totals");
            c.bar("totals", ["a"], [1.0]);
            c.save("/nonexistent-dir/never.png");
        "#;
        assert!(runner.run(script, &dataset()).is_err());
    }
}
