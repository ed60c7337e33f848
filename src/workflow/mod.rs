//! Generate → execute → reflect → re-execute orchestration.

pub mod generator;
pub mod reflector;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::data::{DataSource, FrameHandle};
use crate::exec::ScriptRunner;
use crate::llm::CompletionService;

/// Terminal status of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Completed,
    ErrorV1,
    ErrorV2,
    NoData,
}

/// The outward result record for one run. Built once at a terminal state,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub status: Status,
    pub v1_success: bool,
    pub chart_v1_path: Option<PathBuf>,
    pub feedback: Option<String>,
    pub v2_success: bool,
    pub chart_v2_path: Option<PathBuf>,
}

pub struct Workflow {
    completion: Arc<dyn CompletionService>,
    runner: ScriptRunner,
    generation_model: String,
    reflection_model: String,
    charts_dir: PathBuf,
}

impl Workflow {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        generation_model: impl Into<String>,
        reflection_model: impl Into<String>,
        charts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            completion,
            runner: ScriptRunner::new(),
            generation_model: generation_model.into(),
            reflection_model: reflection_model.into(),
            charts_dir: charts_dir.into(),
        }
    }

    /// Runs the full pipeline for one instruction. Stages are strictly
    /// sequential with no retries: stage-local failures collapse into the
    /// result record, while completion-service transport errors propagate
    /// as hard errors.
    pub async fn run(
        &self,
        source: &dyn DataSource,
        instruction: &str,
        image_basename: &str,
    ) -> Result<WorkflowResult> {
        info!("starting chart workflow");

        let out_path_v1 = self.charts_dir.join(format!("{image_basename}_v1.png"));
        let out_path_v2 = self.charts_dir.join(format!("{image_basename}_v2.png"));
        std::fs::create_dir_all(&self.charts_dir).with_context(|| {
            format!("failed to create charts dir {}", self.charts_dir.display())
        })?;

        let frame = match source.load()? {
            Some(frame) if !frame.is_empty() => frame,
            _ => {
                error!("no data loaded; check the data source configuration");
                return Ok(WorkflowResult {
                    status: Status::NoData,
                    v1_success: false,
                    chart_v1_path: None,
                    feedback: None,
                    v2_success: false,
                    chart_v2_path: None,
                });
            }
        };
        debug!(rows = frame.height(), cols = frame.width(), "data loaded");

        // One shared handle per run: V1's mutations are visible to V2.
        let dataset = FrameHandle::new(frame);
        let schema = dataset.lock().schema_text();

        debug!(model = %self.generation_model, "step 1 (generate): requesting initial code");
        let raw_v1 = generator::generate(
            self.completion.as_ref(),
            instruction,
            &self.generation_model,
            &out_path_v1,
            &schema,
        )
        .await?;

        debug!("step 2 (execute v1): running initial code");
        if !self.runner.extract_and_run(&raw_v1, &dataset) {
            error!("stopping workflow: critical error in v1 code execution");
            return Ok(WorkflowResult {
                status: Status::ErrorV1,
                v1_success: false,
                chart_v1_path: None,
                feedback: None,
                v2_success: false,
                chart_v2_path: None,
            });
        }
        info!(path = %out_path_v1.display(), "v1 chart saved");

        debug!(model = %self.reflection_model, "step 3 (reflect): analyzing v1 chart");
        let (feedback, tagged_v2) = reflector::reflect(
            self.completion.as_ref(),
            &out_path_v1,
            instruction,
            &self.reflection_model,
            &out_path_v2,
            &raw_v1,
            &schema,
        )
        .await?;
        debug!(%feedback, "feedback received from reflector");

        debug!("step 4 (execute v2): running refined code");
        if !self.runner.extract_and_run(&tagged_v2, &dataset) {
            error!("could not produce v2 chart; v1 chart is still available");
            return Ok(WorkflowResult {
                status: Status::ErrorV2,
                v1_success: true,
                chart_v1_path: Some(out_path_v1),
                feedback: Some(feedback),
                v2_success: false,
                chart_v2_path: None,
            });
        }
        info!(path = %out_path_v2.display(), "v2 chart saved");

        info!("chart workflow completed");
        Ok(WorkflowResult {
            status: Status::Completed,
            v1_success: true,
            chart_v1_path: Some(out_path_v1),
            feedback: Some(feedback),
            v2_success: true,
            chart_v2_path: Some(out_path_v2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_record_serializes_with_contract_field_names() {
        let result = WorkflowResult {
            status: Status::ErrorV2,
            v1_success: true,
            chart_v1_path: Some(PathBuf::from("outputs/charts/chart_v1.png")),
            feedback: Some("needs a legend".to_string()),
            v2_success: false,
            chart_v2_path: None,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "ErrorV2");
        assert_eq!(json["v1_success"], true);
        assert_eq!(json["chart_v1_path"], "outputs/charts/chart_v1.png");
        assert_eq!(json["feedback"], "needs a legend");
        assert_eq!(json["v2_success"], false);
        assert_eq!(json["chart_v2_path"], serde_json::Value::Null);
    }
}
