mod cli;

use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use vizflow::config::Config;
use vizflow::data::CsvSource;
use vizflow::llm::LlmClient;
use vizflow::workflow::{Status, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vizflow=info")),
        )
        .init();

    let args = cli::Cli::parse();
    let cfg = Config::load();

    // The instruction can also be piped in on stdin
    let mut instruction = args.instruction.unwrap_or_default();
    if instruction.is_empty() && !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        instruction = buf.trim().to_string();
    }
    if instruction.is_empty() {
        instruction = cfg.get("DEFAULT_INSTRUCTION").unwrap_or_default();
    }
    if instruction.is_empty() {
        bail!("provide an instruction as an argument, via stdin, or as DEFAULT_INSTRUCTION");
    }

    let generation_model = args
        .model
        .or_else(|| cfg.get("GENERATION_MODEL"))
        .unwrap_or_else(|| "gpt-4o-mini".to_string());
    let reflection_model = args
        .reflection_model
        .or_else(|| cfg.get("REFLECTION_MODEL"))
        .unwrap_or_else(|| "gpt-4o".to_string());
    let data_path = args
        .data
        .or_else(|| cfg.get_path("DATA_PATH"))
        .unwrap_or_else(|| "data/coffee_sales.csv".into());
    let charts_dir = args
        .charts_dir
        .or_else(|| cfg.get_path("CHARTS_DIR"))
        .unwrap_or_else(|| "outputs/charts".into());

    let client = Arc::new(LlmClient::from_config(&cfg)?);
    let source = CsvSource::new(data_path);
    let workflow = Workflow::new(client, generation_model, reflection_model, charts_dir);

    let result = workflow.run(&source, &instruction, &args.basename).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match result.status {
        Status::Completed => println!("{}", "Completed".green()),
        Status::ErrorV2 => println!("{}", "Error in V2 (V1 chart is still available)".yellow()),
        Status::ErrorV1 => println!("{}", "Error in V1".red()),
        Status::NoData => println!("{}", "No data loaded".red()),
    }
    if let Some(p) = &result.chart_v1_path {
        println!("V1 chart: {}", p.display());
    }
    if let Some(p) = &result.chart_v2_path {
        println!("V2 chart: {}", p.display());
    }
    if let Some(f) = &result.feedback {
        println!("Feedback: {}", f);
    }
    Ok(())
}
