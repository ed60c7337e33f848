use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "vizflow", about = "Reflective chart generation pipeline", version)]
pub struct Cli {
    /// Natural-language charting instruction.
    #[arg(value_name = "INSTRUCTION")]
    pub instruction: Option<String>,

    /// Model used to generate the initial chart code.
    #[arg(long)]
    pub model: Option<String>,

    /// Vision-capable model used to critique the V1 chart.
    #[arg(long = "reflection-model")]
    pub reflection_model: Option<String>,

    /// CSV file to load the dataset from.
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Directory where chart images are written.
    #[arg(long = "charts-dir")]
    pub charts_dir: Option<PathBuf>,

    /// Base name for the chart files (<basename>_v1.png / <basename>_v2.png).
    #[arg(long, default_value = "chart")]
    pub basename: String,

    /// Print the result record as JSON.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
