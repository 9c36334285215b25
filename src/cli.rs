use clap::Parser;
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "enclavegen")]
#[command(about = "Infers the cross-partition interface of a TEE project and generates its stubs")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Project root containing the secure/ and insecure/ trees
    pub project: PathBuf,

    /// Template directory (defaults to ./template)
    #[arg(short, long)]
    pub templates: Option<PathBuf>,

    /// Output directory (defaults to ./generated)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        engine.run(self.project, self.templates, self.output).await
    }
}
