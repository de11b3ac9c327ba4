use crate::config::toml_config::{Environment, TomlConfig};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "external-task-worker")]
#[command(about = "Fetch-and-lock worker for engine external tasks")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "external-client.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the engine REST base URL from config
    #[arg(long)]
    pub base_url: Option<String>,

    /// Override the worker id from config
    #[arg(long)]
    pub worker_id: Option<String>,

    /// Run with the test customizer (priority ordering disabled)
    #[arg(long)]
    pub test_mode: bool,

    /// Additional topics to subscribe with the logging handler
    #[arg(long, value_delimiter = ',')]
    pub topic: Vec<String>,

    /// Stop after this many fetch cycles
    #[arg(long)]
    pub max_polls: Option<u64>,

    /// Show resolved configuration without contacting the engine
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// 命令列參數覆蓋檔案設定
    pub fn apply_overrides(&self, config: &mut TomlConfig) {
        if let Some(base_url) = &self.base_url {
            config.client.base_url = Some(base_url.clone());
            tracing::info!("🔧 base_url overridden to: {}", base_url);
        }

        if let Some(worker_id) = &self.worker_id {
            config.client.worker_id = Some(worker_id.clone());
            tracing::info!("🔧 worker_id overridden to: {}", worker_id);
        }

        if self.test_mode {
            config.client.environment = Some(Environment::Test);
            tracing::info!("🔧 Test mode enabled");
        }
    }
}
