use std::sync::Arc;

use anyhow::Result;
use magentic_orchestrator::llm::client::{LlmClient, OpenAiCompatibleClient};
use magentic_orchestrator::{CliInterface, OrchestratorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    if std::env::var("DASHSCOPE_API_KEY").is_err() && std::env::var("OPENAI_API_KEY").is_err() {
        eprintln!("Error: set DASHSCOPE_API_KEY (or OPENAI_API_KEY) before running.");
        eprintln!("DashScope keys are available from: https://dashscope.console.aliyun.com/");
        std::process::exit(1);
    }

    let config = match std::env::var("ORCHESTRATOR_CONFIG_PATH") {
        Ok(path) => {
            let yaml = std::fs::read_to_string(&path)?;
            OrchestratorConfig::from_yaml_str(&yaml)?
        }
        Err(_) => OrchestratorConfig::default(),
    };

    let client: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::from_env(false)?);
    let mut interface = CliInterface::new(config, client)?;
    interface.run().await
}
