use async_trait::async_trait;
use clap::Parser;
use external_task_client::domain::model::variables_from_json;
use external_task_client::utils::error::ErrorSeverity;
use external_task_client::utils::{logger, validation::Validate};
use external_task_client::{
    CliArgs, ClientError, ExternalClientFactory, ExternalTaskHandler, ExternalTaskService,
    LockedExternalTask, SubscriptionCreator, TomlConfig, TopicConfiguration, VariableMap,
};
use std::sync::Arc;

/// 記錄任務內容後直接完成，用來驗證 worker 與引擎之間的連線
struct LoggingHandler {
    topic: String,
}

#[async_trait]
impl ExternalTaskHandler for LoggingHandler {
    async fn execute(
        &self,
        task: &LockedExternalTask,
        service: &ExternalTaskService,
    ) -> external_task_client::Result<()> {
        tracing::info!(
            "📋 Task {} on '{}' (priority: {}, business key: {:?}, {} variables)",
            task.id,
            task.topic_name,
            task.priority,
            task.business_key,
            task.variables.len()
        );
        let variables = variables_from_json([(
            "handledBy",
            serde_json::Value::String(service.worker_id().to_string()),
        )]);
        service
            .complete_with_variables(task, variables, VariableMap::new())
            .await
    }

    fn subscription(&self) -> Option<TopicConfiguration> {
        Some(TopicConfiguration::new(self.topic.clone()))
    }

    fn name(&self) -> &str {
        "LoggingHandler"
    }
}

fn exit_code(e: &ClientError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(e: ClientError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
    std::process::exit(exit_code(&e).max(1));
}

fn display_config_summary(config: &TomlConfig, topics: &[String]) {
    tracing::info!("📋 Configuration Summary:");
    tracing::info!("  Engine: {}", config.base_url().unwrap_or("<unset>"));
    tracing::info!(
        "  Worker: {}",
        config.client.worker_id.as_deref().unwrap_or("<generated>")
    );
    tracing::info!("  Environment: {:?}", config.client.environment.unwrap_or_default());
    tracing::info!("  Topics: {}", topics.join(", "));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if config.json_logging() {
        logger::init_json_logger(config.logging_level());
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting external task worker");
    tracing::info!("📁 Configuration loaded from: {}", args.config);

    args.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        fail(e);
    }

    let mut topics: Vec<String> = config.subscribed_topics().map(str::to_string).collect();
    for topic in &args.topic {
        if !topics.contains(topic) {
            topics.push(topic.clone());
        }
    }
    display_config_summary(&config, &topics);

    let client = match ExternalClientFactory::new(&config).create_client() {
        Ok(client) => client,
        Err(e) => fail(e),
    };

    let handlers: Vec<Arc<dyn ExternalTaskHandler>> = topics
        .iter()
        .map(|topic| Arc::new(LoggingHandler { topic: topic.clone() }) as Arc<dyn ExternalTaskHandler>)
        .collect();

    let opened = match SubscriptionCreator::with_config(&client, &config).register_all(handlers) {
        Ok(opened) => opened,
        Err(e) => fail(e),
    };

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no request will be sent");
        match client.fetch_request() {
            Some(request) => println!("{}", serde_json::to_string_pretty(&request)?),
            None => println!("No topics subscribed"),
        }
        return Ok(());
    }

    if opened == 0 {
        tracing::warn!("No topics subscribed; add [subscriptions.<topic>] or --topic");
        return Ok(());
    }

    if !client.auto_fetching_enabled() {
        tracing::info!("Auto fetching disabled; exiting after setup");
        return Ok(());
    }

    tokio::select! {
        _ = client.run(args.max_polls) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("🛑 Shutdown requested");
            client.stop().await;
        }
    }

    tracing::info!("✅ Worker stopped");
    Ok(())
}
