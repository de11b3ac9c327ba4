mod common;

use anyhow::Result;
use external_task_client::core::customizer::customizer_for;
use external_task_client::{
    ClientCustomizer, ClientSettings, DefaultClientCustomizer, Environment, ExternalClientFactory,
    ExternalTaskClientBuilder, NonPriorityCustomizer, TomlConfig,
};
use httpmock::prelude::*;

/// 預設 builder 開啟優先權，測試用 customizer 只關閉它
#[test]
fn test_non_priority_customizer_disables_priority_only() {
    let mut builder = ExternalTaskClientBuilder::new();
    assert!(builder.settings().use_priority);
    let defaults = builder.settings().clone();

    NonPriorityCustomizer.customize(&mut builder);

    assert!(!builder.settings().use_priority);
    assert_eq!(
        builder.settings(),
        &ClientSettings {
            use_priority: false,
            ..defaults
        }
    );
}

#[test]
fn test_non_priority_customizer_is_idempotent() {
    let mut once = ExternalTaskClientBuilder::new();
    once.base_url("http://localhost:8080/engine-rest")
        .worker_id("w")
        .lock_duration(1234);
    let mut twice = ExternalTaskClientBuilder::new();
    twice
        .base_url("http://localhost:8080/engine-rest")
        .worker_id("w")
        .lock_duration(1234);

    NonPriorityCustomizer.customize(&mut once);
    NonPriorityCustomizer.customize(&mut twice);
    NonPriorityCustomizer.customize(&mut twice);

    assert_eq!(once.settings(), twice.settings());
}

#[test]
fn test_non_priority_customizer_overrides_configured_priority() {
    let mut builder = ExternalTaskClientBuilder::new();
    builder.use_priority(true).max_tasks(7);

    NonPriorityCustomizer.customize(&mut builder);

    assert!(!builder.settings().use_priority);
    assert_eq!(builder.settings().max_tasks, 7);
}

#[test]
fn test_production_customizer_keeps_priority() {
    let mut builder = ExternalTaskClientBuilder::new();
    DefaultClientCustomizer.customize(&mut builder);
    customizer_for(Environment::Production).customize(&mut builder);
    assert!(builder.settings().use_priority);
}

/// 測試環境建出的 client 送出的 fetch 請求帶 usePriority=false
#[tokio::test]
async fn test_test_environment_client_fetches_without_priority() -> Result<()> {
    let server = MockServer::start_async().await;
    let fetch_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/fetchAndLock")
                .json_body_partial(r#"{"usePriority": false, "workerId": "test-worker"}"#);
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;

    let config = TomlConfig::from_toml_str(&format!(
        r#"
[client]
base_url = "{}/engine-rest"
worker_id = "test-worker"
environment = "test"
disable_backoff = true
"#,
        server.base_url()
    ))?;

    let client = ExternalClientFactory::new(&config).create_client()?;
    client
        .subscribe("noop")
        .handler(std::sync::Arc::new(common::RecordingHandler::completing("noop")))
        .open()?;

    let dispatched = client.poll_once().await?;

    assert_eq!(dispatched, 0);
    fetch_mock.assert_async().await;
    Ok(())
}
