mod common;

use anyhow::Result;
use common::{client_toml, engine_task, RecordingHandler};
use external_task_client::{ExternalClientFactory, ExternalTaskClient, TomlConfig};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn build_client(server: &MockServer, extra: &str) -> Result<ExternalTaskClient> {
    let config = TomlConfig::from_toml_str(&client_toml(&server.base_url(), extra))?;
    Ok(ExternalClientFactory::new(&config).create_client()?)
}

/// 完整流程：fetch → handler → complete
#[tokio::test]
async fn test_fetch_dispatch_and_complete() -> Result<()> {
    let server = MockServer::start_async().await;

    let fetch_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/fetchAndLock")
                .json_body_partial(
                    r#"{"workerId": "worker-1", "topics": [{"topicName": "invoice", "lockDuration": 20000}]}"#,
                );
            then.status(200)
                .json_body(json!([engine_task("t1", "invoice", 0)]));
        })
        .await;
    let complete_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/t1/complete")
                .json_body(json!({"workerId": "worker-1"}));
            then.status(204);
        })
        .await;

    let client = build_client(&server, "")?;
    let handler = RecordingHandler::completing("invoice");
    client.subscribe("invoice").handler(Arc::new(handler.clone())).open()?;

    let dispatched = client.poll_once().await?;

    assert_eq!(dispatched, 1);
    assert_eq!(handler.seen().await, vec!["t1".to_string()]);
    fetch_mock.assert_async().await;
    complete_mock.assert_async().await;
    assert!(client.lock_manager().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_priority_policy_dispatches_highest_first() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/fetchAndLock")
                .json_body_partial(r#"{"usePriority": true}"#);
            then.status(200).json_body(json!([
                engine_task("low", "orders", 1),
                engine_task("high", "orders", 9),
                engine_task("mid", "orders", 5)
            ]));
        })
        .await;

    let client = build_client(&server, "")?;
    let handler = RecordingHandler::holding("orders");
    client.subscribe("orders").handler(Arc::new(handler.clone())).open()?;

    client.poll_once().await?;

    assert_eq!(handler.seen().await, vec!["high", "mid", "low"]);
    Ok(())
}

#[tokio::test]
async fn test_arrival_policy_keeps_engine_order() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/fetchAndLock")
                .json_body_partial(r#"{"usePriority": false}"#);
            then.status(200).json_body(json!([
                engine_task("low", "orders", 1),
                engine_task("high", "orders", 9),
                engine_task("mid", "orders", 5)
            ]));
        })
        .await;

    let client = build_client(&server, "environment = \"test\"")?;
    let handler = RecordingHandler::holding("orders");
    client.subscribe("orders").handler(Arc::new(handler.clone())).open()?;

    client.poll_once().await?;

    assert_eq!(handler.seen().await, vec!["low", "high", "mid"]);
    Ok(())
}

/// 已鎖定的任務不會被重複分派
#[tokio::test]
async fn test_locked_task_is_not_dispatched_twice() -> Result<()> {
    let server = MockServer::start_async().await;
    let fetch_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(200).json_body(json!([
                engine_task("t1", "shipping", 0),
                engine_task("t1", "shipping", 0)
            ]));
        })
        .await;

    let client = build_client(&server, "")?;
    let handler = RecordingHandler::holding("shipping");
    client.subscribe("shipping").handler(Arc::new(handler.clone())).open()?;

    assert_eq!(client.poll_once().await?, 1);
    assert_eq!(client.poll_once().await?, 0);

    assert_eq!(handler.seen().await, vec!["t1"]);
    assert!(client.lock_manager().is_locked("t1"));
    fetch_mock.assert_hits_async(2).await;
    Ok(())
}

#[tokio::test]
async fn test_handler_error_releases_local_lock() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(200)
                .json_body(json!([engine_task("t1", "billing", 0), engine_task("t2", "billing", 0)]));
        })
        .await;

    let client = build_client(&server, "")?;
    let handler = RecordingHandler::failing("billing");
    client.subscribe("billing").handler(Arc::new(handler.clone())).open()?;

    let dispatched = client.poll_once().await?;

    assert_eq!(dispatched, 2);
    assert_eq!(handler.seen().await, vec!["t1", "t2"]);
    assert!(!client.lock_manager().is_locked("t1"));
    assert!(client.lock_manager().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_engine_error_is_returned_from_poll() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(500)
                .json_body(json!({"type": "ProcessEngineException", "message": "db down"}));
        })
        .await;

    let client = build_client(&server, "")?;
    client
        .subscribe("billing")
        .handler(Arc::new(RecordingHandler::holding("billing")))
        .open()?;

    let err = client.poll_once().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("db down"));
    Ok(())
}

#[tokio::test]
async fn test_no_subscriptions_means_no_request() -> Result<()> {
    let server = MockServer::start_async().await;
    let fetch_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(200).json_body(json!([]));
        })
        .await;

    let client = build_client(&server, "")?;
    assert!(client.fetch_request().is_none());
    assert_eq!(client.poll_once().await?, 0);

    fetch_mock.assert_hits_async(0).await;
    Ok(())
}

#[tokio::test]
async fn test_service_reports_failure_and_bpmn_error() -> Result<()> {
    let server = MockServer::start_async().await;
    let failure_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/t1/failure")
                .json_body(json!({
                    "workerId": "worker-1",
                    "errorMessage": "timeout",
                    "errorDetails": "upstream did not answer",
                    "retries": 2,
                    "retryTimeout": 5000
                }));
            then.status(204);
        })
        .await;
    let bpmn_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/t2/bpmnError")
                .json_body_partial(r#"{"workerId": "worker-1", "errorCode": "CREDIT_DENIED"}"#);
            then.status(204);
        })
        .await;
    let extend_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/t3/extendLock")
                .json_body(json!({"workerId": "worker-1", "newDuration": 60000}));
            then.status(204);
        })
        .await;

    let client = build_client(&server, "")?;
    let service = client.service();
    let task = |id: &str| external_task_client::LockedExternalTask {
        id: id.to_string(),
        topic_name: "billing".to_string(),
        ..Default::default()
    };

    service
        .handle_failure(&task("t1"), "timeout", Some("upstream did not answer".to_string()), 2, 5000)
        .await?;
    service
        .handle_bpmn_error(&task("t2"), "CREDIT_DENIED", None, Default::default())
        .await?;
    service.extend_lock(&task("t3"), 60_000).await?;

    failure_mock.assert_async().await;
    bpmn_mock.assert_async().await;
    extend_mock.assert_async().await;
    Ok(())
}

/// 背景輪詢可以啟動與停止
#[tokio::test]
async fn test_background_polling_starts_and_stops() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(200).json_body(json!([engine_task("t1", "audit", 0)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/t1/complete");
            then.status(204);
        })
        .await;

    let client = build_client(&server, "")?;
    let handler = RecordingHandler::completing("audit");
    client.subscribe("audit").handler(Arc::new(handler.clone())).open()?;

    client.start();
    assert!(client.is_active());

    let mut waited = Duration::ZERO;
    while handler.seen().await.is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    client.stop().await;

    assert!(!client.is_active());
    assert!(!handler.seen().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_stops_after_max_polls() -> Result<()> {
    let server = MockServer::start_async().await;
    let fetch_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(200).json_body(json!([]));
        })
        .await;

    let client = build_client(&server, "")?;
    client
        .subscribe("audit")
        .handler(Arc::new(RecordingHandler::holding("audit")))
        .open()?;

    tokio::time::timeout(Duration::from_secs(5), client.run(Some(3))).await?;

    fetch_mock.assert_hits_async(3).await;
    Ok(())
}

/// 延長鎖定與解鎖同時更新本地鎖表
#[tokio::test]
async fn test_extend_lock_and_unlock_update_local_locks() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(200).json_body(json!([engine_task("t1", "reports", 0)]));
        })
        .await;
    let extend_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/engine-rest/external-task/t1/extendLock")
                .json_body(json!({"workerId": "worker-1", "newDuration": 3600000}));
            then.status(204);
        })
        .await;
    let unlock_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/t1/unlock");
            then.status(204);
        })
        .await;

    let client = build_client(&server, "")?;
    let handler = RecordingHandler::holding("reports");
    client.subscribe("reports").handler(Arc::new(handler.clone())).open()?;
    assert_eq!(client.poll_once().await?, 1);

    let before = client.lock_manager().get("t1").expect("task is held").expires_at;
    let task = external_task_client::LockedExternalTask {
        id: "t1".to_string(),
        topic_name: "reports".to_string(),
        ..Default::default()
    };
    let service = client.service();

    service.extend_lock(&task, 3_600_000).await?;
    let after = client.lock_manager().get("t1").expect("task is held").expires_at;
    assert!(after > before);
    extend_mock.assert_async().await;

    service.unlock(&task).await?;
    assert!(!client.lock_manager().is_locked("t1"));
    assert!(client.lock_manager().is_empty());
    unlock_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_opening_subscriptions_does_not_start_polling() -> Result<()> {
    let server = MockServer::start_async().await;
    let fetch_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/engine-rest/external-task/fetchAndLock");
            then.status(200).json_body(json!([]));
        })
        .await;

    let auto = build_client(&server, "")?;
    let manual = build_client(&server, "disable_auto_fetching = true")?;
    assert!(auto.auto_fetching_enabled());
    assert!(!manual.auto_fetching_enabled());

    for client in [&auto, &manual] {
        client
            .subscribe("audit")
            .handler(Arc::new(RecordingHandler::holding("audit")))
            .open()?;
        assert!(!client.is_active());
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    fetch_mock.assert_hits_async(0).await;
    Ok(())
}
