#![allow(dead_code)]

use async_trait::async_trait;
use external_task_client::{
    ClientError, ExternalTaskHandler, ExternalTaskService, LockedExternalTask, TopicConfiguration,
};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Complete,
    /// 只記錄，不回報結果
    Hold,
    Fail,
}

#[derive(Clone)]
pub struct RecordingHandler {
    pub topic: String,
    pub declared: Option<TopicConfiguration>,
    pub outcome: Outcome,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    fn with_outcome(topic: &str, outcome: Outcome) -> Self {
        Self {
            topic: topic.to_string(),
            declared: Some(TopicConfiguration::new(topic)),
            outcome,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn completing(topic: &str) -> Self {
        Self::with_outcome(topic, Outcome::Complete)
    }

    pub fn holding(topic: &str) -> Self {
        Self::with_outcome(topic, Outcome::Hold)
    }

    pub fn failing(topic: &str) -> Self {
        Self::with_outcome(topic, Outcome::Fail)
    }

    pub fn declaring(mut self, declared: Option<TopicConfiguration>) -> Self {
        self.declared = declared;
        self
    }

    pub async fn seen(&self) -> Vec<String> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl ExternalTaskHandler for RecordingHandler {
    async fn execute(
        &self,
        task: &LockedExternalTask,
        service: &ExternalTaskService,
    ) -> external_task_client::Result<()> {
        self.seen.lock().await.push(task.id.clone());
        match self.outcome {
            Outcome::Complete => service.complete(task).await,
            Outcome::Hold => Ok(()),
            Outcome::Fail => Err(ClientError::HandlerError {
                topic: task.topic_name.clone(),
                message: "boom".to_string(),
            }),
        }
    }

    fn subscription(&self) -> Option<TopicConfiguration> {
        self.declared.clone()
    }

    fn name(&self) -> &str {
        "RecordingHandler"
    }
}

pub fn engine_task(id: &str, topic: &str, priority: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "topicName": topic,
        "workerId": "worker-1",
        "priority": priority,
        "retries": null,
        "variables": {}
    })
}

pub fn client_toml(base_url: &str, extra: &str) -> String {
    format!(
        r#"
[client]
base_url = "{}/engine-rest"
worker_id = "worker-1"
disable_backoff = true
{}
"#,
        base_url, extra
    )
}
