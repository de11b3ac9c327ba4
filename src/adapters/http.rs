use crate::config::toml_config::BasicAuthConfig;
use crate::core::builder::ClientSettings;
use crate::domain::model::{
    BpmnErrorRequest, CompleteRequest, EngineErrorBody, ExtendLockRequest, FailureRequest,
    FetchAndLockRequest, LockedExternalTask,
};
use crate::domain::ports::EngineClient;
use crate::utils::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Engine REST API transport (`<base_url>/external-task/...`).
#[derive(Debug, Clone)]
pub struct RestEngineClient {
    client: Client,
    base_url: String,
    headers: BTreeMap<String, String>,
    basic_auth: Option<BasicAuthConfig>,
    request_timeout: Option<Duration>,
}

impl RestEngineClient {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let request_timeout = settings.request_timeout_seconds.map(Duration::from_secs);

        let mut builder = Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            headers: settings.headers.clone(),
            basic_auth: settings.basic_auth.clone(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/external-task{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let mut request = self.client.post(self.url(path));

        // 添加自定義標頭
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        if let Some(auth) = &self.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        request
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let mut request = self.post(path).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!("POST {}", self.url(path));
        let response = request.send().await?;
        tracing::debug!("Engine response status: {}", response.status());

        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: EngineErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body.message.unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text
            }
        });

        Err(ClientError::EngineError {
            status: status.as_u16(),
            kind: body.kind,
            message,
        })
    }

    /// Long polling keeps the fetch open up to `asyncResponseTimeout`, so the
    /// HTTP timeout for that call is stretched accordingly.
    fn fetch_timeout(&self, request: &FetchAndLockRequest) -> Option<Duration> {
        match (self.request_timeout, request.async_response_timeout) {
            (Some(timeout), Some(async_ms)) => Some(timeout + Duration::from_millis(async_ms)),
            (timeout, _) => timeout,
        }
    }
}

#[async_trait]
impl EngineClient for RestEngineClient {
    async fn fetch_and_lock(
        &self,
        request: &FetchAndLockRequest,
    ) -> Result<Vec<LockedExternalTask>> {
        let response = self
            .post_json("/fetchAndLock", request, self.fetch_timeout(request))
            .await?;
        // 解碼失敗屬於資料問題，不是網路問題
        let body = response.text().await?;
        let tasks: Vec<LockedExternalTask> = serde_json::from_str(&body)?;
        Ok(tasks)
    }

    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> Result<()> {
        self.post_json(&format!("/{}/complete", task_id), request, None)
            .await?;
        Ok(())
    }

    async fn handle_failure(&self, task_id: &str, request: &FailureRequest) -> Result<()> {
        self.post_json(&format!("/{}/failure", task_id), request, None)
            .await?;
        Ok(())
    }

    async fn handle_bpmn_error(&self, task_id: &str, request: &BpmnErrorRequest) -> Result<()> {
        self.post_json(&format!("/{}/bpmnError", task_id), request, None)
            .await?;
        Ok(())
    }

    async fn extend_lock(&self, task_id: &str, request: &ExtendLockRequest) -> Result<()> {
        self.post_json(&format!("/{}/extendLock", task_id), request, None)
            .await?;
        Ok(())
    }

    async fn unlock(&self, task_id: &str) -> Result<()> {
        tracing::debug!("POST {}", self.url(&format!("/{}/unlock", task_id)));
        let response = self.post(&format!("/{}/unlock", task_id)).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
