use crate::config::toml_config::{ClientConfig, Environment, TopicConfigurationProperty};
use crate::core::service::ExternalTaskService;
use crate::core::topic::TopicConfiguration;
use crate::domain::model::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, FailureRequest, FetchAndLockRequest,
    LockedExternalTask,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Transport to the engine's external task API.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn fetch_and_lock(&self, request: &FetchAndLockRequest)
        -> Result<Vec<LockedExternalTask>>;
    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> Result<()>;
    async fn handle_failure(&self, task_id: &str, request: &FailureRequest) -> Result<()>;
    async fn handle_bpmn_error(&self, task_id: &str, request: &BpmnErrorRequest) -> Result<()>;
    async fn extend_lock(&self, task_id: &str, request: &ExtendLockRequest) -> Result<()>;
    async fn unlock(&self, task_id: &str) -> Result<()>;
}

/// Work done for one locked task. The handler reports the outcome through
/// `service`; returning an error leaves the task locked until it expires.
#[async_trait]
pub trait ExternalTaskHandler: Send + Sync {
    async fn execute(&self, task: &LockedExternalTask, service: &ExternalTaskService)
        -> Result<()>;

    /// 宣告式訂閱設定，沒有宣告的 handler 不會被自動訂閱
    fn subscription(&self) -> Option<TopicConfiguration> {
        None
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub trait ConfigProvider: Send + Sync {
    fn client_config(&self) -> &ClientConfig;
    fn environment(&self) -> Environment;
    fn subscription_properties(&self, topic_name: &str) -> Option<&TopicConfigurationProperty>;
}
