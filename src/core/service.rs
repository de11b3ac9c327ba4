use crate::core::lock_manager::LockManager;
use crate::domain::model::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, FailureRequest, LockedExternalTask,
    VariableMap,
};
use crate::domain::ports::EngineClient;
use crate::utils::error::Result;
use std::sync::Arc;

/// Reports task outcomes to the engine on behalf of one worker and keeps
/// the local lock table in step.
#[derive(Clone)]
pub struct ExternalTaskService {
    engine: Arc<dyn EngineClient>,
    worker_id: String,
    lock_manager: Arc<LockManager>,
}

impl ExternalTaskService {
    pub fn new(engine: Arc<dyn EngineClient>, worker_id: String, lock_manager: Arc<LockManager>) -> Self {
        Self {
            engine,
            worker_id,
            lock_manager,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn complete(&self, task: &LockedExternalTask) -> Result<()> {
        self.complete_with_variables(task, VariableMap::new(), VariableMap::new())
            .await
    }

    pub async fn complete_with_variables(
        &self,
        task: &LockedExternalTask,
        variables: VariableMap,
        local_variables: VariableMap,
    ) -> Result<()> {
        let request = CompleteRequest {
            worker_id: self.worker_id.clone(),
            variables,
            local_variables,
        };
        self.engine.complete(&task.id, &request).await?;
        self.lock_manager.release(&task.id);
        tracing::info!("✅ Completed task {} ({})", task.id, task.topic_name);
        Ok(())
    }

    /// Reports a failure. With `retries == 0` the engine raises an incident.
    pub async fn handle_failure(
        &self,
        task: &LockedExternalTask,
        error_message: &str,
        error_details: Option<String>,
        retries: i32,
        retry_timeout: u64,
    ) -> Result<()> {
        let request = FailureRequest {
            worker_id: self.worker_id.clone(),
            error_message: error_message.to_string(),
            error_details,
            retries: retries.max(0),
            retry_timeout,
        };
        self.engine.handle_failure(&task.id, &request).await?;
        self.lock_manager.release(&task.id);
        tracing::warn!(
            "Reported failure for task {} ({}), retries left: {}",
            task.id,
            task.topic_name,
            request.retries
        );
        Ok(())
    }

    pub async fn handle_bpmn_error(
        &self,
        task: &LockedExternalTask,
        error_code: &str,
        error_message: Option<&str>,
        variables: VariableMap,
    ) -> Result<()> {
        let request = BpmnErrorRequest {
            worker_id: self.worker_id.clone(),
            error_code: error_code.to_string(),
            error_message: error_message.map(str::to_string),
            variables,
        };
        self.engine.handle_bpmn_error(&task.id, &request).await?;
        self.lock_manager.release(&task.id);
        tracing::info!(
            "Reported BPMN error '{}' for task {} ({})",
            error_code,
            task.id,
            task.topic_name
        );
        Ok(())
    }

    pub async fn extend_lock(&self, task: &LockedExternalTask, new_duration: u64) -> Result<()> {
        let request = ExtendLockRequest {
            worker_id: self.worker_id.clone(),
            new_duration,
        };
        self.engine.extend_lock(&task.id, &request).await?;
        if self.lock_manager.extend(&task.id, new_duration).is_none() {
            tracing::debug!("Extended lock of task {} that was not tracked locally", task.id);
        }
        Ok(())
    }

    pub async fn unlock(&self, task: &LockedExternalTask) -> Result<()> {
        self.engine.unlock(&task.id).await?;
        self.lock_manager.release(&task.id);
        tracing::debug!("Unlocked task {}", task.id);
        Ok(())
    }
}

impl std::fmt::Debug for ExternalTaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTaskService")
            .field("worker_id", &self.worker_id)
            .finish()
    }
}
