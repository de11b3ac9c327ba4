use crate::core::backoff::BackoffStrategy;
use crate::core::builder::ClientSettings;
use crate::core::lock_manager::{millis, LockManager};
use crate::core::service::ExternalTaskService;
use crate::core::topic::TopicConfiguration;
use crate::domain::model::{FetchAndLockRequest, LockedExternalTask};
use crate::domain::ports::{EngineClient, ExternalTaskHandler};
use crate::utils::error::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Pause after a failed fetch when no backoff strategy is active.
const FETCH_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// Highest priority first; ties keep engine order.
    Priority,
    /// Engine order.
    Arrival,
}

impl OrderingPolicy {
    pub fn from_use_priority(use_priority: bool) -> Self {
        if use_priority {
            OrderingPolicy::Priority
        } else {
            OrderingPolicy::Arrival
        }
    }

    pub fn order(&self, tasks: &mut [LockedExternalTask]) {
        if let OrderingPolicy::Priority = self {
            // sort_by 是穩定排序，同優先權維持引擎回傳順序
            tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
    }
}

#[derive(Clone)]
pub struct Subscription {
    pub configuration: TopicConfiguration,
    pub handler: Arc<dyn ExternalTaskHandler>,
}

pub(crate) type SubscriptionTable = Arc<RwLock<BTreeMap<String, Subscription>>>;

/// Fetches, orders and dispatches locked tasks for the open subscriptions.
pub struct TaskPoller {
    settings: ClientSettings,
    engine: Arc<dyn EngineClient>,
    subscriptions: SubscriptionTable,
    lock_manager: Arc<LockManager>,
    service: ExternalTaskService,
    backoff: Mutex<Option<Box<dyn BackoffStrategy>>>,
    ordering: OrderingPolicy,
}

impl TaskPoller {
    pub(crate) fn new(
        settings: ClientSettings,
        engine: Arc<dyn EngineClient>,
        subscriptions: SubscriptionTable,
        lock_manager: Arc<LockManager>,
        backoff: Option<Box<dyn BackoffStrategy>>,
    ) -> Self {
        let service = ExternalTaskService::new(
            engine.clone(),
            settings.worker_id().to_string(),
            lock_manager.clone(),
        );
        let ordering = OrderingPolicy::from_use_priority(settings.use_priority);

        Self {
            settings,
            engine,
            subscriptions,
            lock_manager,
            service,
            backoff: Mutex::new(backoff),
            ordering,
        }
    }

    pub fn ordering(&self) -> OrderingPolicy {
        self.ordering
    }

    pub fn service(&self) -> &ExternalTaskService {
        &self.service
    }

    fn snapshot(&self) -> Vec<Subscription> {
        let table = self
            .subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.values().cloned().collect()
    }

    fn handler_for(&self, topic_name: &str) -> Option<Arc<dyn ExternalTaskHandler>> {
        let table = self
            .subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.get(topic_name).map(|s| s.handler.clone())
    }

    /// The request the next fetch would send, or `None` without subscriptions.
    pub fn fetch_request(&self) -> Option<FetchAndLockRequest> {
        let subscriptions = self.snapshot();
        if subscriptions.is_empty() {
            return None;
        }

        let topics = subscriptions
            .iter()
            .map(|s| s.configuration.to_fetch_topic(self.settings.lock_duration))
            .collect();

        Some(FetchAndLockRequest {
            worker_id: self.settings.worker_id().to_string(),
            max_tasks: self.settings.max_tasks,
            use_priority: self.settings.use_priority,
            async_response_timeout: self.settings.async_response_timeout,
            topics,
        })
    }

    /// One fetch-and-lock round. Returns how many tasks were dispatched.
    pub async fn poll_once(&self) -> Result<usize> {
        let Some(request) = self.fetch_request() else {
            tracing::debug!("No open subscriptions, skipping fetch");
            return Ok(0);
        };

        let fetched = self.engine.fetch_and_lock(&request).await;
        let mut tasks = match fetched {
            Ok(tasks) => tasks,
            Err(e) => {
                self.reconfigure_backoff(&[]);
                return Err(e);
            }
        };
        self.reconfigure_backoff(&tasks);

        tracing::debug!(
            "Fetched {} tasks for {} topics",
            tasks.len(),
            request.topics.len()
        );

        self.ordering.order(&mut tasks);

        let mut dispatched = 0;
        for task in tasks {
            if self.dispatch(&task, &request).await {
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    async fn dispatch(&self, task: &LockedExternalTask, request: &FetchAndLockRequest) -> bool {
        let lock_duration = request
            .topics
            .iter()
            .find(|t| t.topic_name == task.topic_name)
            .map(|t| t.lock_duration)
            .unwrap_or(self.settings.lock_duration);
        let expires_at = task
            .lock_expires_at(&self.settings.date_format)
            .unwrap_or_else(|| Utc::now() + millis(lock_duration));

        if !self.lock_manager.acquire(&task.id, &task.topic_name, expires_at) {
            return false;
        }

        let Some(handler) = self.handler_for(&task.topic_name) else {
            tracing::warn!(
                "No handler subscribed for topic '{}', leaving task {} to expire",
                task.topic_name,
                task.id
            );
            self.lock_manager.release(&task.id);
            return false;
        };

        tracing::debug!(
            "Dispatching task {} (topic: {}, priority: {}) to {}",
            task.id,
            task.topic_name,
            task.priority,
            handler.name()
        );

        if let Err(e) = handler.execute(task, &self.service).await {
            tracing::error!(
                "❌ Handler {} failed on task {} ({}): {}",
                handler.name(),
                task.id,
                task.topic_name,
                e
            );
            self.lock_manager.release(&task.id);
        }
        true
    }

    fn reconfigure_backoff(&self, tasks: &[LockedExternalTask]) {
        let mut backoff = self.backoff.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(strategy) = backoff.as_mut() {
            strategy.reconfigure(tasks);
        }
    }

    fn backoff_time(&self) -> Option<Duration> {
        let backoff = self.backoff.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        backoff.as_ref().map(|strategy| strategy.calculate_backoff_time())
    }

    /// Polls until `shutdown` flips to `true` or `max_polls` rounds ran.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, max_polls: Option<u64>) {
        let mut polls: u64 = 0;
        tracing::info!(
            "🚀 Task poller started (worker: {}, ordering: {:?})",
            self.settings.worker_id(),
            self.ordering
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let failed = match self.poll_once().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::debug!("Dispatched {} tasks", count);
                    }
                    false
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Fetch and lock failed: {} ({})", e, e.recovery_suggestion());
                    true
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Fetch and lock rejected: {} (Category: {:?}). {}",
                        e,
                        e.category(),
                        e.recovery_suggestion()
                    );
                    true
                }
            };

            self.lock_manager.purge_expired();

            polls += 1;
            if max_polls.map(|max| polls >= max).unwrap_or(false) {
                break;
            }

            let wait = match self.backoff_time() {
                Some(wait) => wait,
                None if failed => FETCH_ERROR_PAUSE,
                None => Duration::ZERO,
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Task poller stopped after {} polls", polls);
    }
}
