use crate::config::toml_config::TopicConfigurationProperty;
use crate::core::backoff::BackoffStrategy;
use crate::core::builder::{ClientSettings, ExternalTaskClientBuilder};
use crate::core::lock_manager::LockManager;
use crate::core::poller::{OrderingPolicy, Subscription, SubscriptionTable, TaskPoller};
use crate::core::service::ExternalTaskService;
use crate::core::topic::TopicConfiguration;
use crate::domain::model::FetchAndLockRequest;
use crate::domain::ports::{EngineClient, ExternalTaskHandler};
use crate::utils::error::{ClientError, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A fetch-and-lock worker bound to one engine.
pub struct ExternalTaskClient {
    settings: ClientSettings,
    subscriptions: SubscriptionTable,
    lock_manager: Arc<LockManager>,
    poller: Arc<TaskPoller>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExternalTaskClient {
    pub fn builder() -> ExternalTaskClientBuilder {
        ExternalTaskClientBuilder::new()
    }

    pub(crate) fn new(
        settings: ClientSettings,
        engine: Arc<dyn EngineClient>,
        backoff: Option<Box<dyn BackoffStrategy>>,
    ) -> Self {
        let subscriptions: SubscriptionTable = Arc::new(RwLock::new(BTreeMap::new()));
        let lock_manager = Arc::new(LockManager::new());
        let poller = Arc::new(TaskPoller::new(
            settings.clone(),
            engine,
            subscriptions.clone(),
            lock_manager.clone(),
            backoff,
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            settings,
            subscriptions,
            lock_manager,
            poller,
            shutdown,
            worker: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn worker_id(&self) -> &str {
        self.settings.worker_id()
    }

    pub fn ordering_policy(&self) -> OrderingPolicy {
        self.poller.ordering()
    }

    /// Whether the owner should start polling once subscriptions are open.
    /// Opening a subscription never starts polling by itself.
    pub fn auto_fetching_enabled(&self) -> bool {
        self.settings.auto_fetching
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn service(&self) -> ExternalTaskService {
        self.poller.service().clone()
    }

    pub fn subscribe(&self, topic_name: impl Into<String>) -> TopicSubscriptionBuilder<'_> {
        TopicSubscriptionBuilder {
            client: self,
            configuration: TopicConfiguration::new(topic_name),
            handler: None,
        }
    }

    /// Closes the subscription for `topic_name`. Returns whether one was open.
    pub fn unsubscribe(&self, topic_name: &str) -> bool {
        let mut table = self
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = table.remove(topic_name).is_some();
        if removed {
            tracing::info!("External task client unsubscribed from topic '{}'", topic_name);
        }
        removed
    }

    pub fn subscriptions(&self) -> Vec<TopicConfiguration> {
        let table = self
            .subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.values().map(|s| s.configuration.clone()).collect()
    }

    pub fn is_subscribed(&self, topic_name: &str) -> bool {
        let table = self
            .subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.contains_key(topic_name)
    }

    fn open_subscription(&self, subscription: Subscription) -> Result<()> {
        let topic_name = subscription.configuration.topic_name.clone();
        let mut table = self
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if table.contains_key(&topic_name) {
            return Err(ClientError::SubscriptionError {
                topic: topic_name,
                message: "Topic is already subscribed".to_string(),
            });
        }

        table.insert(topic_name, subscription);
        Ok(())
    }

    pub fn fetch_request(&self) -> Option<FetchAndLockRequest> {
        self.poller.fetch_request()
    }

    /// Runs a single fetch-and-lock round on the calling task.
    pub async fn poll_once(&self) -> Result<usize> {
        self.poller.poll_once().await
    }

    /// Polls on the calling task until [`stop`](Self::stop) or `max_polls`.
    pub async fn run(&self, max_polls: Option<u64>) {
        self.shutdown.send_replace(false);
        self.poller.run(self.shutdown.subscribe(), max_polls).await;
    }

    /// Starts polling on a background task. No-op when already running.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            tracing::debug!("Task poller already running");
            return;
        }

        self.shutdown.send_replace(false);
        let poller = self.poller.clone();
        let shutdown = self.shutdown.subscribe();
        *worker = Some(tokio::spawn(async move {
            poller.run(shutdown, None).await;
        }));
    }

    pub fn is_active(&self) -> bool {
        let worker = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        worker.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Signals the poller to stop and waits for the background task.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let handle = {
            let mut worker = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            worker.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Task poller terminated abnormally: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for ExternalTaskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTaskClient")
            .field("settings", &self.settings)
            .field("topics", &self.subscriptions().len())
            .finish()
    }
}

/// `client.subscribe("topic").lock_duration(..).handler(..).open()`
pub struct TopicSubscriptionBuilder<'a> {
    client: &'a ExternalTaskClient,
    configuration: TopicConfiguration,
    handler: Option<Arc<dyn ExternalTaskHandler>>,
}

impl<'a> TopicSubscriptionBuilder<'a> {
    pub fn handler(mut self, handler: Arc<dyn ExternalTaskHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn lock_duration(mut self, lock_duration: u64) -> Self {
        self.configuration.lock_duration = Some(lock_duration);
        self
    }

    pub fn variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configuration = self.configuration.with_variables(variables);
        self
    }

    pub fn local_variables(mut self, local_variables: bool) -> Self {
        self.configuration.local_variables = Some(local_variables);
        self
    }

    pub fn business_key(mut self, business_key: impl Into<String>) -> Self {
        self.configuration.business_key = Some(business_key.into());
        self
    }

    pub fn process_definition_id(mut self, id: impl Into<String>) -> Self {
        self.configuration.process_definition_id = Some(id.into());
        self
    }

    pub fn process_definition_id_in<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configuration = self.configuration.with_process_definition_id_in(ids);
        self
    }

    pub fn process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.configuration.process_definition_key = Some(key.into());
        self
    }

    pub fn process_definition_key_in<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configuration = self.configuration.with_process_definition_key_in(keys);
        self
    }

    pub fn process_definition_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.configuration.process_definition_version_tag = Some(tag.into());
        self
    }

    pub fn without_tenant_id(mut self) -> Self {
        self.configuration.without_tenant_id = Some(true);
        self
    }

    pub fn tenant_id_in<I, S>(mut self, tenant_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configuration = self.configuration.with_tenant_id_in(tenant_ids);
        self
    }

    pub fn include_extension_properties(mut self, include: bool) -> Self {
        self.configuration.include_extension_properties = Some(include);
        self
    }

    /// Replaces every filter with `configuration`, keeping the topic name.
    pub fn configuration(mut self, configuration: TopicConfiguration) -> Self {
        let topic_name = std::mem::take(&mut self.configuration.topic_name);
        self.configuration = TopicConfiguration {
            topic_name,
            ..configuration
        };
        self
    }

    pub fn apply_property(mut self, property: &TopicConfigurationProperty) -> Self {
        self.configuration.override_with(property);
        self
    }

    pub fn topic_configuration(&self) -> &TopicConfiguration {
        &self.configuration
    }

    pub fn open(self) -> Result<TopicConfiguration> {
        let topic_name = self.configuration.topic_name.clone();
        if topic_name.trim().is_empty() {
            return Err(ClientError::SubscriptionError {
                topic: topic_name,
                message: "Topic name cannot be empty".to_string(),
            });
        }

        let handler = self.handler.ok_or_else(|| ClientError::SubscriptionError {
            topic: topic_name.clone(),
            message: "No handler registered".to_string(),
        })?;

        self.client.open_subscription(Subscription {
            configuration: self.configuration.clone(),
            handler,
        })?;

        tracing::info!("External task client subscribed to topic '{}'", topic_name);
        Ok(self.configuration)
    }
}
