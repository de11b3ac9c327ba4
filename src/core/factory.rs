use crate::core::backoff::ExponentialBackoffStrategy;
use crate::core::builder::ExternalTaskClientBuilder;
use crate::core::client::ExternalTaskClient;
use crate::core::customizer::{customizer_for, ClientCustomizer};
use crate::domain::ports::{ConfigProvider, EngineClient};
use crate::utils::error::Result;
use crate::utils::validation;
use std::sync::Arc;

/// Builds the client from configuration, then hands the builder to the
/// customizer before `build()`. The customizer defaults to the one
/// registered for the configured environment.
pub struct ExternalClientFactory<'a> {
    config: &'a dyn ConfigProvider,
    customizer: Box<dyn ClientCustomizer>,
    engine_client: Option<Arc<dyn EngineClient>>,
}

impl<'a> ExternalClientFactory<'a> {
    pub fn new(config: &'a dyn ConfigProvider) -> Self {
        Self {
            config,
            customizer: customizer_for(config.environment()),
            engine_client: None,
        }
    }

    pub fn with_customizer(mut self, customizer: Box<dyn ClientCustomizer>) -> Self {
        self.customizer = customizer;
        self
    }

    pub fn with_engine_client(mut self, engine_client: Arc<dyn EngineClient>) -> Self {
        self.engine_client = Some(engine_client);
        self
    }

    /// A builder populated from configuration with the customizer applied.
    pub fn configure_builder(&self) -> Result<ExternalTaskClientBuilder> {
        let client_config = self.config.client_config();
        let base_url = validation::validate_required_field("client.base_url", &client_config.base_url)?;

        let mut builder = ExternalTaskClientBuilder::new();
        builder.base_url(base_url.clone());

        if let Some(worker_id) = &client_config.worker_id {
            builder.worker_id(worker_id.clone());
        }
        if let Some(max_tasks) = client_config.max_tasks {
            builder.max_tasks(max_tasks);
        }
        if let Some(use_priority) = client_config.use_priority {
            builder.use_priority(use_priority);
        }
        if let Some(timeout) = client_config.async_response_timeout {
            builder.async_response_timeout(timeout);
        }
        if let Some(lock_duration) = client_config.lock_duration {
            builder.lock_duration(lock_duration);
        }
        if client_config.disable_auto_fetching.unwrap_or(false) {
            builder.disable_auto_fetching();
        }
        if client_config.disable_backoff.unwrap_or(false) {
            builder.disable_backoff();
        }
        if let Some(backoff) = &client_config.backoff {
            builder.backoff_strategy(Box::new(ExponentialBackoffStrategy::new(
                backoff
                    .init_time
                    .unwrap_or(ExponentialBackoffStrategy::DEFAULT_INIT_TIME),
                backoff.factor.unwrap_or(ExponentialBackoffStrategy::DEFAULT_FACTOR),
                backoff
                    .max_time
                    .unwrap_or(ExponentialBackoffStrategy::DEFAULT_MAX_TIME),
            )));
        }
        if let Some(date_format) = &client_config.date_format {
            builder.date_format(date_format.clone());
        }
        if let Some(format) = &client_config.default_serialization_format {
            builder.default_serialization_format(format.clone());
        }
        if let Some(seconds) = client_config.timeout_seconds {
            builder.request_timeout_seconds(seconds);
        }
        if let Some(headers) = &client_config.headers {
            for (name, value) in headers {
                builder.header(name.clone(), value.clone());
            }
        }
        if let Some(auth) = &client_config.basic_auth {
            builder.basic_auth(auth.username.clone(), auth.password.clone());
        }
        if let Some(engine_client) = &self.engine_client {
            builder.engine_client(engine_client.clone());
        }

        self.customizer.customize(&mut builder);
        Ok(builder)
    }

    pub fn create_client(&self) -> Result<ExternalTaskClient> {
        let builder = self.configure_builder()?;
        tracing::debug!("Creating external task client: {:?}", builder);
        builder.build()
    }
}
