use crate::core::client::ExternalTaskClient;
use crate::domain::ports::{ConfigProvider, ExternalTaskHandler};
use crate::utils::error::Result;
use crate::utils::validation;
use std::sync::Arc;

/// Opens a subscription for every handler that declares one. Values from
/// `[subscriptions.<topic>]` override the handler's declaration.
pub struct SubscriptionCreator<'a> {
    client: &'a ExternalTaskClient,
    config: Option<&'a dyn ConfigProvider>,
}

impl<'a> SubscriptionCreator<'a> {
    pub fn new(client: &'a ExternalTaskClient) -> Self {
        Self {
            client,
            config: None,
        }
    }

    pub fn with_config(client: &'a ExternalTaskClient, config: &'a dyn ConfigProvider) -> Self {
        Self {
            client,
            config: Some(config),
        }
    }

    /// Returns `Ok(false)` when the handler declares no subscription.
    pub fn register(&self, handler: Arc<dyn ExternalTaskHandler>) -> Result<bool> {
        let Some(declared) = handler.subscription() else {
            tracing::warn!(
                "Skipping subscription. Handler {} declares no topic subscription",
                handler.name()
            );
            return Ok(false);
        };

        let declared = declared.normalized();
        let topic_name = declared.topic_name.clone();
        let mut builder = self.client.subscribe(topic_name.clone()).configuration(declared);

        if let Some(property) = self
            .config
            .and_then(|config| config.subscription_properties(&topic_name))
        {
            tracing::info!(
                "External configuration for topic {} found. Overriding declared values",
                topic_name
            );
            builder = builder.apply_property(property);
        }

        builder.handler(handler).open()?;
        Ok(true)
    }

    /// Rejects the whole batch before opening anything when two handlers
    /// declare the same topic.
    pub fn register_all<I>(&self, handlers: I) -> Result<usize>
    where
        I: IntoIterator<Item = Arc<dyn ExternalTaskHandler>>,
    {
        let handlers: Vec<_> = handlers.into_iter().collect();
        let declared: Vec<String> = handlers
            .iter()
            .filter_map(|handler| handler.subscription())
            .map(|configuration| configuration.topic_name)
            .collect();
        validation::validate_unique_topics("subscriptions", declared.iter().map(String::as_str))?;

        let mut opened = 0;
        for handler in handlers {
            if self.register(handler)? {
                opened += 1;
            }
        }
        Ok(opened)
    }
}
