use crate::adapters::http::RestEngineClient;
use crate::config::toml_config::BasicAuthConfig;
use crate::core::backoff::{BackoffStrategy, ExponentialBackoffStrategy};
use crate::core::client::ExternalTaskClient;
use crate::domain::ports::EngineClient;
use crate::utils::error::Result;
use crate::utils::validation;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_MAX_TASKS: u32 = 10;
pub const DEFAULT_LOCK_DURATION: u64 = 20_000;
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";
pub const DEFAULT_SERIALIZATION_FORMAT: &str = "application/json";

/// Everything the builder collects before `build()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub base_url: String,
    /// Resolved to `<hostname><uuid>` on build when unset.
    pub worker_id: Option<String>,
    pub max_tasks: u32,
    pub use_priority: bool,
    pub async_response_timeout: Option<u64>,
    pub lock_duration: u64,
    /// Read by the owner of the client, see
    /// [`ExternalTaskClientBuilder::disable_auto_fetching`].
    pub auto_fetching: bool,
    pub backoff_enabled: bool,
    pub date_format: String,
    pub default_serialization_format: String,
    pub request_timeout_seconds: Option<u64>,
    pub headers: BTreeMap<String, String>,
    pub basic_auth: Option<BasicAuthConfig>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            worker_id: None,
            max_tasks: DEFAULT_MAX_TASKS,
            use_priority: true,
            async_response_timeout: None,
            lock_duration: DEFAULT_LOCK_DURATION,
            auto_fetching: true,
            backoff_enabled: true,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            default_serialization_format: DEFAULT_SERIALIZATION_FORMAT.to_string(),
            request_timeout_seconds: None,
            headers: BTreeMap::new(),
            basic_auth: None,
        }
    }
}

impl ClientSettings {
    pub fn worker_id(&self) -> &str {
        self.worker_id.as_deref().unwrap_or_default()
    }
}

pub fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "external-task-worker".to_string());
    format!("{}{}", host, uuid::Uuid::new_v4())
}

/// Fluent configuration of an [`ExternalTaskClient`].
#[derive(Default)]
pub struct ExternalTaskClientBuilder {
    settings: ClientSettings,
    backoff_strategy: Option<Box<dyn BackoffStrategy>>,
    engine_client: Option<Arc<dyn EngineClient>>,
}

impl std::fmt::Debug for ExternalTaskClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTaskClientBuilder")
            .field("settings", &self.settings)
            .field("backoff_strategy", &self.backoff_strategy)
            .field("custom_engine_client", &self.engine_client.is_some())
            .finish()
    }
}

impl ExternalTaskClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn base_url(&mut self, base_url: impl Into<String>) -> &mut Self {
        self.settings.base_url = base_url.into();
        self
    }

    pub fn worker_id(&mut self, worker_id: impl Into<String>) -> &mut Self {
        self.settings.worker_id = Some(worker_id.into());
        self
    }

    pub fn max_tasks(&mut self, max_tasks: u32) -> &mut Self {
        self.settings.max_tasks = max_tasks;
        self
    }

    /// Whether the engine hands out tasks by priority (default) or in
    /// arrival order.
    pub fn use_priority(&mut self, use_priority: bool) -> &mut Self {
        self.settings.use_priority = use_priority;
        self
    }

    pub fn async_response_timeout(&mut self, timeout_ms: u64) -> &mut Self {
        self.settings.async_response_timeout = Some(timeout_ms);
        self
    }

    pub fn lock_duration(&mut self, lock_duration_ms: u64) -> &mut Self {
        self.settings.lock_duration = lock_duration_ms;
        self
    }

    /// Marks the client as set up only. The client never starts polling on
    /// its own; whoever owns it reads
    /// [`auto_fetching_enabled`](ExternalTaskClient::auto_fetching_enabled)
    /// and calls `start()` or `run()`. The worker binary exits after setup
    /// when this is set.
    pub fn disable_auto_fetching(&mut self) -> &mut Self {
        self.settings.auto_fetching = false;
        self
    }

    pub fn disable_backoff(&mut self) -> &mut Self {
        self.settings.backoff_enabled = false;
        self
    }

    pub fn backoff_strategy(&mut self, strategy: Box<dyn BackoffStrategy>) -> &mut Self {
        self.backoff_strategy = Some(strategy);
        self
    }

    pub fn date_format(&mut self, date_format: impl Into<String>) -> &mut Self {
        self.settings.date_format = date_format.into();
        self
    }

    pub fn default_serialization_format(&mut self, format: impl Into<String>) -> &mut Self {
        self.settings.default_serialization_format = format.into();
        self
    }

    pub fn request_timeout_seconds(&mut self, seconds: u64) -> &mut Self {
        self.settings.request_timeout_seconds = Some(seconds);
        self
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.settings.headers.insert(name.into(), value.into());
        self
    }

    pub fn basic_auth(&mut self, username: impl Into<String>, password: impl Into<String>) -> &mut Self {
        self.settings.basic_auth = Some(BasicAuthConfig {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Replaces the REST transport, mainly for embedding and tests.
    pub fn engine_client(&mut self, engine_client: Arc<dyn EngineClient>) -> &mut Self {
        self.engine_client = Some(engine_client);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_url("base_url", &self.settings.base_url)?;
        validation::validate_positive_number("max_tasks", self.settings.max_tasks as u64, 1)?;
        validation::validate_positive_number("lock_duration", self.settings.lock_duration, 1)?;
        if let Some(worker_id) = &self.settings.worker_id {
            validation::validate_non_empty_string("worker_id", worker_id)?;
        }
        Ok(())
    }

    pub fn build(self) -> Result<ExternalTaskClient> {
        self.validate()?;

        let mut settings = self.settings;
        if settings.worker_id.is_none() {
            settings.worker_id = Some(default_worker_id());
        }

        let engine_client: Arc<dyn EngineClient> = match self.engine_client {
            Some(engine_client) => engine_client,
            None => Arc::new(RestEngineClient::new(&settings)?),
        };

        let backoff_strategy: Option<Box<dyn BackoffStrategy>> = if settings.backoff_enabled {
            Some(
                self.backoff_strategy
                    .unwrap_or_else(|| {
                        Box::new(ExponentialBackoffStrategy::default()) as Box<dyn BackoffStrategy>
                    }),
            )
        } else {
            None
        };

        tracing::info!(
            "Built external task client for {} (worker: {}, max_tasks: {}, use_priority: {})",
            settings.base_url,
            settings.worker_id(),
            settings.max_tasks,
            settings.use_priority
        );

        Ok(ExternalTaskClient::new(settings, engine_client, backoff_strategy))
    }
}
