pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliArgs;
pub use crate::config::{Environment, TomlConfig};

pub use crate::adapters::http::RestEngineClient;
pub use crate::core::{
    builder::{ClientSettings, ExternalTaskClientBuilder},
    client::ExternalTaskClient,
    customizer::{ClientCustomizer, DefaultClientCustomizer, NonPriorityCustomizer},
    factory::ExternalClientFactory,
    service::ExternalTaskService,
    subscription::SubscriptionCreator,
    topic::TopicConfiguration,
};
pub use crate::domain::model::{LockedExternalTask, TypedValue, VariableMap};
pub use crate::domain::ports::{EngineClient, ExternalTaskHandler};
pub use crate::utils::error::{ClientError, Result};
