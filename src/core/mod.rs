pub mod backoff;
pub mod builder;
pub mod client;
pub mod customizer;
pub mod factory;
pub mod lock_manager;
pub mod poller;
pub mod service;
pub mod subscription;
pub mod topic;

pub use crate::domain::model::{LockedExternalTask, TypedValue, VariableMap};
pub use crate::domain::ports::{ConfigProvider, EngineClient, ExternalTaskHandler};
pub use crate::utils::error::Result;
