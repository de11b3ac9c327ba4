use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ClientError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub client: ClientConfig,
    #[serde(default)]
    pub subscriptions: BTreeMap<String, TopicConfigurationProperty>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub worker_id: Option<String>,
    pub max_tasks: Option<u32>,
    pub use_priority: Option<bool>,
    pub async_response_timeout: Option<u64>,
    pub lock_duration: Option<u64>,
    pub disable_auto_fetching: Option<bool>,
    pub disable_backoff: Option<bool>,
    pub date_format: Option<String>,
    pub default_serialization_format: Option<String>,
    pub environment: Option<Environment>,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<BTreeMap<String, String>>,
    pub basic_auth: Option<BasicAuthConfig>,
    pub backoff: Option<BackoffConfig>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub init_time: Option<u64>,
    pub factor: Option<f64>,
    pub max_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: Option<bool>,
}

/// `[subscriptions.<topic>]` 區塊，值會覆蓋 handler 宣告的設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TopicConfigurationProperty {
    #[serde(skip_serializing)]
    pub topic_name: String,
    pub lock_duration: Option<u64>,
    pub variables: Option<Vec<String>>,
    pub local_variables: Option<bool>,
    pub business_key: Option<String>,
    pub process_definition_id: Option<String>,
    pub process_definition_id_in: Option<Vec<String>>,
    pub process_definition_key: Option<String>,
    pub process_definition_key_in: Option<Vec<String>>,
    pub process_definition_version_tag: Option<String>,
    pub without_tenant_id: Option<bool>,
    pub tenant_id_in: Option<Vec<String>>,
    pub include_extension_properties: Option<bool>,
}

impl TopicConfigurationProperty {
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            ..Default::default()
        }
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ClientError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let mut config: TomlConfig =
            toml::from_str(&processed_content).map_err(|e| ClientError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;

        // 表格名稱就是 topic 名稱
        for (topic_name, property) in config.subscriptions.iter_mut() {
            property.topic_name = topic_name.clone();
        }

        Ok(config)
    }

    /// 替換環境變數 (例如 ${ENGINE_PASSWORD})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ClientError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        let base_url = validation::validate_required_field("client.base_url", &self.client.base_url)?;
        validation::validate_url("client.base_url", base_url)?;

        if let Some(worker_id) = &self.client.worker_id {
            validation::validate_non_empty_string("client.worker_id", worker_id)?;
        }

        if let Some(max_tasks) = self.client.max_tasks {
            validation::validate_positive_number("client.max_tasks", max_tasks as u64, 1)?;
        }

        if let Some(lock_duration) = self.client.lock_duration {
            validation::validate_positive_number("client.lock_duration", lock_duration, 1)?;
        }

        if let Some(backoff) = &self.client.backoff {
            if let Some(factor) = backoff.factor {
                validation::validate_range("client.backoff.factor", factor, 1.0, 100.0)?;
            }
            if let (Some(init), Some(max)) = (backoff.init_time, backoff.max_time) {
                if init > max {
                    return Err(ClientError::InvalidConfigValueError {
                        field: "client.backoff.init_time".to_string(),
                        value: init.to_string(),
                        reason: format!("Must not exceed client.backoff.max_time ({})", max),
                    });
                }
            }
        }

        for (topic_name, property) in &self.subscriptions {
            validation::validate_non_empty_string("subscriptions", topic_name)?;
            if let Some(lock_duration) = property.lock_duration {
                validation::validate_positive_number(
                    &format!("subscriptions.{}.lock_duration", topic_name),
                    lock_duration,
                    1,
                )?;
            }
        }

        Ok(())
    }

    pub fn base_url(&self) -> Option<&str> {
        self.client.base_url.as_deref()
    }

    pub fn subscribed_topics(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.keys().map(String::as_str)
    }

    pub fn logging_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    pub fn json_logging(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn client_config(&self) -> &ClientConfig {
        &self.client
    }

    fn environment(&self) -> Environment {
        self.client.environment.unwrap_or_default()
    }

    fn subscription_properties(&self, topic_name: &str) -> Option<&TopicConfigurationProperty> {
        self.subscriptions.get(topic_name)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
