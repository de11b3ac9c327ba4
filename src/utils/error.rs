use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Engine responded with {status}: {message}")]
    EngineError {
        status: u16,
        kind: Option<String>,
        message: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Subscription error for topic '{topic}': {message}")]
    SubscriptionError { topic: String, message: String },

    #[error("Handler for topic '{topic}' failed: {message}")]
    HandlerError { topic: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Engine,
    Configuration,
    Data,
    Worker,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::ApiError(_) => ErrorCategory::Network,
            ClientError::EngineError { .. } => ErrorCategory::Engine,
            ClientError::IoError(_) => ErrorCategory::System,
            ClientError::SerializationError(_) => ErrorCategory::Data,
            ClientError::ConfigError { .. }
            | ClientError::ConfigValidationError { .. }
            | ClientError::InvalidConfigValueError { .. }
            | ClientError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ClientError::SubscriptionError { .. }
            | ClientError::HandlerError { .. } => ErrorCategory::Worker,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ClientError::ApiError(_) | ClientError::HandlerError { .. } => ErrorSeverity::Medium,
            ClientError::EngineError { status, .. } if *status >= 500 => ErrorSeverity::Medium,
            ClientError::EngineError { .. }
            | ClientError::SerializationError(_)
            | ClientError::SubscriptionError { .. } => ErrorSeverity::High,
            ClientError::ConfigError { .. }
            | ClientError::ConfigValidationError { .. }
            | ClientError::InvalidConfigValueError { .. }
            | ClientError::MissingConfigError { .. }
            | ClientError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    /// 是否值得在下一輪輪詢時重試
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::ApiError(_) => true,
            ClientError::EngineError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ClientError::ApiError(_) => {
                "Check that the engine REST endpoint is reachable and base_url is correct".to_string()
            }
            ClientError::EngineError { status, .. } if *status == 401 || *status == 403 => {
                "Check the [client.basic_auth] credentials or custom authorization headers".to_string()
            }
            ClientError::EngineError { status, .. } if *status == 404 => {
                "The task may have been completed, deleted or re-locked by another worker".to_string()
            }
            ClientError::EngineError { .. } => {
                "Inspect the engine log for the rejected request".to_string()
            }
            ClientError::IoError(_) => "Check file paths and permissions".to_string(),
            ClientError::SerializationError(_) => {
                "The engine returned data in an unexpected format; check engine version".to_string()
            }
            ClientError::ConfigError { .. } | ClientError::ConfigValidationError { .. } => {
                "Fix the configuration file syntax and values".to_string()
            }
            ClientError::InvalidConfigValueError { field, .. } => {
                format!("Provide a valid value for '{}'", field)
            }
            ClientError::MissingConfigError { field } => {
                format!("Add '{}' to the configuration", field)
            }
            ClientError::SubscriptionError { .. } => {
                "Make sure each topic is subscribed only once".to_string()
            }
            ClientError::HandlerError { .. } => {
                "Check the handler implementation; the task lock will expire and the task is fetched again".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach the process engine: {}", self),
            ErrorCategory::Engine => format!("The process engine rejected a request: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Data => format!("Unexpected data: {}", self),
            ErrorCategory::Worker => format!("Worker problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_severity_depends_on_status() {
        let server_side = ClientError::EngineError {
            status: 503,
            kind: None,
            message: "unavailable".to_string(),
        };
        let client_side = ClientError::EngineError {
            status: 400,
            kind: Some("InvalidRequestException".to_string()),
            message: "bad".to_string(),
        };

        assert_eq!(server_side.severity(), ErrorSeverity::Medium);
        assert!(server_side.is_retryable());
        assert_eq!(client_side.severity(), ErrorSeverity::High);
        assert!(!client_side.is_retryable());
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = ClientError::MissingConfigError {
            field: "client.base_url".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.recovery_suggestion().contains("client.base_url"));
        assert!(err.user_friendly_message().starts_with("Configuration problem"));
    }
}
