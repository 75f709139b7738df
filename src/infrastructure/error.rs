use thiserror::Error;

/// 聚合核心错误类型
#[derive(Error, Debug, Clone)]
pub enum ReporterError {
    #[error("配置错误: {message}")]
    Configuration { message: String },

    #[error("网络错误: {message}")]
    Network { message: String, url: Option<String> },

    #[error("解析错误: {message}")]
    Parsing { message: String, content_type: String },

    #[error("存储错误: {message}")]
    Storage { message: String },

    #[error("验证错误: {message}")]
    Validation { message: String, field: Option<String> },
}

impl ReporterError {
    /// 检查错误是否可重试
    ///
    /// 限流不会出现在这里: 429 在 HTTP 客户端内部消化, 不会上抛。
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReporterError::Network { .. })
    }

    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        ReporterError::Configuration {
            message: message.into(),
        }
    }

    /// 创建网络错误
    pub fn network(message: impl Into<String>, url: Option<String>) -> Self {
        ReporterError::Network {
            message: message.into(),
            url,
        }
    }

    /// 创建解析错误
    pub fn parsing(message: impl Into<String>, content_type: impl Into<String>) -> Self {
        ReporterError::Parsing {
            message: message.into(),
            content_type: content_type.into(),
        }
    }

    /// 创建存储错误
    pub fn storage(message: impl Into<String>) -> Self {
        ReporterError::Storage {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        ReporterError::Validation {
            message: message.into(),
            field,
        }
    }
}

impl From<std::io::Error> for ReporterError {
    fn from(error: std::io::Error) -> Self {
        ReporterError::Storage {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ReporterError {
    fn from(error: serde_json::Error) -> Self {
        ReporterError::Parsing {
            message: error.to_string(),
            content_type: "JSON".to_string(),
        }
    }
}

impl From<reqwest::Error> for ReporterError {
    fn from(error: reqwest::Error) -> Self {
        ReporterError::Network {
            message: error.to_string(),
            url: error.url().map(|u| u.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ReporterError::network("timed out", None).is_retryable());
        assert!(!ReporterError::config("missing token").is_retryable());
        assert!(!ReporterError::parsing("bad json", "JSON").is_retryable());
        assert!(!ReporterError::storage("disk full").is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: ReporterError = err.into();
        assert!(matches!(converted, ReporterError::Parsing { .. }));
    }
}
