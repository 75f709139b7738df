use crate::infrastructure::error::ReporterError;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// 网络客户端配置
///
/// 项目/提交列表等短调用使用 60s 读超时。
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("gitlab-reporter/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// 构建共享的 HTTP 客户端
pub fn build_client(config: &NetworkConfig) -> Result<Client, ReporterError> {
    ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .build()
        .map_err(|e| ReporterError::network(format!("Failed to create HTTP client: {}", e), None))
}
