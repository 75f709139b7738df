//! GitLab 集成层
//!
//! 负责与多个 GitLab 实例交互: API 客户端、连接注册表、
//! 项目/提交缓存以及跨连接的提交聚合。

pub mod aggregator;
pub mod api_client;
pub mod commit_cache;
pub mod instance;
pub mod mapper;
pub mod models;
pub mod project_cache;

pub use aggregator::CommitAggregator;
pub use api_client::GitLabApiClient;
pub use instance::InstanceRegistry;
