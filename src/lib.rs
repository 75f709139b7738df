//! gitlab-reporter: 跨多个 GitLab 服务器聚合一周提交记录
//!
//! 核心流程: 连接注册表维护多实例凭据, API 客户端带重试/限流/分页地
//! 拉取数据, 两级缓存(内存提交缓存 + 磁盘项目缓存)减少网络往返,
//! 聚合器按项目并发取数后合并排序。

pub mod cli;
pub mod config;
pub mod gitlab;
pub mod infrastructure;
pub mod models;
pub mod storage;

pub use gitlab::{CommitAggregator, GitLabApiClient, InstanceRegistry};
pub use infrastructure::ReporterError;
