//! 提交持久化层
//!
//! 把聚合出的提交写入本地存储, 供离线周报生成使用。
//! 当前只有 JSON 文件一种后端, trait 抽象留给后续扩展。

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::infrastructure::error::ReporterError;
use crate::models::CommitInfo;

/// 提交存储后端抽象
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// 合并写入一批提交, 按 (connection, project, hash) 去重
    async fn save_commits(&self, commits: &[CommitInfo]) -> Result<usize, ReporterError>;

    /// 读取全部已持久化的提交
    async fn all_commits(&self) -> Result<Vec<CommitInfo>, ReporterError>;

    /// 清空存储
    async fn clear(&self) -> Result<(), ReporterError>;
}

/// JSON 文件存储: 单文件保存全部提交记录
pub struct JsonCommitStore {
    path: PathBuf,
}

impl JsonCommitStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// 默认文件位于配置目录下的 commits.json
    pub fn in_dir(storage_dir: &std::path::Path) -> Self {
        Self::new(storage_dir.join("commits.json"))
    }

    async fn read_existing(&self) -> Result<Vec<CommitInfo>, ReporterError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ReporterError::storage(format!("Corrupt commit store: {}", e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ReporterError::storage(format!(
                "Cannot read commit store: {}", e
            ))),
        }
    }
}

#[async_trait]
impl CommitStore for JsonCommitStore {
    async fn save_commits(&self, commits: &[CommitInfo]) -> Result<usize, ReporterError> {
        let mut existing = self.read_existing().await?;
        let mut seen: HashSet<(String, String, String)> = existing
            .iter()
            .map(|c| (c.connection_id.clone(), c.project_id.clone(), c.hash.clone()))
            .collect();

        let mut added = 0;
        for commit in commits {
            let key = (
                commit.connection_id.clone(),
                commit.project_id.clone(),
                commit.hash.clone(),
            );
            if seen.insert(key) {
                existing.push(commit.clone());
                added += 1;
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ReporterError::storage(format!("Cannot create storage dir: {}", e))
            })?;
        }
        let json = serde_json::to_string_pretty(&existing)
            .map_err(|e| ReporterError::storage(format!("Serialize failed: {}", e)))?;
        fs::write(&self.path, json)
            .await
            .map_err(|e| ReporterError::storage(format!("Write failed: {}", e)))?;

        info!(added, total = existing.len(), "Saved commits to store");
        Ok(added)
    }

    async fn all_commits(&self) -> Result<Vec<CommitInfo>, ReporterError> {
        let commits = self.read_existing().await?;
        debug!(count = commits.len(), "Loaded commits from store");
        Ok(commits)
    }

    async fn clear(&self) -> Result<(), ReporterError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReporterError::storage(format!(
                "Cannot clear commit store: {}", e
            ))),
        }
    }
}
