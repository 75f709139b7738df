use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::infrastructure::error::ReporterError;
use crate::models::Connection;

const CONFIG_FILE: &str = "config.json";

/// 持久化配置内容
///
/// 访问令牌的静态加密由外部协作方处理，这里按原样存取。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// 参与聚合的项目 ID 列表
    #[serde(default)]
    pub selected_project_ids: Vec<String>,
}

/// 配置管理器：存储目录 + 连接 + 项目选择状态
#[derive(Debug)]
pub struct ConfigManager {
    storage_path: PathBuf,
    data: RwLock<ConfigData>,
}

impl ConfigManager {
    /// 加载配置，目录不存在时创建
    pub fn load(storage_path: Option<PathBuf>) -> Result<Self, ReporterError> {
        let storage_path = storage_path.unwrap_or_else(default_storage_path);
        fs::create_dir_all(&storage_path)?;

        let config_file = storage_path.join(CONFIG_FILE);
        let data = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %config_file.display(), "配置文件解析失败，使用默认配置: {}", e);
                ConfigData::default()
            })
        } else {
            ConfigData::default()
        };

        Ok(Self {
            storage_path,
            data: RwLock::new(data),
        })
    }

    /// 加载 .env 文件（先用户主目录，再当前目录），随后读取环境变量
    pub fn storage_path_from_env() -> Option<PathBuf> {
        if let Ok(home) = env::var("HOME") {
            let user_env_path = PathBuf::from(format!("{}/.gitlab-reporter/.env", home));
            if user_env_path.exists() {
                dotenvy::from_path(user_env_path).ok();
            }
        }
        dotenvy::dotenv().ok();

        env::var("GITLAB_REPORTER_HOME").ok().map(PathBuf::from)
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// 项目列表磁盘缓存目录
    pub fn project_cache_dir(&self) -> PathBuf {
        self.storage_path.join("gitlab-projects")
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.data.read().expect("config lock poisoned").connections.clone()
    }

    pub fn set_connections(&self, connections: Vec<Connection>) -> Result<(), ReporterError> {
        {
            let mut data = self.data.write().expect("config lock poisoned");
            data.connections = connections;
        }
        self.save()
    }

    pub fn selected_project_ids(&self) -> Vec<String> {
        self.data
            .read()
            .expect("config lock poisoned")
            .selected_project_ids
            .clone()
    }

    pub fn set_selected_project_ids(&self, ids: Vec<String>) -> Result<(), ReporterError> {
        {
            let mut data = self.data.write().expect("config lock poisoned");
            data.selected_project_ids = ids;
        }
        self.save()
    }

    /// 写回配置文件
    fn save(&self) -> Result<(), ReporterError> {
        let data = self.data.read().expect("config lock poisoned").clone();
        let json = serde_json::to_string_pretty(&data)?;
        fs::write(self.storage_path.join(CONFIG_FILE), json)?;
        Ok(())
    }
}

/// 默认存储目录: ~/.gitlab-reporter
fn default_storage_path() -> PathBuf {
    match env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".gitlab-reporter"),
        Err(_) => PathBuf::from(".gitlab-reporter"),
    }
}
