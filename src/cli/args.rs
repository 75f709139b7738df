use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "gitlab-reporter",
    version,
    about = "Aggregate weekly commits across multiple GitLab servers"
)]
pub struct Args {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 管理 GitLab 连接
    Connections {
        #[command(subcommand)]
        action: ConnectionAction,
    },

    /// 管理项目列表与聚合选择
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// 拉取并展示一周的提交
    Week(WeekArgs),

    /// 清空本地项目与提交缓存
    ClearCache,
}

#[derive(Subcommand, Debug)]
pub enum ConnectionAction {
    /// 列出所有连接
    List,

    /// 新增连接并解析当前用户身份
    Add {
        /// 连接显示名称
        #[arg(long)]
        name: String,

        /// GitLab 服务器地址（可省略 https://）
        #[arg(long)]
        url: String,

        /// Personal access token
        #[arg(long)]
        token: String,
    },

    /// 删除连接
    Remove {
        /// 连接 id
        id: String,
    },

    /// 重命名连接（同步更新缓存中的项目显示名）
    Rename {
        /// 连接 id
        id: String,

        /// 新名称
        name: String,
    },

    /// 设为当前活跃连接
    SetActive {
        /// 连接 id
        id: String,
    },

    /// 测试连通性并刷新身份信息
    Test {
        /// 连接 id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// 列出所有已缓存的项目
    List,

    /// 丢弃缓存并从 API 重新拉取项目列表
    Refresh,

    /// 设置参与聚合的项目（按项目 id）
    Select {
        /// 项目 id 列表
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct WeekArgs {
    /// 周起始日期 (YYYY-MM-DD)，默认本周一
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// 周结束日期 (YYYY-MM-DD)，默认起始日期后 6 天
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// 只保留当前用户的提交（排除 merge commit）
    #[arg(long, default_value_t = false)]
    pub mine: bool,

    /// 为每条提交拉取增删行数（较慢）
    #[arg(long, default_value_t = false)]
    pub details: bool,

    /// 将结果合并写入本地提交存储
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// 只读本地提交存储，不访问网络
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}
